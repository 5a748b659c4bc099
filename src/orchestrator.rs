// Destructive-operation orchestrator.
//
// Composes the pipeline per target device: Probe -> Select -> Gate ->
// Execute -> [Reconcile] -> Done, with a forced early exit to Done when
// selection or the gate fails. Devices run strictly sequentially: parallel
// destructive commands to drives sharing a controller have bricked devices
// mid-format, so there is no concurrent path here at all. There is also no
// in-invocation retry of a failed destructive command; a retry is a new
// invocation, on purpose.

use crate::backend::{Device, DeviceCommands};
use crate::capability::{self, CapabilitySnapshot};
use crate::executor::{EraseExecutor, Execution};
use crate::reconcile::{self, ReconcileReport};
use crate::selection::{self, SelectionError};
use crate::{
    confirm, EraseError, EraseMethod, EraseRequest, EraseResult, ExecutionOutcome, UtilExitCode,
    WriteAfterEraseRequirement,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

/// Per-device record of one pipeline run. Created fresh per device and
/// never persisted; multi-device invocations collect one per target.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation_id: Uuid,
    pub device_path: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub selected_method: Option<EraseMethod>,
    pub outcome: Option<ExecutionOutcome>,
    pub error: Option<String>,
    pub advisories: Vec<String>,
}

impl OperationReport {
    fn new(device_path: &str) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            device_path: device_path.to_string(),
            started: Utc::now(),
            finished: None,
            selected_method: None,
            outcome: None,
            error: None,
            advisories: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> UtilExitCode {
        match (&self.error, self.outcome) {
            (Some(_), _) => UtilExitCode::InvalidCommandLine,
            (None, Some(outcome)) => UtilExitCode::from_outcome(outcome),
            (None, None) => UtilExitCode::OperationFailure,
        }
    }
}

pub struct Orchestrator<'a> {
    backend: &'a dyn DeviceCommands,
    request: EraseRequest,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn DeviceCommands, request: EraseRequest) -> Self {
        Self { backend, request }
    }

    /// Run the pipeline for every named device, strictly in order. One
    /// device's failure never aborts the remaining devices.
    pub async fn run_all(&self, device_paths: &[String]) -> Vec<OperationReport> {
        let mut reports = Vec::with_capacity(device_paths.len());
        for path in device_paths {
            let report = self.run_device(path).await;
            if let Some(error) = &report.error {
                warn!("{}: {}", path, error);
            }
            reports.push(report);
        }
        reports
    }

    pub async fn run_device(&self, device_path: &str) -> OperationReport {
        let mut report = OperationReport::new(device_path);
        match run_destructive_operation_with_details(self.backend, device_path, &self.request) {
            Ok(details) => {
                report.selected_method = details.method;
                report.outcome = Some(details.outcome);
                report.advisories = details.advisories;
            }
            Err(e) => report.error = Some(e.to_string()),
        }
        report.finished = Some(Utc::now());
        report
    }
}

struct OperationDetails {
    method: Option<EraseMethod>,
    outcome: ExecutionOutcome,
    advisories: Vec<String>,
}

/// The public per-device entry point: one device, one immutable request,
/// one normalized outcome. Errors are configuration problems (bad token,
/// missing PSID) reported before anything was dispatched.
pub fn run_destructive_operation(
    backend: &dyn DeviceCommands,
    device_path: &str,
    request: &EraseRequest,
) -> EraseResult<ExecutionOutcome> {
    run_destructive_operation_with_details(backend, device_path, request).map(|d| d.outcome)
}

fn run_destructive_operation_with_details(
    backend: &dyn DeviceCommands,
    device_path: &str,
    request: &EraseRequest,
) -> EraseResult<OperationDetails> {
    let mut device = backend
        .open_device(device_path)
        .map_err(|e| EraseError::DeviceHandle(e.to_string()))?;

    // The handle is closed on every exit path before the orchestrator
    // advances to the next device.
    let result = run_pipeline(backend, &device, request);
    backend.close_device(&mut device);
    result
}

fn run_pipeline(
    backend: &dyn DeviceCommands,
    device: &Device,
    request: &EraseRequest,
) -> EraseResult<OperationDetails> {
    // Probe: taken immediately before selection, never reused or cached.
    let snapshot = capability::probe(backend, device);

    // Select. A skipped RevertSP attaches its explicit-PSID hint to the
    // fallback selection; the hint must reach the user either way.
    let selection = match selection::select(&snapshot, request.requested) {
        Ok(selection) => selection,
        Err(SelectionError::NotSupported { hint }) => {
            if let Some(hint) = &hint {
                println!("{}: {}", device.path, hint);
            }
            return Ok(OperationDetails {
                method: None,
                outcome: ExecutionOutcome::NotSupported,
                advisories: hint.into_iter().collect(),
            });
        }
    };
    let method = selection.method;
    let mut advisories = Vec::new();
    if let Some(advisory) = selection.advisory {
        println!("{}: {}", device.path, advisory);
        advisories.push(advisory);
    }
    info!("{}: selected method {}", device.path, method.cli_name());

    // Gate: checked once, right before dispatch, after selection so the
    // denial names the actually-selected method.
    confirm::check(method, &request.params, request.token)
        .map_err(|denial| EraseError::ConfirmationDenied(denial.to_string()))?;

    // Optional capacity restore, so the erase covers the factory surface.
    // Gated like everything else: it already rewrites device configuration.
    if request.params.restore_max_lba {
        let status = backend.restore_max_lba(device);
        if status != crate::backend::AtaStatus::Success {
            warn!(
                "{}: max-LBA restore before erase did not complete ({:?}); continuing with the \
                 current capacity",
                device.path, status
            );
        }
    }

    // Execute.
    let Execution {
        outcome,
        write_after,
    } = EraseExecutor::execute(backend, device, method, &request.params, request.mode)?;

    // Reconcile, success only.
    let ReconcileReport {
        cache_refreshed: _,
        advisories: reconcile_advisories,
    } = reconcile::reconcile(
        backend,
        device,
        outcome,
        method,
        write_after,
        &request.params,
    );

    advisories.extend(reconcile_advisories);

    report_outcome(device, method, outcome, write_after);
    Ok(OperationDetails {
        method: Some(method),
        outcome,
        advisories,
    })
}

fn report_outcome(
    device: &Device,
    method: EraseMethod,
    outcome: ExecutionOutcome,
    write_after: WriteAfterEraseRequirement,
) {
    match outcome {
        ExecutionOutcome::Success => {
            println!("{}: {} completed successfully", device.path, method.cli_name());
            if write_after == WriteAfterEraseRequirement::RequiredBeforeReadsSucceed {
                println!(
                    "{}: reads will fail until every LBA is rewritten with host data",
                    device.path
                );
            }
        }
        ExecutionOutcome::InProgress => {
            println!(
                "{}: {} started; query sanitize/format progress to track completion",
                device.path,
                method.cli_name()
            );
        }
        other => {
            println!("{}: {} -> {:?}", device.path, method.cli_name(), other);
            if let Some(remedy) = other.remediation() {
                println!("{}: {}", device.path, remedy);
            }
        }
    }
}

/// Support listing for the "show supported erase methods" path. Read-only.
pub fn describe_erase_support(
    backend: &dyn DeviceCommands,
    device_path: &str,
) -> EraseResult<CapabilitySnapshot> {
    let mut device = backend
        .open_device(device_path)
        .map_err(|e| EraseError::DeviceHandle(e.to_string()))?;
    let snapshot = capability::probe(backend, &device);
    backend.close_device(&mut device);
    Ok(snapshot)
}

/// Explicit filesystem-cache refresh, independent of any erase.
pub fn refresh_filesystem_cache(
    backend: &dyn DeviceCommands,
    device_path: &str,
) -> EraseResult<ReconcileReport> {
    let mut device = backend
        .open_device(device_path)
        .map_err(|e| EraseError::DeviceHandle(e.to_string()))?;
    let report = reconcile::refresh_only(backend, &device);
    backend.close_device(&mut device);
    Ok(report)
}

/// Toggle the ATA Write-Read-Verify feature.
pub fn set_write_read_verify(
    backend: &dyn DeviceCommands,
    device_path: &str,
    enable: bool,
) -> EraseResult<(ExecutionOutcome, UtilExitCode)> {
    let mut device = backend
        .open_device(device_path)
        .map_err(|e| EraseError::DeviceHandle(e.to_string()))?;
    let status = backend.set_write_read_verify(&device, enable);
    backend.close_device(&mut device);

    let outcome = crate::backend::normalize::normalize_ata(status);
    let exit = if outcome == ExecutionOutcome::Success {
        println!(
            "{}: write-read-verify {}",
            device_path,
            if enable { "enabled" } else { "disabled" }
        );
        // Known inconsistency carried over from the original tool: the exit
        // code reports not-supported even after a successful toggle.
        // Scripts depend on the observable code, so it stays until the
        // upstream maintainers rule on it.
        UtilExitCode::OperationNotSupported
    } else {
        UtilExitCode::from_outcome(outcome)
    };
    Ok((outcome, exit))
}
