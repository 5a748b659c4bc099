// Post-erase consistency bookkeeping.
//
// Runs only after a successful erase (or on an explicit refresh request).
// Everything here is advisory: a reconciliation problem is reported, never
// allowed to turn a completed erase into a failure.

use crate::backend::{Device, DeviceCommands};
use crate::{EraseMethod, ExecutionOutcome, MethodParams, WriteAfterEraseRequirement};
use log::{info, warn};

/// Advisories the reconciler produced for the operator, in the order they
/// were raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cache_refreshed: bool,
    pub advisories: Vec<String>,
}

pub fn reconcile(
    backend: &dyn DeviceCommands,
    device: &Device,
    outcome: ExecutionOutcome,
    method: EraseMethod,
    write_after: WriteAfterEraseRequirement,
    params: &MethodParams,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    if outcome != ExecutionOutcome::Success {
        return report;
    }

    match write_after {
        WriteAfterEraseRequirement::RequiredBeforeReadsSucceed => {
            // Refreshing the OS cache would itself read the device and
            // fail (or mislead); suppress it and tell the operator why.
            report.advisories.push(format!(
                "{} leaves this device failing reads until every LBA is rewritten with host \
                 data; the filesystem cache was deliberately not refreshed",
                method.cli_name()
            ));
        }
        other => {
            match backend.refresh_filesystem_cache(device) {
                Ok(()) => {
                    info!("{}: filesystem cache refreshed", device.path);
                    report.cache_refreshed = true;
                }
                Err(e) => {
                    warn!("{}: filesystem cache refresh failed: {}", device.path, e);
                    report
                        .advisories
                        .push(format!("filesystem cache refresh failed: {}", e));
                }
            }
            match other {
                WriteAfterEraseRequirement::MayRequireOverwriteDueToFormatting => {
                    report.advisories.push(
                        "reads may fail on formatted areas until they are rewritten".to_string(),
                    );
                }
                WriteAfterEraseRequirement::ReadReturnsGoodStatus => {
                    report.advisories.push(
                        "reads return good status but stale-looking data is cryptographically \
                         unrecoverable"
                            .to_string(),
                    );
                }
                _ => {}
            }
        }
    }

    if params.restore_max_lba {
        verify_capacity_view(backend, device, &mut report);
    }
    report
}

/// Explicit filesystem refresh, independent of any erase.
pub fn refresh_only(backend: &dyn DeviceCommands, device: &Device) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    match backend.refresh_filesystem_cache(device) {
        Ok(()) => report.cache_refreshed = true,
        Err(e) => report
            .advisories
            .push(format!("filesystem cache refresh failed: {}", e)),
    }
    report
}

/// After a max-LBA restore the adapter/driver stack can keep reporting the
/// old, smaller capacity until the host rescans. Check and advise only.
fn verify_capacity_view(
    backend: &dyn DeviceCommands,
    device: &Device,
    report: &mut ReconcileReport,
) {
    let drive = match backend.current_max_lba(device) {
        Ok(lba) => lba,
        Err(e) => {
            report
                .advisories
                .push(format!("could not re-read drive capacity: {}", e));
            return;
        }
    };
    let adapter = match backend.adapter_reported_max_lba(device) {
        Ok(lba) => lba,
        Err(e) => {
            report
                .advisories
                .push(format!("could not read adapter capacity view: {}", e));
            return;
        }
    };
    if adapter != drive {
        report.advisories.push(format!(
            "adapter reports max LBA {} but the drive reports {}; rescan or reboot so the OS \
             sees the restored capacity",
            adapter, drive
        ));
    }
}
