// Method execution.
//
// The executor assumes the confirmation gate already passed; the
// composition order in the orchestrator enforces that, and nothing here
// re-checks it. Every backend status is normalized into ExecutionOutcome in
// exactly one place (backend::normalize), called from the per-method paths
// below.

mod ata_security;
mod format_unit;
mod nvm_format;
mod overwrite;
mod sanitize;
mod tcg;

use crate::backend::{Device, DeviceCommands};
use crate::{
    EraseError, EraseMethod, EraseResult, ExecutionOutcome, MethodParams, ProgressMode,
    WriteAfterEraseRequirement, CHILD_MAX_LBA_SENTINEL, MAX_LBA_SENTINEL,
};

/// What one dispatch produced: the normalized outcome plus the
/// write-after-erase obligation queried before dispatch (message-shaping
/// only, consumed by the reconciler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub outcome: ExecutionOutcome,
    pub write_after: WriteAfterEraseRequirement,
}

pub struct EraseExecutor;

impl EraseExecutor {
    /// Drive the chosen method to completion (Blocking) or through its
    /// start command (PollForProgress). Errors are configuration problems
    /// only; everything the device says comes back as an outcome.
    pub fn execute(
        backend: &dyn DeviceCommands,
        device: &Device,
        method: EraseMethod,
        params: &MethodParams,
        mode: ProgressMode,
    ) -> EraseResult<Execution> {
        // Queried once, after selection and before dispatch, so the
        // post-erase message is specific to the sub-method actually run.
        let write_after = backend.query_write_after_erase(device, method);

        let outcome = match method {
            EraseMethod::SanitizeCryptoErase
            | EraseMethod::SanitizeBlockErase
            | EraseMethod::SanitizeOverwriteErase => {
                sanitize::run(backend, device, method, mode, write_after)
            }
            EraseMethod::AtaSecurityEraseEnhanced | EraseMethod::AtaSecurityEraseNormal => {
                ata_security::run(backend, device, method, params)?
            }
            EraseMethod::NvmFormatUserSecureErase | EraseMethod::NvmFormatCryptoSecureErase => {
                nvm_format::run(backend, device, method, params, mode)
            }
            EraseMethod::WriteSame | EraseMethod::HostOverwrite | EraseMethod::TrimUnmap => {
                overwrite::run(backend, device, method, params)?
            }
            EraseMethod::FormatUnit => format_unit::run(backend, device, params, mode),
            EraseMethod::TcgRevert | EraseMethod::TcgRevertSp => {
                tcg::run(backend, device, method, params)?
            }
        };

        Ok(Execution {
            outcome,
            write_after,
        })
    }
}

/// Resolve a raw (start, range) pair against the device's capacity at
/// execution time. Sentinels stand for the current max LBA (or the child
/// drive's, behind a SAT layer); a zero or max range expands to "from the
/// start LBA through the device's last LBA", inclusive.
///
/// Resolution is a fixed point: feeding the resolved pair back in yields
/// the same pair. A capacity that collides with a reserved sentinel value
/// is rejected up front.
pub fn resolve_range(
    start: Option<u64>,
    range: Option<u64>,
    max_lba: u64,
    child_max_lba: Option<u64>,
) -> EraseResult<(u64, u64)> {
    if max_lba >= CHILD_MAX_LBA_SENTINEL {
        return Err(EraseError::InvalidRange(format!(
            "device max LBA {} collides with a reserved sentinel value",
            max_lba
        )));
    }
    let start = match start.unwrap_or(0) {
        MAX_LBA_SENTINEL => max_lba,
        CHILD_MAX_LBA_SENTINEL => child_max_lba.unwrap_or(max_lba),
        lba => lba,
    };
    if start > max_lba {
        return Err(EraseError::InvalidRange(format!(
            "start LBA {} beyond device max LBA {}",
            start, max_lba
        )));
    }
    let available = max_lba - start + 1;
    let count = match range.unwrap_or(0) {
        0 | u64::MAX => available,
        r => r.min(available),
    };
    Ok((start, count))
}

#[cfg(test)]
mod executor_tests;
