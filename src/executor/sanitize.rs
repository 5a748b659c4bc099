// Sanitize block/crypto/overwrite erase.

use crate::backend::{normalize, Device, DeviceCommands, SanitizeOperation};
use crate::{EraseMethod, ExecutionOutcome, ProgressMode, WriteAfterEraseRequirement};
use log::info;

pub fn run(
    backend: &dyn DeviceCommands,
    device: &Device,
    method: EraseMethod,
    mode: ProgressMode,
    write_after: WriteAfterEraseRequirement,
) -> ExecutionOutcome {
    let op = match method {
        EraseMethod::SanitizeCryptoErase => SanitizeOperation::CryptoErase,
        EraseMethod::SanitizeBlockErase => SanitizeOperation::BlockErase,
        _ => SanitizeOperation::OverwriteErase,
    };

    if write_after == WriteAfterEraseRequirement::RequiredBeforeReadsSucceed {
        info!(
            "{}: {} will leave the media unreadable until every LBA is rewritten",
            device.path,
            method.cli_name()
        );
    }

    let status = backend.run_sanitize(device, op, mode);
    let outcome = normalize::normalize(status);
    if outcome == ExecutionOutcome::Success && mode == ProgressMode::PollForProgress {
        // The start command was accepted; the device erases in the
        // background and progress queries are the caller's responsibility.
        ExecutionOutcome::InProgress
    } else {
        outcome
    }
}
