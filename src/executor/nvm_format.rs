// NVM Format with user-data or cryptographic secure erase.

use crate::backend::{normalize, Device, DeviceCommands, SanitizeOperation};
use crate::{EraseMethod, ExecutionOutcome, MethodParams, ProgressMode};

pub fn run(
    backend: &dyn DeviceCommands,
    device: &Device,
    method: EraseMethod,
    params: &MethodParams,
    mode: ProgressMode,
) -> ExecutionOutcome {
    let op = if method == EraseMethod::NvmFormatCryptoSecureErase {
        SanitizeOperation::CryptoErase
    } else {
        SanitizeOperation::BlockErase
    };

    // params.nvm_options passes through untouched: any unset PI/metadata
    // sub-parameter means "no change", never a default value.
    let status = backend.run_nvm_format(device, op, &params.nvm_options, mode);
    let outcome = normalize::normalize_nvme(status);
    if outcome == ExecutionOutcome::Success && mode == ProgressMode::PollForProgress {
        ExecutionOutcome::InProgress
    } else {
        outcome
    }
}
