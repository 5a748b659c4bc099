// TCG Revert and RevertSP.

use crate::backend::{normalize, Device, DeviceCommands};
use crate::{EraseError, EraseMethod, EraseResult, ExecutionOutcome, MethodParams};

pub fn run(
    backend: &dyn DeviceCommands,
    device: &Device,
    method: EraseMethod,
    params: &MethodParams,
) -> EraseResult<ExecutionOutcome> {
    let status = match method {
        EraseMethod::TcgRevertSp => {
            // RevertSP is only reachable via an explicit request, and the
            // PSID comes from the drive label: 32 characters, no shorter.
            let psid = params.psid.as_deref().ok_or_else(|| {
                EraseError::MissingParameter(
                    "TCG RevertSP requires the 32-character PSID from the drive label".to_string(),
                )
            })?;
            if psid.len() != 32 {
                return Err(EraseError::InvalidParameter(format!(
                    "PSID must be exactly 32 characters, got {}",
                    psid.len()
                )));
            }
            backend.run_tcg_revert_sp(device, psid)
        }
        _ => backend.run_tcg_revert(device, params.sid.as_deref()),
    };
    Ok(normalize::normalize_tcg(status))
}
