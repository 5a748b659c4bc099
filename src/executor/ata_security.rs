// ATA Security Erase (normal and enhanced).

use crate::backend::{normalize, Device, DeviceCommands};
use crate::{
    EraseError, EraseMethod, EraseResult, ExecutionOutcome, MethodParams,
    DEFAULT_ATA_SECURITY_PASSWORD,
};
use log::info;

pub fn run(
    backend: &dyn DeviceCommands,
    device: &Device,
    method: EraseMethod,
    params: &MethodParams,
) -> EraseResult<ExecutionOutcome> {
    let enhanced = method == EraseMethod::AtaSecurityEraseEnhanced;

    // The security password is a fixed 32-byte buffer. When the user
    // supplies none, the documented default credential is substituted: a
    // compatibility behavior, not a security feature. A drive left
    // security-enabled by an interrupted erase stays unlockable this way.
    let password: [u8; 32] = match &params.ata_password {
        None => {
            info!(
                "{}: no security password supplied, using the default credential",
                device.path
            );
            *DEFAULT_ATA_SECURITY_PASSWORD
        }
        Some(user) => {
            if user.len() > 32 {
                return Err(EraseError::InvalidParameter(format!(
                    "ATA security password is {} bytes; the buffer holds at most 32",
                    user.len()
                )));
            }
            let mut buf = [0u8; 32];
            buf[..user.len()].copy_from_slice(user);
            buf
        }
    };

    let status = backend.run_ata_security_erase(device, enhanced, &password);
    Ok(normalize::normalize_ata(status))
}
