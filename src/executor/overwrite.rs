// Host-driven erases: write-same, pattern overwrite, trim/unmap.
//
// Range resolution happens here, not in the caller, against the device's
// capacity as it is *now* (a preceding max-LBA restore may have grown it
// since the handle was opened).

use super::resolve_range;
use crate::backend::{normalize, Device, DeviceCommands};
use crate::{
    EraseMethod, EraseResult, ExecutionOutcome, MethodParams, OverwritePattern,
};
use log::{debug, warn};
use rand::RngCore;

pub fn run(
    backend: &dyn DeviceCommands,
    device: &Device,
    method: EraseMethod,
    params: &MethodParams,
) -> EraseResult<ExecutionOutcome> {
    // Timed overwrite has no range to resolve.
    if method == EraseMethod::HostOverwrite {
        if let Some(duration) = params.overwrite_duration {
            let pattern = pattern_bytes(&params.overwrite_pattern, device.block_size as usize);
            let status = backend.run_host_overwrite_timed(device, duration, &pattern);
            return Ok(normalize::normalize_os(status));
        }
    }

    let max_lba = match backend.current_max_lba(device) {
        Ok(lba) => lba,
        Err(e) => {
            warn!("{}: live capacity read failed: {}", device.path, e);
            return Ok(ExecutionOutcome::Failure);
        }
    };
    let (start, count) = resolve_range(
        params.start_lba,
        params.lba_range,
        max_lba,
        device.child_max_lba,
    )?;
    debug!(
        "{}: {} over LBAs {}..={}",
        device.path,
        method.cli_name(),
        start,
        start + count - 1
    );

    let outcome = match method {
        EraseMethod::WriteSame => {
            normalize::normalize_scsi(backend.run_write_same(device, start, count))
        }
        EraseMethod::TrimUnmap => normalize::normalize(backend.run_trim_unmap(device, start, count)),
        _ => {
            let passes = params.overwrite_passes.unwrap_or(1).max(1);
            let mut outcome = ExecutionOutcome::Success;
            for pass in 1..=passes {
                debug!("{}: overwrite pass {}/{}", device.path, pass, passes);
                let pattern = pattern_bytes(&params.overwrite_pattern, device.block_size as usize);
                let status = backend.run_host_overwrite(device, start, count, &pattern);
                outcome = normalize::normalize_os(status);
                if outcome != ExecutionOutcome::Success {
                    break;
                }
            }
            outcome
        }
    };
    Ok(outcome)
}

fn pattern_bytes(pattern: &OverwritePattern, block_size: usize) -> Vec<u8> {
    match pattern {
        OverwritePattern::Zeros => vec![0u8; block_size],
        OverwritePattern::Ones => vec![0xFFu8; block_size],
        OverwritePattern::Random => {
            let mut buf = vec![0u8; block_size];
            rand::thread_rng().fill_bytes(&mut buf);
            buf
        }
        OverwritePattern::Fixed(bytes) if bytes.is_empty() => vec![0u8; block_size],
        OverwritePattern::Fixed(bytes) => bytes.clone(),
    }
}
