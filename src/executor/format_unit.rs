// SCSI Format Unit.
//
// The fast-format path is the only destructive path with an operator-facing
// cancellation point: filesystems are force-unmounted, the device is locked
// exclusively, and a 30-second countdown runs before the first destructive
// command. The lock is released on every exit path. A full (non-fast)
// format dispatches directly, like every other method.

use crate::backend::{normalize, Device, DeviceCommands};
use crate::{is_interrupted, ExecutionOutcome, MethodParams, ProgressMode};
use log::{error, warn};
use std::time::Duration;

const COUNTDOWN_SECS: u64 = 30;

pub fn run(
    backend: &dyn DeviceCommands,
    device: &Device,
    params: &MethodParams,
    mode: ProgressMode,
) -> ExecutionOutcome {
    run_with_countdown(backend, device, params, mode, COUNTDOWN_SECS)
}

pub(super) fn run_with_countdown(
    backend: &dyn DeviceCommands,
    device: &Device,
    params: &MethodParams,
    mode: ProgressMode,
    countdown_secs: u64,
) -> ExecutionOutcome {
    if !params.fast_format {
        return dispatch(backend, device, params, mode);
    }

    if let Err(e) = backend.unmount_filesystems(device) {
        error!("{}: unmount before format failed: {}", device.path, e);
        return ExecutionOutcome::Failure;
    }
    if let Err(e) = backend.lock_device(device) {
        error!("{}: exclusive lock failed: {}", device.path, e);
        return ExecutionOutcome::Failure;
    }

    let outcome = countdown_then_dispatch(backend, device, params, mode, countdown_secs);

    if let Err(e) = backend.unlock_device(device) {
        warn!("{}: unlock after format failed: {}", device.path, e);
    }
    outcome
}

fn countdown_then_dispatch(
    backend: &dyn DeviceCommands,
    device: &Device,
    params: &MethodParams,
    mode: ProgressMode,
    countdown_secs: u64,
) -> ExecutionOutcome {
    println!(
        "Format Unit will start on {} in {} seconds. Press Ctrl+C to cancel.",
        device.path, countdown_secs
    );
    for remaining in (1..=countdown_secs).rev() {
        if is_interrupted() {
            println!("Format Unit cancelled before dispatch.");
            return ExecutionOutcome::Aborted;
        }
        if remaining % 5 == 0 || remaining <= 3 {
            println!("  {} ...", remaining);
        }
        std::thread::sleep(Duration::from_secs(1));
    }
    if is_interrupted() {
        println!("Format Unit cancelled before dispatch.");
        return ExecutionOutcome::Aborted;
    }

    // Past this point there is no cancellation; the device owns the
    // operation once it accepts the command.
    dispatch(backend, device, params, mode)
}

fn dispatch(
    backend: &dyn DeviceCommands,
    device: &Device,
    params: &MethodParams,
    mode: ProgressMode,
) -> ExecutionOutcome {
    let status = backend.run_format_unit(device, params.fast_format, mode);
    let outcome = normalize::normalize_scsi(status);
    if outcome == ExecutionOutcome::Success && mode == ProgressMode::PollForProgress {
        ExecutionOutcome::InProgress
    } else {
        outcome
    }
}
