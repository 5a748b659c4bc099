// Executor tests: range resolution laws, default-credential substitution,
// per-method dispatch and normalization through a scripted backend.

use super::*;
use crate::backend::{
    AtaStatus, BackendStatus, Device, Interface, MockDeviceCommands, NvmeStatus, OsStatus,
    ScsiStatus, TcgStatus,
};
use crate::{
    ConfirmationToken, EraseMethod, EraseRequest, ExecutionOutcome, MethodParams, ProgressMode,
    RequestedMethod, WriteAfterEraseRequirement, DEFAULT_ATA_SECURITY_PASSWORD, MAX_LBA_SENTINEL,
};
use mockall::Sequence;
use proptest::prelude::*;
use serial_test::serial;

fn test_device() -> Device {
    Device {
        path: "/dev/sdz".to_string(),
        interface: Interface::Ata,
        model: "Test Drive".to_string(),
        serial: "TST0001".to_string(),
        max_lba: 999,
        child_max_lba: None,
        block_size: 512,
    }
}

fn quiet_write_after(backend: &mut MockDeviceCommands) {
    backend
        .expect_query_write_after_erase()
        .returning(|_, _| WriteAfterEraseRequirement::None);
}

// ============================================================================
// Range resolution
// ============================================================================

#[test]
fn zero_range_expands_through_device_end() {
    // start=0, range=0 on a 1000-LBA device covers LBAs 0..=999.
    let (start, count) = resolve_range(Some(0), Some(0), 999, None).unwrap();
    assert_eq!((start, count), (0, 1000));
}

#[test]
fn max_range_expands_through_device_end() {
    let (start, count) = resolve_range(Some(10), Some(u64::MAX), 999, None).unwrap();
    assert_eq!((start, count), (10, 990));
}

#[test]
fn max_lba_sentinel_resolves_to_current_max() {
    let (start, count) = resolve_range(Some(MAX_LBA_SENTINEL), Some(0), 999, None).unwrap();
    assert_eq!((start, count), (999, 1));
}

#[test]
fn child_sentinel_resolves_to_child_max() {
    let (start, count) =
        resolve_range(Some(crate::CHILD_MAX_LBA_SENTINEL), Some(0), 999, Some(799)).unwrap();
    assert_eq!((start, count), (799, 201));
}

#[test]
fn range_clamped_to_device_end() {
    let (start, count) = resolve_range(Some(990), Some(100), 999, None).unwrap();
    assert_eq!((start, count), (990, 10));
}

#[test]
fn start_beyond_max_is_rejected() {
    assert!(resolve_range(Some(1000), Some(1), 999, None).is_err());
}

#[test]
fn capacity_colliding_with_a_sentinel_is_rejected() {
    // u64::MAX and u64::MAX - 1 stand for "current max LBA"; a capacity
    // equal to either is unrepresentable as a real LBA here.
    assert!(resolve_range(Some(0), Some(0), u64::MAX, None).is_err());
    assert!(resolve_range(Some(0), Some(0), crate::CHILD_MAX_LBA_SENTINEL, None).is_err());
}

#[test]
fn unset_start_and_range_cover_whole_device() {
    let (start, count) = resolve_range(None, None, 999, None).unwrap();
    assert_eq!((start, count), (0, 1000));
}

proptest! {
    // Resolution is a fixed point: feeding the resolved pair back in
    // yields the same pair, for any capacity and raw inputs.
    #[test]
    fn resolution_is_idempotent(
        max_lba in 1u64..1_000_000,
        raw_start in prop::option::of(0u64..1_000_000),
        raw_range in prop::option::of(0u64..2_000_000),
    ) {
        if let Ok((start, count)) = resolve_range(raw_start, raw_range, max_lba, None) {
            let again = resolve_range(Some(start), Some(count), max_lba, None).unwrap();
            prop_assert_eq!(again, (start, count));
        }
    }

    #[test]
    fn resolved_range_never_exceeds_device(
        max_lba in 1u64..1_000_000,
        raw_start in 0u64..1_000_000,
        raw_range in 0u64..2_000_000,
    ) {
        if let Ok((start, count)) = resolve_range(Some(raw_start), Some(raw_range), max_lba, None) {
            prop_assert!(count >= 1);
            prop_assert!(start + count - 1 <= max_lba);
        }
    }
}

// ============================================================================
// ATA security erase
// ============================================================================

#[test]
fn ata_erase_substitutes_default_password() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_ata_security_erase()
        .withf(|_, enhanced, password| *enhanced && password == DEFAULT_ATA_SECURITY_PASSWORD)
        .return_const(AtaStatus::Success);

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::AtaSecurityEraseEnhanced,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
}

#[test]
fn ata_erase_pads_user_password_to_32_bytes() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_ata_security_erase()
        .withf(|_, _, password| {
            password.starts_with(b"hunter2") && password[7..].iter().all(|&b| b == 0)
        })
        .return_const(AtaStatus::Success);

    let params = MethodParams {
        ata_password: Some(b"hunter2".to_vec()),
        ..Default::default()
    };
    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::AtaSecurityEraseNormal,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
}

#[test]
fn ata_frozen_surfaces_as_frozen() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_ata_security_erase()
        .return_const(AtaStatus::Frozen);

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::AtaSecurityEraseEnhanced,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Frozen);
    assert!(execution
        .outcome
        .remediation()
        .unwrap()
        .contains("power-cycle"));
}

// ============================================================================
// Sanitize
// ============================================================================

#[test]
fn sanitize_queries_write_after_before_dispatch() {
    let mut backend = MockDeviceCommands::new();
    backend
        .expect_query_write_after_erase()
        .withf(|_, method| *method == EraseMethod::SanitizeBlockErase)
        .return_const(WriteAfterEraseRequirement::RequiredBeforeReadsSucceed);
    backend
        .expect_run_sanitize()
        .return_const(BackendStatus::Scsi(ScsiStatus::Good));

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::SanitizeBlockErase,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
    assert_eq!(
        execution.write_after,
        WriteAfterEraseRequirement::RequiredBeforeReadsSucceed
    );
}

#[test]
fn sanitize_poll_mode_reports_in_progress_after_accepted_start() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_sanitize()
        .return_const(BackendStatus::Nvme(NvmeStatus::Success));

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::SanitizeCryptoErase,
        &MethodParams::default(),
        ProgressMode::PollForProgress,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::InProgress);
}

#[test]
fn sanitize_os_block_surfaces_as_os_blocked() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_sanitize()
        .return_const(BackendStatus::Nvme(NvmeStatus::OsCommandNotAvailable));

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::SanitizeBlockErase,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::OsBlocked);
}

// ============================================================================
// Trim / overwrite range behavior
// ============================================================================

#[test]
fn trim_resolves_range_against_live_capacity() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    // Live capacity differs from the handle's open-time snapshot.
    backend.expect_current_max_lba().returning(|_| Ok(1999));
    backend
        .expect_run_trim_unmap()
        .withf(|_, start, count| *start == 0 && *count == 2000)
        .return_const(BackendStatus::Os(OsStatus::Success));

    let params = MethodParams {
        start_lba: Some(0),
        lba_range: Some(0),
        ..Default::default()
    };
    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::TrimUnmap,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
}

#[test]
fn overwrite_runs_requested_pass_count() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend.expect_current_max_lba().returning(|_| Ok(999));
    backend
        .expect_run_host_overwrite()
        .times(3)
        .return_const(OsStatus::Success);

    let params = MethodParams {
        overwrite_passes: Some(3),
        ..Default::default()
    };
    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::HostOverwrite,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
}

#[test]
fn overwrite_stops_after_failed_pass() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend.expect_current_max_lba().returning(|_| Ok(999));
    backend
        .expect_run_host_overwrite()
        .times(1)
        .return_const(OsStatus::IoError);

    let params = MethodParams {
        overwrite_passes: Some(4),
        ..Default::default()
    };
    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::HostOverwrite,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Failure);
}

#[test]
fn timed_overwrite_skips_range_resolution() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_host_overwrite_timed()
        .return_const(OsStatus::Success);

    let params = MethodParams {
        overwrite_duration: Some(std::time::Duration::from_secs(60)),
        ..Default::default()
    };
    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::HostOverwrite,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
}

// ============================================================================
// Format Unit
// ============================================================================

#[test]
#[serial]
fn interrupted_countdown_aborts_before_format_dispatch() {
    crate::reset_interrupted();
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    let mut seq = Sequence::new();
    backend
        .expect_unmount_filesystems()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    backend
        .expect_lock_device()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    backend
        .expect_unlock_device()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    // No run_format_unit expectation: dispatch must never happen.

    crate::set_interrupted();
    let params = MethodParams {
        fast_format: true,
        ..Default::default()
    };
    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::FormatUnit,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap();
    crate::reset_interrupted();
    assert_eq!(execution.outcome, ExecutionOutcome::Aborted);
}

#[test]
#[serial]
fn format_unit_unlocks_after_failed_dispatch() {
    crate::reset_interrupted();
    let mut backend = MockDeviceCommands::new();
    backend.expect_unmount_filesystems().returning(|_| Ok(()));
    backend.expect_lock_device().returning(|_| Ok(()));
    backend
        .expect_run_format_unit()
        .times(1)
        .withf(|_, fast, _| *fast)
        .return_const(ScsiStatus::MediumError);
    backend
        .expect_unlock_device()
        .times(1)
        .returning(|_| Ok(()));

    let params = MethodParams {
        fast_format: true,
        ..Default::default()
    };
    let outcome = super::format_unit::run_with_countdown(
        &backend,
        &test_device(),
        &params,
        ProgressMode::Blocking,
        0,
    );
    assert_eq!(outcome, ExecutionOutcome::Failure);
}

#[test]
fn full_format_dispatches_without_unmount_or_lock() {
    // Only the fast path carries the unmount/lock/countdown safeguards;
    // any unmount_filesystems or lock_device call here panics.
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_format_unit()
        .times(1)
        .withf(|_, fast, _| !*fast)
        .return_const(ScsiStatus::Good);

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::FormatUnit,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Success);
}

// ============================================================================
// TCG
// ============================================================================

#[test]
fn revert_sp_without_psid_is_a_configuration_error() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    // No run_tcg_revert_sp expectation: the call must never happen.

    let err = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::TcgRevertSp,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap_err();
    assert!(matches!(err, crate::EraseError::MissingParameter(_)));
}

#[test]
fn revert_sp_rejects_short_psid() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);

    let params = MethodParams {
        psid: Some("TOOSHORT".to_string()),
        ..Default::default()
    };
    let err = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::TcgRevertSp,
        &params,
        ProgressMode::Blocking,
    )
    .unwrap_err();
    assert!(matches!(err, crate::EraseError::InvalidParameter(_)));
}

#[test]
fn revert_reports_pending_power_cycle() {
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_tcg_revert()
        .return_const(TcgStatus::PowerCycleRequired);

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::TcgRevert,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(
        execution.outcome,
        ExecutionOutcome::SuccessPendingPowerCycle
    );
}

// ============================================================================
// Explicit-but-unsupported requests
// ============================================================================

#[test]
fn explicit_unsupported_method_surfaces_devices_own_rejection() {
    // The snapshot may say unsupported, but an explicit request is still
    // dispatched; the device's NotSupported is what the user sees.
    let mut backend = MockDeviceCommands::new();
    quiet_write_after(&mut backend);
    backend
        .expect_run_ata_security_erase()
        .return_const(AtaStatus::NotSupported);

    let execution = EraseExecutor::execute(
        &backend,
        &test_device(),
        EraseMethod::AtaSecurityEraseNormal,
        &MethodParams::default(),
        ProgressMode::Blocking,
    )
    .unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::NotSupported);
}

// Request construction sanity used by the CLI layer.
#[test]
fn request_defaults_are_blocking_with_no_token() {
    let request = EraseRequest::new(RequestedMethod::Fastest, ConfirmationToken::None);
    assert_eq!(request.mode, ProgressMode::Blocking);
    assert_eq!(request.token, ConfirmationToken::None);
    assert_eq!(request.params, MethodParams::default());
}
