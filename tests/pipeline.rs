/// End-to-end pipeline tests over a scripted backend: probe, selection,
/// confirmation gating, execution and post-erase reconciliation, asserted
/// against the exact device calls each run is allowed to make.

mod common;

use common::scripted_backend::ScriptedBackend;
use oblivion_erase::backend::{AtaStatus, BackendStatus};
use oblivion_erase::{
    run_destructive_operation, ConfirmationToken, EraseError, EraseMethod, EraseRequest,
    ExecutionOutcome, RequestedMethod, WriteAfterEraseRequirement, TOKEN_DATA_ERASE,
};

#[test]
fn sanitize_only_device_fastest_succeeds_and_refreshes_cache() {
    let backend = ScriptedBackend::new(999).supporting(EraseMethod::SanitizeBlockErase);
    let request = EraseRequest::new(RequestedMethod::Fastest, ConfirmationToken::DataErase);

    let outcome = run_destructive_operation(&backend, "/dev/sdz", &request).unwrap();

    assert_eq!(outcome, ExecutionOutcome::Success);
    assert!(backend.was_called("sanitize BlockErase"));
    assert!(backend.was_called("refresh_fs_cache"));
    assert_eq!(backend.calls().last().unwrap(), "close /dev/sdz");
}

#[test]
fn weak_token_is_denied_before_any_device_command() {
    let backend = ScriptedBackend::new(999).supporting(EraseMethod::AtaSecurityEraseEnhanced);
    let request = EraseRequest::new(
        RequestedMethod::Explicit(EraseMethod::AtaSecurityEraseEnhanced),
        ConfirmationToken::PossibleDataErase,
    );

    let err = run_destructive_operation(&backend, "/dev/sdz", &request).unwrap_err();

    match err {
        EraseError::ConfirmationDenied(msg) => {
            assert!(msg.contains(TOKEN_DATA_ERASE), "denial names the required token");
            assert!(msg.contains("ata-security-erase-enhanced"));
        }
        other => panic!("expected a confirmation denial, got {:?}", other),
    }
    // Only the read-only preamble ran; the handle was still closed.
    let calls = backend.calls();
    assert_eq!(
        calls,
        vec!["open /dev/sdz", "probe", "close /dev/sdz"],
        "denial must precede every device-mutating call"
    );
}

#[test]
fn trim_with_zero_range_covers_the_whole_device() {
    let backend = ScriptedBackend::new(999).supporting(EraseMethod::TrimUnmap);
    let mut request = EraseRequest::new(
        RequestedMethod::Explicit(EraseMethod::TrimUnmap),
        ConfirmationToken::PossibleDataErase,
    );
    request.params.start_lba = Some(0);
    request.params.lba_range = Some(0);

    let outcome = run_destructive_operation(&backend, "/dev/sdz", &request).unwrap();

    assert_eq!(outcome, ExecutionOutcome::Success);
    // LBAs 0 through 999 inclusive, so a count of 1000.
    assert!(backend.was_called("trim 0 1000"), "calls: {:?}", backend.calls());
}

#[test]
fn frozen_sanitize_is_reported_without_retry() {
    let backend = ScriptedBackend::new(999)
        .supporting(EraseMethod::SanitizeBlockErase)
        .sanitize_status(BackendStatus::Ata(AtaStatus::Frozen));
    let request = EraseRequest::new(RequestedMethod::Fastest, ConfirmationToken::DataErase);

    let outcome = run_destructive_operation(&backend, "/dev/sdz", &request).unwrap();

    assert_eq!(outcome, ExecutionOutcome::Frozen);
    let sanitize_calls = backend
        .calls()
        .iter()
        .filter(|c| c.starts_with("sanitize"))
        .count();
    assert_eq!(sanitize_calls, 1, "a frozen drive is never retried");
    assert!(outcome.remediation().unwrap().contains("power-cycle"));
    assert!(!backend.was_called("refresh_fs_cache"));
}

#[test]
fn crypto_format_success_suppresses_cache_refresh_when_reads_will_fail() {
    let backend = ScriptedBackend::new(999)
        .supporting(EraseMethod::NvmFormatCryptoSecureErase)
        .write_after(WriteAfterEraseRequirement::RequiredBeforeReadsSucceed);
    let request = EraseRequest::new(RequestedMethod::Fastest, ConfirmationToken::DataErase);

    let outcome = run_destructive_operation(&backend, "/dev/nvme0n1", &request).unwrap();

    assert_eq!(outcome, ExecutionOutcome::Success);
    assert!(backend.was_called("nvm_format"));
    assert!(
        !backend.was_called("refresh_fs_cache"),
        "refreshing would read a device whose reads are expected to fail"
    );
}

#[test]
fn restore_max_lba_precedes_the_erase() {
    let backend = ScriptedBackend::new(999).supporting(EraseMethod::SanitizeCryptoErase);
    let mut request = EraseRequest::new(RequestedMethod::Fastest, ConfirmationToken::DataErase);
    request.params.restore_max_lba = true;

    let outcome = run_destructive_operation(&backend, "/dev/sdz", &request).unwrap();

    assert_eq!(outcome, ExecutionOutcome::Success);
    let calls = backend.calls();
    let restore = calls.iter().position(|c| c == "restore_max_lba").unwrap();
    let sanitize = calls.iter().position(|c| c.starts_with("sanitize")).unwrap();
    assert!(restore < sanitize);
}

#[test]
fn unsupported_fastest_request_reports_not_supported() {
    let backend = ScriptedBackend::new(999);
    let request = EraseRequest::new(RequestedMethod::Fastest, ConfirmationToken::DataErase);

    let outcome = run_destructive_operation(&backend, "/dev/sdz", &request).unwrap();

    assert_eq!(outcome, ExecutionOutcome::NotSupported);
    assert_eq!(
        backend.calls(),
        vec!["open /dev/sdz", "probe", "close /dev/sdz"]
    );
}
