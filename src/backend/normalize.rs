// Single point of failure-taxonomy normalization.
//
// Every backend-specific result code is mapped here, exactly once, into the
// shared ExecutionOutcome. The executor is the only caller; no other
// component may inspect raw backend codes.

use super::{AtaStatus, BackendStatus, NvmeStatus, OsStatus, ScsiStatus, TcgStatus};
use crate::ExecutionOutcome;

pub fn normalize_ata(status: AtaStatus) -> ExecutionOutcome {
    match status {
        AtaStatus::Success => ExecutionOutcome::Success,
        AtaStatus::Frozen => ExecutionOutcome::Frozen,
        AtaStatus::Aborted => ExecutionOutcome::Aborted,
        AtaStatus::NotSupported => ExecutionOutcome::NotSupported,
        AtaStatus::PasswordRejected => ExecutionOutcome::AccessDenied,
        AtaStatus::DeviceFault => ExecutionOutcome::Failure,
    }
}

pub fn normalize_scsi(status: ScsiStatus) -> ExecutionOutcome {
    match status {
        ScsiStatus::Good => ExecutionOutcome::Success,
        ScsiStatus::IllegalRequest => ExecutionOutcome::NotSupported,
        ScsiStatus::SanitizeInProgress => ExecutionOutcome::InProgress,
        // NOT READY outside a sanitize context still means "busy, wait".
        ScsiStatus::NotReady => ExecutionOutcome::InProgress,
        ScsiStatus::ReservationConflict => ExecutionOutcome::AccessDenied,
        ScsiStatus::AbortedCommand => ExecutionOutcome::Aborted,
        ScsiStatus::MediumError => ExecutionOutcome::Failure,
    }
}

pub fn normalize_nvme(status: NvmeStatus) -> ExecutionOutcome {
    match status {
        NvmeStatus::Success => ExecutionOutcome::Success,
        NvmeStatus::InvalidFieldInCommand => ExecutionOutcome::NotSupported,
        NvmeStatus::SanitizeInProgress | NvmeStatus::FormatInProgress => {
            ExecutionOutcome::InProgress
        }
        NvmeStatus::OperationDenied => ExecutionOutcome::AccessDenied,
        // Observed for Sanitize issued outside a boot/recovery environment.
        NvmeStatus::OsCommandNotAvailable => ExecutionOutcome::OsBlocked,
        NvmeStatus::InternalError => ExecutionOutcome::Failure,
    }
}

pub fn normalize_tcg(status: TcgStatus) -> ExecutionOutcome {
    match status {
        TcgStatus::Success => ExecutionOutcome::Success,
        TcgStatus::PowerCycleRequired => ExecutionOutcome::SuccessPendingPowerCycle,
        TcgStatus::NotAuthorized | TcgStatus::InvalidCredential => ExecutionOutcome::AccessDenied,
        TcgStatus::NotSupported => ExecutionOutcome::NotSupported,
        TcgStatus::Failed => ExecutionOutcome::Failure,
    }
}

pub fn normalize_os(status: OsStatus) -> ExecutionOutcome {
    match status {
        OsStatus::Success => ExecutionOutcome::Success,
        OsStatus::PermissionDenied => ExecutionOutcome::AccessDenied,
        OsStatus::Blocked => ExecutionOutcome::OsBlocked,
        OsStatus::Interrupted => ExecutionOutcome::Aborted,
        OsStatus::IoError => ExecutionOutcome::Failure,
    }
}

pub fn normalize(status: BackendStatus) -> ExecutionOutcome {
    match status {
        BackendStatus::Ata(s) => normalize_ata(s),
        BackendStatus::Scsi(s) => normalize_scsi(s),
        BackendStatus::Nvme(s) => normalize_nvme(s),
        BackendStatus::Tcg(s) => normalize_tcg(s),
        BackendStatus::Os(s) => normalize_os(s),
    }
}
