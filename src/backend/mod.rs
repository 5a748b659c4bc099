// Device-command backend seam
//
// Everything wire-level lives behind the DeviceCommands trait: the
// orchestrator and executor only ever see the fixed set of raw status codes
// defined here, and those are mapped to ExecutionOutcome in exactly one
// place (normalize.rs). The production implementation shells out to the
// usual system tools (system.rs); tests script the trait.

pub mod normalize;
pub mod system;

pub use system::SystemCommands;

use crate::{EraseMethod, NvmFormatOptions, ProgressMode, WriteAfterEraseRequirement};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A backend call that could not be issued at all (tool missing, handle
/// gone). Distinct from a command the device accepted and failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("backend command failed: {0}")]
pub struct BackendError(pub String);

pub type BackendResult<T> = Result<T, BackendError>;

/// Transport family of an open device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interface {
    Ata,
    Scsi,
    Nvme,
}

/// An open, exclusively-owned device handle. Created per device per
/// invocation and closed on every exit path before the next device starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub path: String,
    pub interface: Interface,
    pub model: String,
    pub serial: String,
    /// Highest addressable LBA at open time. Range resolution re-reads the
    /// live value instead of trusting this snapshot.
    pub max_lba: u64,
    /// Max LBA of the child drive behind a SAT layer, when one exists.
    pub child_max_lba: Option<u64>,
    pub block_size: u32,
}

/// Raw per-method support as the firmware reports it. An unreadable bit is
/// recorded as such and degrades to "unsupported" in the snapshot; probing
/// never fails the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportBit {
    Supported,
    Unsupported,
    Unreadable,
}

/// Probe result: every method's support bit in the vendor/firmware-declared
/// priority order (index 0 = fastest), plus the drive's own full-surface
/// overwrite estimate when it declares one.
#[derive(Debug, Clone)]
pub struct RawCapabilities {
    pub methods_in_priority_order: Vec<(EraseMethod, SupportBit)>,
    pub overwrite_estimate: Option<Duration>,
}

/// Sanitize sub-operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeOperation {
    BlockErase,
    CryptoErase,
    OverwriteErase,
}

// Raw result codes, one small closed set per backend family. The executor
// never matches on these directly; see normalize.rs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaStatus {
    Success,
    Frozen,
    Aborted,
    NotSupported,
    PasswordRejected,
    DeviceFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScsiStatus {
    Good,
    IllegalRequest,
    SanitizeInProgress,
    NotReady,
    ReservationConflict,
    AbortedCommand,
    MediumError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvmeStatus {
    Success,
    InvalidFieldInCommand,
    SanitizeInProgress,
    FormatInProgress,
    OperationDenied,
    OsCommandNotAvailable,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcgStatus {
    Success,
    PowerCycleRequired,
    NotAuthorized,
    InvalidCredential,
    NotSupported,
    Failed,
}

/// Host-side I/O result for overwrite paths driven by this process rather
/// than device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsStatus {
    Success,
    PermissionDenied,
    Blocked,
    Interrupted,
    IoError,
}

/// Any raw status, tagged by family. Produced by backend calls whose family
/// depends on the device interface (trim/unmap, sanitize behind a SATL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Ata(AtaStatus),
    Scsi(ScsiStatus),
    Nvme(NvmeStatus),
    Tcg(TcgStatus),
    Os(OsStatus),
}

/// The external device-command library surface. Each method is one opaque
/// passthrough call; none of them retries or interprets results.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceCommands {
    fn open_device(&self, path: &str) -> BackendResult<Device>;
    fn close_device(&self, device: &mut Device);

    fn probe_capabilities(&self, device: &Device) -> BackendResult<RawCapabilities>;

    /// Live highest addressable LBA, re-read at call time.
    fn current_max_lba(&self, device: &Device) -> BackendResult<u64>;
    /// Capacity as the adapter/driver stack currently reports it, which can
    /// lag the drive after a max-LBA change until rescan.
    fn adapter_reported_max_lba(&self, device: &Device) -> BackendResult<u64>;
    fn restore_max_lba(&self, device: &Device) -> AtaStatus;

    fn run_sanitize(
        &self,
        device: &Device,
        op: SanitizeOperation,
        mode: ProgressMode,
    ) -> BackendStatus;
    fn run_ata_security_erase(
        &self,
        device: &Device,
        enhanced: bool,
        password: &[u8; 32],
    ) -> AtaStatus;
    fn run_nvm_format(
        &self,
        device: &Device,
        op: SanitizeOperation,
        options: &NvmFormatOptions,
        mode: ProgressMode,
    ) -> NvmeStatus;
    fn run_write_same(&self, device: &Device, start_lba: u64, count: u64) -> ScsiStatus;
    fn run_host_overwrite(
        &self,
        device: &Device,
        start_lba: u64,
        count: u64,
        pattern: &[u8],
    ) -> OsStatus;
    fn run_host_overwrite_timed(
        &self,
        device: &Device,
        duration: Duration,
        pattern: &[u8],
    ) -> OsStatus;
    fn run_trim_unmap(&self, device: &Device, start_lba: u64, count: u64) -> BackendStatus;
    fn run_format_unit(&self, device: &Device, fast: bool, mode: ProgressMode) -> ScsiStatus;
    fn run_tcg_revert<'a>(&self, device: &Device, sid: Option<&'a str>) -> TcgStatus;
    fn run_tcg_revert_sp(&self, device: &Device, psid: &str) -> TcgStatus;

    fn query_write_after_erase(
        &self,
        device: &Device,
        method: EraseMethod,
    ) -> WriteAfterEraseRequirement;

    fn refresh_filesystem_cache(&self, device: &Device) -> BackendResult<()>;
    fn lock_device(&self, device: &Device) -> BackendResult<()>;
    fn unlock_device(&self, device: &Device) -> BackendResult<()>;
    fn unmount_filesystems(&self, device: &Device) -> BackendResult<()>;

    fn set_write_read_verify(&self, device: &Device, enable: bool) -> AtaStatus;
}
