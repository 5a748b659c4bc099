// Allow uppercase acronyms for industry-standard terms like ATA, NVM, TCG, PSID
#![allow(clippy::upper_case_acronyms)]

pub mod backend;
pub mod capability;
pub mod config;
pub mod confirm;
pub mod executor;
pub mod orchestrator;
pub mod reconcile;
pub mod selection;

// Re-export the orchestrator entry points for convenience
pub use orchestrator::{describe_erase_support, run_destructive_operation, Orchestrator};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

// Global flag for handling Ctrl+C interrupts
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set the interrupt flag (called by signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Check if an interrupt has been received
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the interrupt flag (primarily for testing)
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Configuration errors surface instead of an [`ExecutionOutcome`]: the
/// request was malformed before any device-mutating call could be issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EraseError {
    #[error("confirmation denied: {0}")]
    ConfirmationDenied(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid LBA range: {0}")]
    InvalidRange(String),

    #[error("device handle error: {0}")]
    DeviceHandle(String),
}

pub type EraseResult<T> = Result<T, EraseError>;

/// The closed set of erase primitives the orchestrator can dispatch.
///
/// Method-specific parameters (pass counts, LBA ranges, credentials) live in
/// [`MethodParams`] inside the [`EraseRequest`], so a capability listing can
/// name a method without fabricating credentials for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EraseMethod {
    TcgRevert,
    TcgRevertSp,
    SanitizeCryptoErase,
    SanitizeBlockErase,
    SanitizeOverwriteErase,
    NvmFormatUserSecureErase,
    NvmFormatCryptoSecureErase,
    AtaSecurityEraseEnhanced,
    AtaSecurityEraseNormal,
    WriteSame,
    HostOverwrite,
    FormatUnit,
    TrimUnmap,
}

impl EraseMethod {
    /// Every method, in the fixed probe order used when a firmware priority
    /// list is unavailable.
    pub const ALL: [EraseMethod; 13] = [
        EraseMethod::TcgRevert,
        EraseMethod::TcgRevertSp,
        EraseMethod::SanitizeCryptoErase,
        EraseMethod::SanitizeBlockErase,
        EraseMethod::SanitizeOverwriteErase,
        EraseMethod::NvmFormatUserSecureErase,
        EraseMethod::NvmFormatCryptoSecureErase,
        EraseMethod::AtaSecurityEraseEnhanced,
        EraseMethod::AtaSecurityEraseNormal,
        EraseMethod::WriteSame,
        EraseMethod::HostOverwrite,
        EraseMethod::FormatUnit,
        EraseMethod::TrimUnmap,
    ];

    pub fn from_cli_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.cli_name() == name)
    }

    /// Stable CLI spelling, used in denial messages and the support listing.
    pub fn cli_name(&self) -> &'static str {
        match self {
            EraseMethod::TcgRevert => "tcg-revert",
            EraseMethod::TcgRevertSp => "tcg-revert-sp",
            EraseMethod::SanitizeCryptoErase => "sanitize-crypto-erase",
            EraseMethod::SanitizeBlockErase => "sanitize-block-erase",
            EraseMethod::SanitizeOverwriteErase => "sanitize-overwrite-erase",
            EraseMethod::NvmFormatUserSecureErase => "nvm-format-user-secure-erase",
            EraseMethod::NvmFormatCryptoSecureErase => "nvm-format-crypto-secure-erase",
            EraseMethod::AtaSecurityEraseEnhanced => "ata-security-erase-enhanced",
            EraseMethod::AtaSecurityEraseNormal => "ata-security-erase-normal",
            EraseMethod::WriteSame => "write-same",
            EraseMethod::HostOverwrite => "overwrite",
            EraseMethod::FormatUnit => "format-unit",
            EraseMethod::TrimUnmap => "trim-unmap",
        }
    }
}

/// What the caller asked for: a specific method, or the fastest the device
/// supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestedMethod {
    Fastest,
    Explicit(EraseMethod),
}

/// Confirmation tokens in ascending destructiveness rank.
///
/// The derived `Ord` is the gate's entire comparison logic: a supplied token
/// authorizes a method iff it compares `>=` the method's minimum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ConfirmationToken {
    #[default]
    None,
    PossibleDataErase,
    DataErase,
    LowLevelFormatAccept,
}

/// Literal token strings. These are a compatibility surface consumed by
/// existing scripts; never edit them.
pub const TOKEN_POSSIBLE_DATA_ERASE: &str = "I-understand-this-may-erase-data";
pub const TOKEN_DATA_ERASE: &str = "I-understand-this-will-erase-data";
pub const TOKEN_LOW_LEVEL_FORMAT_ACCEPT: &str =
    "I-understand-this-will-erase-data-and-change-the-device-format";

impl ConfirmationToken {
    pub fn from_literal(s: &str) -> Option<Self> {
        match s {
            TOKEN_POSSIBLE_DATA_ERASE => Some(ConfirmationToken::PossibleDataErase),
            TOKEN_DATA_ERASE => Some(ConfirmationToken::DataErase),
            TOKEN_LOW_LEVEL_FORMAT_ACCEPT => Some(ConfirmationToken::LowLevelFormatAccept),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&'static str> {
        match self {
            ConfirmationToken::None => None,
            ConfirmationToken::PossibleDataErase => Some(TOKEN_POSSIBLE_DATA_ERASE),
            ConfirmationToken::DataErase => Some(TOKEN_DATA_ERASE),
            ConfirmationToken::LowLevelFormatAccept => Some(TOKEN_LOW_LEVEL_FORMAT_ACCEPT),
        }
    }
}

/// Device-declared obligation the host carries after an erase completes.
/// Queried once after method selection; shapes the outcome message only and
/// never blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WriteAfterEraseRequirement {
    #[default]
    None,
    ReadReturnsGoodStatus,
    MayRequireOverwriteDueToFormatting,
    RequiredBeforeReadsSucceed,
}

/// Normalized result of one destructive operation. Every backend-specific
/// status (sanitize FROZEN, ATA security FROZEN, NVMe
/// OS_COMMAND_NOT_AVAILABLE, ...) maps into exactly one of these inside the
/// executor before it reaches any caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success,
    SuccessPendingPowerCycle,
    InProgress,
    NotSupported,
    Frozen,
    Aborted,
    AccessDenied,
    OsBlocked,
    Failure,
}

impl ExecutionOutcome {
    /// Remediation text surfaced with the outcome, per the documented error
    /// taxonomy. Frozen and OS-blocked states carry the hints operators
    /// actually need; everything else speaks for itself.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ExecutionOutcome::Frozen => Some(
                "the drive is security-frozen; power-cycle the drive (or suspend/resume the \
                 host) and retry",
            ),
            ExecutionOutcome::InProgress => {
                Some("a sanitize operation is already running; wait for it to finish and retry")
            }
            ExecutionOutcome::OsBlocked => Some(
                "the operating system refused the command; retry from a boot or recovery \
                 environment where the OS does not hold the device",
            ),
            ExecutionOutcome::SuccessPendingPowerCycle => {
                Some("power-cycle the drive to complete the operation")
            }
            _ => None,
        }
    }
}

/// Blocking waits for device-side completion; PollForProgress issues the
/// start command and returns, leaving progress queries to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProgressMode {
    #[default]
    Blocking,
    PollForProgress,
}

/// Sentinel accepted anywhere an LBA is: "the device's current max LBA".
pub const MAX_LBA_SENTINEL: u64 = u64::MAX;
/// Sentinel for the max LBA of a child drive behind a SAT layer.
pub const CHILD_MAX_LBA_SENTINEL: u64 = u64::MAX - 1;

/// Fixed default credential substituted when the user supplies no ATA
/// security password. This is a deliberate compatibility behavior carried
/// from the original tool, not a security feature: drives left
/// security-enabled by an interrupted erase can always be unlocked with a
/// known value. Exactly 32 bytes, the size of the ATA password buffer.
pub const DEFAULT_ATA_SECURITY_PASSWORD: &[u8; 32] = b"oblivion-default-erase-password!";

/// Overwrite pass patterns for the host-overwrite path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverwritePattern {
    #[default]
    Zeros,
    Ones,
    Random,
    Fixed(Vec<u8>),
}

/// NVM Format protection-information and metadata sub-parameters. `None`
/// means "no change": the value currently on the namespace is kept, which is
/// different from defaulting to any specific setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NvmFormatOptions {
    pub protection_type: Option<u8>,
    pub protection_location_first: Option<bool>,
    pub metadata_extended: Option<bool>,
}

impl NvmFormatOptions {
    /// True when the request alters the on-media layout rather than only
    /// erasing content; such requests rank as low-level-format destructive.
    pub fn changes_format(&self) -> bool {
        self.protection_type.is_some()
            || self.protection_location_first.is_some()
            || self.metadata_extended.is_some()
    }
}

/// Method-specific parameters, all optional; each executor path reads only
/// the fields its method defines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MethodParams {
    /// Host-overwrite pass count; 1 when unset.
    pub overwrite_passes: Option<u32>,
    pub overwrite_pattern: OverwritePattern,
    /// Start LBA; may be a sentinel. Unset means LBA 0.
    pub start_lba: Option<u64>,
    /// Range in LBAs; 0 or max expands to "through the device's last LBA".
    pub lba_range: Option<u64>,
    /// Overwrite for a fixed wall-clock duration instead of a range.
    pub overwrite_duration: Option<std::time::Duration>,
    /// 32-character PSID from the drive label (TCG RevertSP).
    pub psid: Option<String>,
    /// SID credential (TCG Revert); defaults to MSID when unset.
    pub sid: Option<String>,
    /// ATA security password; the fixed default is substituted when unset.
    pub ata_password: Option<Vec<u8>>,
    pub nvm_options: NvmFormatOptions,
    /// Format Unit fast-format path (unmount + lock + countdown).
    pub fast_format: bool,
    /// Restore the factory max LBA before erasing so the full surface is
    /// covered; the reconciler verifies the adapter view afterwards.
    pub restore_max_lba: bool,
}

/// One immutable request, constructed once from parsed arguments and passed
/// through the whole pipeline. Replaces per-option mutable state so no
/// component reads a value another has not yet produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraseRequest {
    pub requested: RequestedMethod,
    pub token: ConfirmationToken,
    pub params: MethodParams,
    pub mode: ProgressMode,
}

impl EraseRequest {
    pub fn new(requested: RequestedMethod, token: ConfirmationToken) -> Self {
        Self {
            requested,
            token,
            params: MethodParams::default(),
            mode: ProgressMode::Blocking,
        }
    }
}

/// Process exit codes. The distinctions here are part of the scripting
/// surface and mirror the documented taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum UtilExitCode {
    Success = 0,
    InvalidCommandLine = 1,
    OperationFailure = 2,
    OperationNotSupported = 3,
    OperationAborted = 4,
    NeedsElevatedPrivileges = 5,
    InsecureFilePath = 6,
}

impl UtilExitCode {
    pub fn from_outcome(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success
            | ExecutionOutcome::SuccessPendingPowerCycle
            | ExecutionOutcome::InProgress => UtilExitCode::Success,
            ExecutionOutcome::NotSupported => UtilExitCode::OperationNotSupported,
            ExecutionOutcome::Aborted => UtilExitCode::OperationAborted,
            ExecutionOutcome::Frozen
            | ExecutionOutcome::AccessDenied
            | ExecutionOutcome::OsBlocked
            | ExecutionOutcome::Failure => UtilExitCode::OperationFailure,
        }
    }
}
