// Confirmation gate.
//
// A pure function from the selected method's minimum token to the token the
// user actually supplied. Runs after selection (so the denial names the
// actually-selected method) and before any device-mutating call; checked
// exactly once per device, never memoized.

use crate::{ConfirmationToken, EraseMethod, MethodParams};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{method:?} requires the {required:?} confirmation; rerun with: {example}")]
pub struct GateDenial {
    pub method: EraseMethod,
    pub required: ConfirmationToken,
    pub supplied: ConfirmationToken,
    /// A runnable command line showing exactly which flag and literal to
    /// add.
    pub example: String,
}

/// Minimum token for a method, given the request's parameters. Trim/unmap
/// is merely possibly-destructive (unallocated ranges lose nothing);
/// format-changing operations rank as low-level-format destructive;
/// everything else erases data outright.
pub fn required_token(method: EraseMethod, params: &MethodParams) -> ConfirmationToken {
    match method {
        EraseMethod::TrimUnmap => ConfirmationToken::PossibleDataErase,
        EraseMethod::FormatUnit => ConfirmationToken::LowLevelFormatAccept,
        EraseMethod::NvmFormatUserSecureErase | EraseMethod::NvmFormatCryptoSecureErase
            if params.nvm_options.changes_format() =>
        {
            ConfirmationToken::LowLevelFormatAccept
        }
        _ => ConfirmationToken::DataErase,
    }
}

pub fn check(
    method: EraseMethod,
    params: &MethodParams,
    supplied: ConfirmationToken,
) -> Result<(), GateDenial> {
    let required = required_token(method, params);
    if supplied >= required {
        return Ok(());
    }
    let literal = required
        .literal()
        .expect("every method's minimum is a real token");
    Err(GateDenial {
        method,
        required,
        supplied,
        example: format!(
            "oblivion erase <device> --method {} --confirm {}",
            method.cli_name(),
            literal
        ),
    })
}
