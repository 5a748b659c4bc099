// Fastest-method selection.
//
// An explicit method request is passed through unconditionally: if the
// snapshot says it is unsupported, the device's own error is authoritative
// and surfaces later from the executor. Only a "fastest" request consults
// the snapshot, walking the firmware-declared priority order without
// re-sorting it.

use crate::capability::CapabilitySnapshot;
use crate::{EraseMethod, RequestedMethod};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no supported erase method on this device{}", hint.as_deref().map(|h| format!("; {}", h)).unwrap_or_default())]
    NotSupported { hint: Option<String> },
}

/// A chosen method plus an advisory the caller must surface. The only
/// advisory today is the explicit-PSID hint for a skipped RevertSP, attached
/// whether or not a slower fallback was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub method: EraseMethod,
    pub advisory: Option<String>,
}

pub fn select(
    snapshot: &CapabilitySnapshot,
    requested: RequestedMethod,
) -> Result<Selection, SelectionError> {
    let candidates = match requested {
        RequestedMethod::Explicit(method) => {
            return Ok(Selection {
                method,
                advisory: None,
            })
        }
        RequestedMethod::Fastest => &snapshot.supported_in_priority_order,
    };

    let mut revert_sp_seen = false;
    for &method in candidates {
        // RevertSP needs the 32-character PSID printed on the drive label;
        // it can never be chosen on the user's behalf.
        if method == EraseMethod::TcgRevertSp {
            revert_sp_seen = true;
            continue;
        }
        return Ok(Selection {
            method,
            advisory: revert_sp_seen.then(psid_hint),
        });
    }

    Err(SelectionError::NotSupported {
        hint: revert_sp_seen.then(psid_hint),
    })
}

fn psid_hint() -> String {
    format!(
        "this drive supports TCG RevertSP; request it explicitly with --method {} and the \
         32-character PSID from the drive label",
        EraseMethod::TcgRevertSp.cli_name()
    )
}
