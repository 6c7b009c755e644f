//! Executes a rule's actions on the matched messages.
//!
//! Runs only after the rule's search succeeded. A `move` copies the
//! matched set to each destination, then flags the originals for
//! deletion; the flag becomes permanent when the mailbox closes. An
//! unknown action kind is recorded without stopping the other entries
//! of the same rule.

use crate::document::{Action, Location, Value, ValueNode};
use crate::errors::{ErrorList, Result};
use crate::process::{self, RuleProcessor};

/// Applies a rule's action entries, in document order.
///
/// A protocol-level failure during a move stops the remainder of the
/// rule's actions, the deletion mark included. Destination decode
/// failures and unknown kinds are recorded and the rest still runs.
pub fn execute(actions: &[Action], processor: &mut impl RuleProcessor) -> Result {
    let mut errors = ErrorList::new();
    let mut delete_source = false;

    for action in actions {
        match action.kind.as_str() {
            "move" => match move_action(&action.args, processor, &mut errors) {
                Ok(attempted) => delete_source |= attempted,
                Err(protocol_error) => {
                    errors.push(protocol_error);
                    return errors.into_result();
                }
            },
            _ => errors.push(Error::NotDefined {
                kind: action.kind.clone(),
                location: action.location,
            }),
        }
    }

    if delete_source {
        if let Err(error) = processor.mark_src_for_del() {
            errors.push(error);
        }
    }

    errors.into_result()
}

/// Copies the matched set to each destination of one `move` entry.
///
/// Returns whether at least one copy was attempted; protocol failures
/// bubble up, decode failures land in `errors`.
fn move_action(
    args: &[ValueNode],
    processor: &mut impl RuleProcessor,
    errors: &mut ErrorList,
) -> Result<bool, process::Error> {
    let mut attempted = false;
    for arg in args {
        let Value::Scalar(destination) = &arg.value else {
            errors.push(Error::InvalidDestination { location: arg.location });
            continue;
        };
        attempted = true;
        processor.move_to(destination)?;
    }
    Ok(attempted)
}

/// Errors that may occur while executing a rule's actions.
#[derive(Debug)]
pub enum Error {
    /// A move destination is not a plain string.
    InvalidDestination {
        /// Position of the argument.
        location: Location,
    },
    /// The action kind is not recognized.
    NotDefined {
        /// The kind, as spelled in the document.
        kind: String,
        /// Position of the action entry.
        location: Location,
    },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidDestination { location } => {
                write!(f, "{location}: move destination must be a mailbox name")
            }
            Self::NotDefined { kind, location } => {
                write!(f, "{location}: unknown action type {kind}")
            }
        }
    }
}
