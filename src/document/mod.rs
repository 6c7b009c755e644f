//! The in-memory rule tree and the loader that builds it.
//!
//! The tree is built once at startup and never mutated; the traversal
//! walks it twice (validation pass, then live pass). Every precondition,
//! value and action node carries its document [`Location`] so diagnostics
//! can point back into the file.

mod loader;
mod model;

pub use loader::{Error, from_str, load};
pub use model::{Account, Action, Config, Location, Mailbox, Precondition, Rule, Value, ValueNode};
