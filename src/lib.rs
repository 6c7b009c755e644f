//! Unattended IMAP mailbox housekeeping.
//!
//! `mailbroom` reads a declarative rule document, validates the whole tree
//! without touching the network, then replays the same traversal against the
//! configured accounts: searching messages by the compiled criteria, copying
//! matches to their destinations and flagging the originals for deletion.

pub mod actions;
pub mod compiler;
pub mod document;
pub mod errors;
pub mod process;
pub mod settings;
pub mod traverse;
pub mod trust;
