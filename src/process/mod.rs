//! The processor hierarchy driving the traversal.
//!
//! Four capability roles mirror the four levels of the rule tree; each
//! exists in two renditions: the [`null`] processors accept every
//! operation without side effects, so a full traversal through them
//! validates the whole document with zero network activity, and the
//! [`live`] processors perform the real IMAP operations. The traversal
//! is generic over the roles, so both passes share one walk.

pub mod live;
pub mod null;

use std::io;
use std::net::TcpStream;

use crate::compiler::TokenCollector;
use crate::document::Account;

/// Top-level role: hands out one processor per account.
pub trait ConfigProcessor {
    /// Processor for one account subtree.
    type Account: AccountProcessor;

    /// Creates the processor for the next account. Pure factory.
    fn new_account_processor(&self) -> Self::Account;
}

/// Per-account role: owns the network session for the account subtree.
pub trait AccountProcessor {
    /// Processor for one mailbox subtree.
    type Mailbox: MailboxProcessor;

    /// Opens a session on the account's server and authenticates.
    fn connect(&mut self, account: &Account) -> Result<(), Error>;

    /// Creates the processor for the next mailbox.
    fn new_mailbox_processor(&self) -> Self::Mailbox;

    /// Ends the session. Best effort, bounded in time.
    fn logout(&mut self) -> Result<(), Error>;
}

/// Per-mailbox role: selection, rule processors, and the closing
/// expunge.
pub trait MailboxProcessor {
    /// Processor for one rule.
    type Rule: RuleProcessor;

    /// Opens the named mailbox for reading and writing.
    fn select_mailbox(&mut self, name: &str) -> Result<(), Error>;

    /// Creates the processor for the next rule, with a fresh token
    /// accumulator and an empty match set.
    fn new_rule_processor(&self) -> Self::Rule;

    /// Shuts the mailbox, permanently erasing messages flagged for
    /// deletion.
    fn close(&mut self) -> Result<(), Error>;
}

/// Per-rule role: collects compiled search tokens, runs the search and
/// acts on the matches.
pub trait RuleProcessor: TokenCollector {
    /// Issues the accumulated tokens as one search query and keeps the
    /// matched message set. An empty accumulator searches `ALL`.
    fn search(&mut self) -> Result<(), Error>;

    /// Copies the matched set into the destination mailbox. No-op when
    /// nothing matched.
    fn move_to(&mut self, destination: &str) -> Result<(), Error>;

    /// Flags the matched set for deletion; erasure happens when the
    /// owning mailbox closes. No-op when nothing matched.
    fn mark_src_for_del(&mut self) -> Result<(), Error>;
}

/// Errors that may occur while driving an IMAP session.
#[derive(Debug)]
pub enum Error {
    /// No enabled authentication scheme produced a session.
    AuthenticationFailed {
        /// The server that rejected every attempt.
        host: String,
    },
    /// The server could not be reached.
    Dial(io::Error),
    /// The server greeted us with something unexpected.
    Greeting(imap::Error),
    /// A protocol command failed.
    Imap(imap::Error),
    /// The processor was driven without a live session.
    NotConnected,
    /// The TLS handshake was rejected.
    Handshake(native_tls::HandshakeError<TcpStream>),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AuthenticationFailed { host } => {
                write!(f, "authentication failed for {host}")
            }
            Self::Dial(error) => write!(f, "failed to reach the server: {error}"),
            Self::Greeting(error) => write!(f, "unexpected server greeting: {error}"),
            Self::Imap(error) => write!(f, "imap command failed: {error}"),
            Self::NotConnected => write!(f, "no active session"),
            Self::Handshake(error) => write!(f, "tls handshake failed: {error}"),
        }
    }
}
