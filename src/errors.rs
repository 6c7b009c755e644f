//! Handles errors, with a custom [`Result`] and [`Error`] type

use core::fmt;
use core::result;

use crate::{actions, compiler, document, process, settings, trust};

/// Errors that may occur while running the program.
#[derive(Debug)]
pub enum Error {
    /// Failure while executing a rule's actions.
    Action(actions::Error),
    /// Several errors gathered across sibling subtrees, in traversal order.
    Aggregate(Vec<Error>),
    /// Failure while compiling a precondition into search tokens.
    Compile(compiler::Error),
    /// Failure while loading the rule document.
    Document(document::Error),
    /// Failure while talking to an IMAP server.
    Session(process::Error),
    /// Failure while resolving the fixed paths.
    Settings(settings::Error),
    /// Failure while loading the trust store.
    Trust(trust::Error),
}

impl From<actions::Error> for Error {
    fn from(error: actions::Error) -> Self {
        Self::Action(error)
    }
}

impl From<compiler::Error> for Error {
    fn from(error: compiler::Error) -> Self {
        Self::Compile(error)
    }
}

impl From<document::Error> for Error {
    fn from(error: document::Error) -> Self {
        Self::Document(error)
    }
}

impl From<process::Error> for Error {
    fn from(error: process::Error) -> Self {
        Self::Session(error)
    }
}

impl From<settings::Error> for Error {
    fn from(error: settings::Error) -> Self {
        Self::Settings(error)
    }
}

impl From<trust::Error> for Error {
    fn from(error: trust::Error) -> Self {
        Self::Trust(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(error) => write!(f, "{error}"),
            Self::Aggregate(errors) => {
                let mut first = true;
                for error in errors {
                    if !first {
                        writeln!(f)?;
                    }
                    first = false;
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            Self::Compile(error) => write!(f, "{error}"),
            Self::Document(error) => write!(f, "{error}"),
            Self::Session(error) => write!(f, "{error}"),
            Self::Settings(error) => write!(f, "{error}"),
            Self::Trust(error) => write!(f, "{error}"),
        }
    }
}

/// Overloaded result for the [`mailbroom`](crate) crate
pub type Result<T = (), E = Error> = result::Result<T, E>;

/// Ordered accumulator for errors gathered across sibling subtrees.
///
/// Every pushed error is kept distinct; nothing is ever overwritten or
/// collapsed to a single cause.
#[derive(Debug, Default)]
pub struct ErrorList {
    /// Errors in the order they were gathered.
    errors: Vec<Error>,
}

impl ErrorList {
    /// Absorbs the error of a subtree result, if any.
    pub fn absorb<T>(&mut self, result: Result<T, impl Into<Error>>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Returns whether any error was gathered so far.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts the gathered errors back into a [`Result`].
    ///
    /// An empty list is `Ok`; a single error is returned as-is; several are
    /// wrapped in [`Error::Aggregate`].
    pub fn into_result(mut self) -> Result {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Aggregate(self.errors)),
        }
    }

    /// Appends one error, flattening nested aggregates to keep the list
    /// ordered and flat.
    pub fn push(&mut self, error: impl Into<Error>) {
        match error.into() {
            Error::Aggregate(errors) => self.errors.extend(errors),
            error => self.errors.push(error),
        }
    }
}
