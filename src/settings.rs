//! Resolves the fixed paths and bounds the program runs with.
//!
//! Everything here is computed once at startup and passed down by
//! reference; there is no mutable global state.

use core::time::Duration;
use std::path::PathBuf;

/// Fixed paths the program reads its inputs from.
#[derive(Debug)]
pub struct Settings {
    /// Rule document, most likely `~/.config/mailbroom/config.yaml`.
    document_path: PathBuf,
    /// Extra CA certificates, most likely `~/.config/ca.pem`.
    trust_store_path: PathBuf,
}

impl Settings {
    /// Name of the rule document inside the project directory.
    const DOCUMENT_FILE: &'static str = "config.yaml";
    /// Upper bound on waiting for the server's LOGOUT reply.
    ///
    /// This is the only explicit timeout in the program: a server that goes
    /// silent mid-run stalls the traversal, but it must not be able to keep
    /// the process alive forever on the way out.
    pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(1000);
    /// Directory under the user configuration directory.
    const PROJECT_DIR: &'static str = "mailbroom";
    /// Name of the trust store file, directly under the configuration
    /// directory.
    const TRUST_STORE_FILE: &'static str = "ca.pem";

    /// Returns the path of the rule document.
    #[must_use]
    pub fn as_document_path(&self) -> &std::path::Path {
        &self.document_path
    }

    /// Returns the path of the trust store.
    #[must_use]
    pub fn as_trust_store_path(&self) -> &std::path::Path {
        &self.trust_store_path
    }

    /// Resolves the paths from the platform configuration directory.
    pub fn locate() -> Result<Self, Error> {
        let config_dir = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        Ok(Self {
            document_path: config_dir.join(Self::PROJECT_DIR).join(Self::DOCUMENT_FILE),
            trust_store_path: config_dir.join(Self::TRUST_STORE_FILE),
        })
    }
}

/// Errors that may occur while resolving the fixed paths.
#[derive(Debug)]
pub enum Error {
    /// The platform has no user configuration directory.
    NoConfigDir,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoConfigDir => {
                write!(f, "no user configuration directory on this platform")
            }
        }
    }
}
