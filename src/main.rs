//! One-shot batch entry point.
//!
//! Resolves the fixed paths, builds the TLS connector from the trust
//! store, loads the rule document, then runs the validation pass and,
//! only if the document came out clean, the live pass. The first error
//! surviving a full traversal ends the run with a failure exit code.

use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mailbroom::document;
use mailbroom::errors::Result;
use mailbroom::process::live::LiveConfigProcessor;
use mailbroom::settings::Settings;
use mailbroom::traverse;
use mailbroom::trust;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run() {
        error!("{error}");
        std::process::exit(1);
    }
}

/// Runs the whole batch; any returned error is fatal.
fn run() -> Result {
    let settings = Settings::locate()?;
    let connector = trust::connector(settings.as_trust_store_path())?;

    info!(document = %settings.as_document_path().display(), "loading the rule document");
    let config = document::load(settings.as_document_path())?;

    // One instant anchors every relative duration of the run, in both
    // passes.
    let now = Utc::now();
    traverse::run(&config, &LiveConfigProcessor::new(connector), now)
}
