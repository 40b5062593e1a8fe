//! Structured JSON logging for processes that use the crypter.
//!
//! # Telemetry invariants
//!
//! - **No key material or plaintext** may appear in any log field. Wrapped
//!   DEKs are logged only as [`crate::dek::fingerprint`]s.
//! - A non-empty `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Parse `log_level` (`CRYPTER_LOG_LEVEL`) as a tracing filter directive,
/// e.g. `info` or `crypter=debug,warn`.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid directive.
pub fn level_filter(log_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(log_level)
        .with_context(|| format!("CRYPTER_LOG_LEVEL {log_level:?} is not a valid tracing filter"))
}

/// Install the global tracing subscriber.
///
/// Outputs structured JSON logs to stdout at `log_level` unless `RUST_LOG`
/// is set.
///
/// # Errors
///
/// Returns an error if either filter fails to parse or a global subscriber
/// has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("RUST_LOG {directives:?} is not a valid tracing filter"))?,
        _ => level_filter(log_level)?,
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing subscriber: {e}"))
}
