//! Logging setup for the cockroach-doctor binary.
//!
//! Diagnostic commentary owns stdout, so log records always go to stderr.
//! `RUST_LOG` overrides the level picked from the command-line flags.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{DoctorError, Result};

/// Level selected by the verbosity flags (0=WARN, 1=INFO, 2=DEBUG, 3+=TRACE)
#[must_use]
pub const fn level_for(verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

/// Initializes structured logging on stderr.
///
/// # Arguments
/// * `verbose` - Number of `-v` flags
/// * `quiet` - If true, only show ERROR level logs
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| DoctorError::config_error(format!("Failed to initialize logging: {e}")))?;

    Ok(())
}
