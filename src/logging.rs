use crate::errors::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Initializes structured logging on stderr.
///
/// The filter comes from `RUST_LOG` when set, otherwise `info`. Stdout is left
/// to the status lines printed by the workflow.
pub fn init_logging() -> AppResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| AppError::InvalidInput(format!("Failed to initialize logging: {e}")))?;

    Ok(())
}
