//! Structured logging setup for the binary. Library code only emits `tracing` events.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::error::AlphaMintError;

pub const DEFAULT_LEVEL: &str = "info";

/// Installs a `fmt` subscriber on stderr. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<(), AlphaMintError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level)).map_err(
        |e| AlphaMintError::Logging {
            reason: format!("invalid log filter {level:?}: {e}"),
        },
    )?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| AlphaMintError::Logging {
            reason: e.to_string(),
        })?;

    Ok(())
}
