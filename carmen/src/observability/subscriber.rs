//! Installing a `tracing` subscriber.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::CarmenError;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "carmen=info";

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs the global subscriber, filtered by `RUST_LOG` or
/// [`DEFAULT_FILTER`].
///
/// # Errors
///
/// Returns [`CarmenError::Observability`] if a global subscriber is
/// already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), CarmenError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    installed.map_err(|e| CarmenError::Observability(e.to_string()))
}
