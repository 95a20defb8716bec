//! Log subscriber setup for the `strata` binary

use crate::error::{EngineError, EngineResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Log output options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber; logs go to stderr
///
/// # Errors
/// `EngineError::Logging` when a subscriber is already installed or the
/// filter does not parse.
pub fn init_logging(options: &LogOptions) -> EngineResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.filter).map_err(|e| EngineError::Logging(e.to_string()))?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    if options.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| EngineError::Logging(e.to_string()))
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| EngineError::Logging(e.to_string()))
    }
}
