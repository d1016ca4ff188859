//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor a config level is given.
const DEFAULT_DIRECTIVES: &str = "schema_gateway=info,tower_http=info";

/// Build the filter directives for a configured level such as `"debug"`.
pub fn directives(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        DEFAULT_DIRECTIVES.to_string()
    } else {
        format!("schema_gateway={level},tower_http={level}")
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| directives(level).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
