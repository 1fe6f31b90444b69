//! Tracing subscriber setup for the server binary

use crate::error::{BalancerError, Result};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Crates that are chatty below `warn`
const QUIET_TARGETS: &[&str] = &["sqlparser"];

/// Build the filter: `RUST_LOG` wins when set, otherwise `level` for
/// everything except the quiet targets.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
    let filter = directives.join(",");

    EnvFilter::try_new(&filter)
        .map_err(|e| BalancerError::Config(format!("invalid log filter '{}': {}", filter, e)))
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(level)?)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(true)
        .try_init()
        .map_err(|e| BalancerError::Config(format!("failed to install tracing subscriber: {}", e)))
}
