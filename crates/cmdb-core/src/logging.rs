//! Tracing subscriber for programs embedding the sync
//!
//! Logs go to stderr so reports written to stdout stay machine-readable.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding filter directives, e.g. `cmdb_rules=debug`
pub const LOG_ENV: &str = "CMDB_SYNC_LOG";

/// Sync crates at `info`, dependencies only when they warn
const DEFAULT_DIRECTIVES: &str = "warn,cmdb_core=info,cmdb_rules=info,cmdb_hosts=info";

fn filter(directives: Option<&str>) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(directives.unwrap_or(DEFAULT_DIRECTIVES))
}

/// Install the subscriber, filtered by [`LOG_ENV`]
///
/// Invalid directives and a second call are errors, never panics.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directives = std::env::var(LOG_ENV).ok();
    let filter_layer = filter(directives.as_deref())?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()?;

    Ok(())
}
