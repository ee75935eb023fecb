//! Subscriber bootstrap for embedding applications. The engine itself only emits events.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the verbosity-derived filter.
pub const LOG_ENV: &str = "S3PROBE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Filter directive for a `-v` count: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Installs a global subscriber writing to stderr. Returns false if one was already set.
pub fn init(format: LogFormat, verbosity: u8) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}
