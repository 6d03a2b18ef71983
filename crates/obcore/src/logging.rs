//! Logger construction, generalized from `flux::logging`. The original only
//! ever built a hardcoded terminal logger and threw the result away; here the
//! config is actually threaded through to the caller and destinations beyond
//! the terminal are supported.

pub use slog::{debug, error, info, o, warn, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Logging configuration, loaded as part of the server config file.
#[derive(serde_derive::Serialize, serde_derive::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub destination: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".into(),
            destination: "stderr".into(),
        }
    }
}

/// Builds a root logger from the supplied configuration. Falls back to an
/// `info`-level stderr logger if the level string doesn't parse, rather than
/// failing startup over a typo in a config file.
pub fn init(config: &LoggingConfig) -> Logger {
    let severity = config.level.parse::<Severity>().unwrap_or(Severity::Info);

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(severity);
    builder.destination(match config.destination.as_str() {
        "stdout" => Destination::Stdout,
        _ => Destination::Stderr,
    });

    builder
        .build()
        .unwrap_or_else(|_| Logger::root(slog::Discard, o!()))
}
