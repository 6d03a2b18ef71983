use crate::error::CoreError;
use crate::logging::LoggingConfig;
use std::path::Path;

/// Top-level server configuration, grounded on
/// `services/authenticator/src/core.rs::Config` (a serde struct loaded with
/// `serde_json::from_reader`) and the bind/worker-count knobs the runtime
/// needs per spec.md §4.E.
#[derive(serde_derive::Serialize, serde_derive::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind the line protocol ("osrv") listener to. Empty = any.
    pub line_host: String,
    pub line_port: u16,
    /// Host to bind the HTTP protocol ("ohsrv") listener to. Empty = any.
    pub http_host: String,
    pub http_port: u16,
    /// Worker thread count for both listeners, bounded 1..1000 per spec.md §5.
    pub workers: usize,
    /// Size of the HTTP parser's line buffer, in bytes.
    pub http_line_buffer: usize,
    /// Cap, in bytes, of the chunked HTTP sink's staging buffer.
    pub chunked_buffer_cap: usize,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            line_host: "127.0.0.1".into(),
            line_port: 8008,
            http_host: "127.0.0.1".into(),
            http_port: 8080,
            workers: 8,
            http_line_buffer: 32 * 1024,
            chunked_buffer_cap: 16 * 1024 * 1024,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a JSON file, the way `authenticator`'s
    /// `main.rs` loads its `Config`, generalized to `serdeconv`'s
    /// read-and-parse-in-one-step helper.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ServerConfig, CoreError> {
        let path = path.as_ref();
        serdeconv::from_json_file(path).map_err(|source| CoreError::ConfigLoad {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert!(config.workers >= 1 && config.workers <= 1000);
        assert_eq!(config.http_line_buffer, 32 * 1024);
    }

    #[test]
    fn roundtrips_through_json() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.line_port, config.line_port);
    }
}
