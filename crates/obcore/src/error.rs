/// Errors surfaced by the ambient stack (config loading, logging setup).
/// Subsystem-specific errors (engine, codec, protocol) live in `obengine`.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("failed to load config file {path}: {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: serdeconv::Error,
    },

    #[error("failed to build logger: {0}")]
    LoggerInit(String),
}
