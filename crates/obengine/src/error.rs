use std::io;

/// Errors surfaced by the SFS codec (component 4.D). Grounded on the failure
/// taxonomy in spec.md §4.D / §7: short reads and unknown tags are fatal,
/// an `ENV` tag is a warning that degrades to `null` and is not an error.
#[derive(thiserror::Error, Debug)]
pub enum SfsError {
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("unimplemented SFS tag {0}")]
    UnimplementedTag(u8),

    #[error("I/O error during SFS transport: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by the HTTP/1.x parser (component 4.F). Protocol errors
/// carry the status/response text the connection should send before closing,
/// per spec.md §7's "minimal HTTP error response and connection close" rule.
#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("unrecognized method with no argument separator")]
    UnrecognizedMethod,

    #[error("HTTP/1.1 request missing mandatory Host header")]
    MissingHost,

    #[error("request body or header exceeds the size limit")]
    TooLarge,

    #[error("I/O error on the connection: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,
}

impl HttpError {
    /// The status line this error should be reported to the client with,
    /// before the connection is closed, per the state-machine summary in
    /// spec.md §4.F.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            HttpError::MalformedRequestLine => (400, "Bad Request"),
            HttpError::UnrecognizedMethod => (501, "Not Implemented"),
            HttpError::MissingHost => (400, "Bad Request (Host: missing)"),
            HttpError::TooLarge => (413, "Payload Too Large"),
            HttpError::Io(_) | HttpError::ConnectionClosed => (500, "Internal Server Error"),
        }
    }
}

/// Umbrella error for the engine facade (component bridging 4.B/4.C); most
/// callers see the narrower sentinel return values (`Option`, `-1`) described
/// in spec.md instead, this exists for the handful of paths that need to
/// propagate with `?` internally.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("allocation failed")]
    Allocation,
    #[error(transparent)]
    Sfs(#[from] SfsError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
