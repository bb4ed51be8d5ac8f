//! Error types for session API operations

/// Errors from session API operations.
///
/// `Transport`, `Server` and `Decode` are the three ways a remote call can
/// fail; callers map them straight into a flow failure without retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid form encoding: {0}")]
    InvalidEncoding(String),
}

impl Error {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport",
            Error::Server { .. } => "server",
            Error::Decode(_) => "decode",
            Error::InvalidUrl(_) => "invalid_url",
            Error::InvalidEncoding(_) => "invalid_encoding",
        }
    }
}

/// Result alias for session API operations.
pub type Result<T> = std::result::Result<T, Error>;
