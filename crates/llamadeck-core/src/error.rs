use thiserror::Error;

/// Coarse grouping of [`LlamaDeckError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, DNS or timeout failure before or while talking to the server.
    Transport,
    /// Unexpected status code, malformed NDJSON, or a stream that ended early.
    Protocol,
    /// An `error` field inside an otherwise successful stream.
    ServerReported,
    Cancelled,
    Invalid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlamaDeckError {
    #[error("Connection refused - is Ollama running? ({0})")]
    ConnectionRefused(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message reported by the server, displayed verbatim.
    #[error("{0}")]
    Server(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid model name: {0}")]
    InvalidModelName(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LlamaDeckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionRefused(_) | Self::Timeout(_) | Self::Http(_) => ErrorKind::Transport,
            Self::UnexpectedStatus { .. } | Self::Protocol(_) => ErrorKind::Protocol,
            Self::Server(_) => ErrorKind::ServerReported,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidModelName(_) | Self::Config(_) => ErrorKind::Invalid,
        }
    }
}

impl From<serde_json::Error> for LlamaDeckError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlamaDeckError>;
