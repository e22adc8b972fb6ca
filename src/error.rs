use thiserror::Error;

/// Errors surfaced by the flat JSON codec.
///
/// Cast failures are not errors: a value that cannot be represented in the
/// requested type becomes a NULL cell.
#[derive(Debug, Error)]
pub enum FlatJsonError {
    /// Caller misuse: bad config values, invalid seeks, malformed access paths
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted data does not match what the reader expects
    #[error("corruption: {0}")]
    Corruption(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlatJsonError>;

impl FlatJsonError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        FlatJsonError::InvalidArgument(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        FlatJsonError::Corruption(msg.into())
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, FlatJsonError::Corruption(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, FlatJsonError::InvalidArgument(_))
    }
}
