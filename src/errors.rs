use thiserror::Error;

/// Result type alias for zipper operations
pub type Result<T, E = ZipperError> = std::result::Result<T, E>;

/// Errors that can end the service. Per-backend and per-response failures
/// never show up here; they are absorbed during the fan-out and merge and
/// surface, at most, as error statuses on individual replies.
#[derive(Error, Debug)]
pub enum ZipperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
