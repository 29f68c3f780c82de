use thiserror::Error;

/// Why a backend call failed. The taxonomy is deliberately small so callers
/// can decide between "retry later" and "show the server's message".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("request timed out")]
    Timeout,
    #[error("server returned status {0}")]
    ServerError(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The server understood the request and said no; the message is meant
    /// for the user verbatim.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComposeError {
    /// The selection cannot produce a valid document; no request was made.
    #[error("{0}")]
    InvalidSelection(String),
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
