use thiserror::Error;

/// Crate-wide error type.
///
/// `InvalidInput` and `NotFound` are recoverable and meant to be shown to the user.
/// `NotReady` / `NotInitialized` mean an operation ran before its setup did.
#[derive(Debug, Error)]
pub enum Error {
    /// A prediction argument was empty or not a number.
    ///
    /// Carries only static text so rejecting input never allocates.
    #[error("invalid input for {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: &'static str,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not ready: {0}")]
    NotReady(&'static str),
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("training aborted: {0}")]
    Training(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors a user can fix by changing their input or action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InvalidInput { .. } | Error::NotFound(_))
    }
}
