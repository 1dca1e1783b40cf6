use crate::TaskId;

/// Result alias that carries the custom [`SeedheadError`] type.
pub type Result<T> = std::result::Result<T, SeedheadError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SeedheadError {
    /// Free-form failure, mostly poisoned locks surfaced by the `lock()`
    /// helpers scattered through the crate.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be parsed or written.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// A configuration value failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A task id was looked up in the sequencer table without being
    /// registered first.
    #[error("unregistered task {0}")]
    UnregisteredTask(TaskId),
    /// Two tasks were configured with the same id.
    #[error("task {0} is registered more than once")]
    DuplicateTask(TaskId),
}

impl SeedheadError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SeedheadError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SeedheadError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
