use store_traits::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Mirror cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task panicked: {0}")]
    TaskPanic(String),
}

impl MirrorError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Display message, with an actionable hint appended for permission
    /// failures. Permission errors are never retried, so the hint is the
    /// only path forward for the operator.
    pub fn detail(&self) -> String {
        match self {
            Self::Store(StoreError::PermissionDenied { message }) => format!(
                "{} (grant the app read access to this space and its assets, then re-run)",
                message
            ),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
