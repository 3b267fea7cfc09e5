use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
