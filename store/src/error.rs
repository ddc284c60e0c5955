use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("invoke of {service} failed: {message}")]
    Invoke { service: String, message: String },

    #[error("host error: {0}")]
    Host(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}
