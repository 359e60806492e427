use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid override: {0}")]
    InvalidOverride(String),

    #[error("invalid readiness check: {0}")]
    InvalidReadiness(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResourceError {
    pub(crate) fn manifest(message: impl Into<String>) -> Self {
        ResourceError::InvalidManifest(message.into())
    }
}
