use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
