use thiserror::Error;

/// Error taxonomy for control-plane I/O.
///
/// The distinctions matter to callers: conflicts re-run read-modify-write
/// loops, server timeouts retry locally with bounded backoff, and a slice
/// 404 during a status patch means the batch is moot.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("server timeout: {0}")]
    ServerTimeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }

    pub fn is_server_timeout(&self) -> bool {
        matches!(self, ClientError::ServerTimeout(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
