use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("resource error: {0}")]
    Resource(#[from] eno_resource::ResourceError),

    #[error("slice {0} has no manifest bytes; informer copies cannot fill the cache")]
    PrunedSlice(String),
}
