use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(
        "synthesizer command {0:?} not found; the synthesizer spec may not match the container image"
    )]
    MissingCommand(String),

    #[error("synthesizer exited with {0}")]
    SynthesizerExit(String),

    #[error("synthesizer timed out after {0}")]
    SynthesizerTimeout(jiff::SignedDuration),

    #[error("synthesizer wrote invalid json to stdout")]
    SynthesizerBadOutput,

    #[error("synthesis input error: {0}")]
    Input(String),

    #[error("invalid manifest at output index {index}: {source}")]
    InvalidOutput {
        index: usize,
        source: eno_resource::ResourceError,
    },

    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid synthesis UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("control plane error: {0}")]
    Client(#[from] eno_client::ClientError),

    #[error("slice error: {0}")]
    Slice(#[from] eno_slice::SliceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
