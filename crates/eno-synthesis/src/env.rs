use uuid::Uuid;

use eno_core::Nsn;

use crate::error::SynthesisError;

/// Environment injected into the synthesis pod by the orchestrator shell.
#[derive(Debug, Clone)]
pub struct SynthesisEnv {
    pub composition: Nsn,
    pub synthesis_uuid: Uuid,
    /// Image this pod is running; compared against the synthesizer spec.
    pub image: String,
}

impl SynthesisEnv {
    pub fn from_env() -> Result<Self, SynthesisError> {
        Ok(Self {
            composition: Nsn::new(
                require("COMPOSITION_NAMESPACE")?,
                require("COMPOSITION_NAME")?,
            ),
            synthesis_uuid: require("SYNTHESIS_UUID")?.parse()?,
            image: std::env::var("IMAGE").unwrap_or_default(),
        })
    }
}

fn require(key: &'static str) -> Result<String, SynthesisError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(SynthesisError::MissingEnv(key))
}
