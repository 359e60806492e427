use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::models::meta::ObjectMeta;
use crate::models::refs::Nsn;

/// Reference to an external process that produces resources from inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Synthesizer {
    pub metadata: ObjectMeta,
    pub spec: SynthesizerSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesizerSpec {
    /// Container image the synthesis pod is expected to run.
    #[serde(default)]
    pub image: String,
    /// Command vector; an empty vector means the default `synthesize`
    /// binary on PATH.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Wall-clock cap on one synthesizer invocation.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exec_timeout: Option<SignedDuration>,
    /// Inputs the synthesizer consumes, keyed for binding lookup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<InputRef>,
}

/// One declared input. The composition may bind the key to a concrete
/// object; otherwise the ref's own name/namespace act as defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputRef {
    pub key: String,
    pub resource: InputResource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl InputResource {
    /// Default target when the composition carries no binding for the key.
    pub fn default_nsn(&self) -> Nsn {
        Nsn::new(self.namespace.clone(), self.name.clone())
    }
}
