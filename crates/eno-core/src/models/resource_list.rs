use serde::{Deserialize, Serialize};

use crate::models::synthesis::SynthesisResult;

/// Wire document exchanged with a synthesizer process: inputs on stdin,
/// outputs (plus optional results) on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceList {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<SynthesisResult>,
}

impl ResourceList {
    pub const KIND: &'static str = "ResourceList";
    pub const API_VERSION: &'static str = "config.kubernetes.io/v1";

    pub fn new(items: Vec<serde_json::Value>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            api_version: Self::API_VERSION.to_string(),
            items,
            results: Vec::new(),
        }
    }
}

impl Default for ResourceList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
