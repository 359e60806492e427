use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::refs::SliceRef;

/// One execution of a synthesizer for one composition generation.
///
/// Lives in one of the composition's three status slots. A new synthesis
/// enters `in_flight`; a successful commit rotates it into `current` and
/// the old `current` into `previous` within a single status update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Synthesis {
    pub uuid: Uuid,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub initialized: Option<jiff::Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub synthesized: Option<jiff::Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub canceled: Option<jiff::Timestamp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_slices: Vec<SliceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_revisions: Vec<InputRevisions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<SynthesisResult>,
}

impl Synthesis {
    /// True when any result reports error severity. A failed synthesis is
    /// retained in flight instead of rotating into the current slot.
    pub fn failed(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.severity == ResultSeverity::Error)
    }
}

/// Versions observed on one input object at synthesis time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRevisions {
    pub key: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub revision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub synthesizer_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub composition_generation: Option<i64>,
}

/// Message surfaced by a synthesizer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub message: String,
    #[serde(default)]
    pub severity: ResultSeverity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSeverity {
    #[default]
    Info,
    Warning,
    /// Signals a synthesis-level failure; the current-synthesis slot is
    /// not rotated while one of these is present.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_requires_error_severity() {
        let mut synthesis = Synthesis::default();
        assert!(!synthesis.failed());

        synthesis.results.push(SynthesisResult {
            message: "only a warning".into(),
            severity: ResultSeverity::Warning,
            tags: BTreeMap::new(),
        });
        assert!(!synthesis.failed());

        synthesis.results.push(SynthesisResult {
            message: "boom".into(),
            severity: ResultSeverity::Error,
            tags: BTreeMap::new(),
        });
        assert!(synthesis.failed());
    }
}
