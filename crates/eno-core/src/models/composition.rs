use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotations;
use crate::models::meta::ObjectMeta;
use crate::models::refs::Nsn;
use crate::models::synthesis::Synthesis;

/// A declarative request naming a synthesizer and its input bindings; the
/// unit of work for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Composition {
    pub metadata: ObjectMeta,
    pub spec: CompositionSpec,
    #[serde(default)]
    pub status: CompositionStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositionSpec {
    /// Name of the synthesizer that produces this composition's resources.
    pub synthesizer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

/// Maps a synthesizer input key to a concrete object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Binding {
    pub key: String,
    pub resource: Nsn,
}

/// The three synthesis slots. See [`Synthesis`] for the rotation rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositionStatus {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub in_flight_synthesis: Option<Synthesis>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_synthesis: Option<Synthesis>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub previous_synthesis: Option<Synthesis>,
}

impl Composition {
    pub fn nsn(&self) -> Nsn {
        self.metadata.nsn()
    }

    /// A deletion timestamp marks the composition as being torn down.
    pub fn deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Orphan deletion strategy: downstream objects outlive the composition.
    pub fn orphan(&self) -> bool {
        self.metadata.annotation(annotations::DELETION_STRATEGY)
            == Some(annotations::DELETION_STRATEGY_ORPHAN)
    }

    /// Binding for a given input key, if the composition declares one.
    pub fn binding(&self, key: &str) -> Option<&Binding> {
        self.spec.bindings.iter().find(|b| b.key == key)
    }

    /// True while the current or previous slot references the synthesis.
    /// Trees for unreferenced syntheses are eligible for purging.
    pub fn references_synthesis(&self, uuid: Uuid) -> bool {
        [&self.status.current_synthesis, &self.status.previous_synthesis]
            .into_iter()
            .flatten()
            .any(|s| s.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_reads_deletion_strategy_annotation() {
        let mut composition = Composition::default();
        assert!(!composition.orphan());

        composition.metadata.annotations.insert(
            annotations::DELETION_STRATEGY.into(),
            annotations::DELETION_STRATEGY_ORPHAN.into(),
        );
        assert!(composition.orphan());
    }

    #[test]
    fn references_synthesis_checks_both_retained_slots() {
        let uuid = Uuid::new_v4();
        let mut composition = Composition::default();
        assert!(!composition.references_synthesis(uuid));

        composition.status.in_flight_synthesis = Some(Synthesis {
            uuid,
            ..Synthesis::default()
        });
        // In-flight does not pin a tree.
        assert!(!composition.references_synthesis(uuid));

        composition.status.previous_synthesis = Some(Synthesis {
            uuid,
            ..Synthesis::default()
        });
        assert!(composition.references_synthesis(uuid));
    }
}
