use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::meta::ObjectMeta;
use crate::models::state::ResourceState;

/// A container of up to a byte budget's worth of manifests, plus a status
/// array parallel to the spec array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSlice {
    pub metadata: ObjectMeta,
    pub spec: ResourceSliceSpec,
    #[serde(default)]
    pub status: ResourceSliceStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSliceSpec {
    /// UUID of the synthesis that produced this slice, stamped at creation.
    #[serde(rename = "synthesisUUID", skip_serializing_if = "Option::is_none", default)]
    pub synthesis_uuid: Option<Uuid>,
    #[serde(default)]
    pub resources: Vec<SliceManifest>,
}

/// One manifest entry in a slice spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliceManifest {
    /// Raw manifest JSON. Pruned in informer copies, which therefore must
    /// not be used to build trees.
    #[serde(default)]
    pub manifest: String,
    /// Tombstone flag: the downstream object should be deleted.
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSliceStatus {
    /// Parallel to `spec.resources`. `None` until the first status write
    /// initializes the array.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resources: Option<Vec<ResourceState>>,
}

impl ResourceSlice {
    /// Observed state for a given spec index, if the status array has been
    /// initialized and covers it.
    pub fn resource_state(&self, index: usize) -> Option<&ResourceState> {
        self.status.resources.as_ref().and_then(|r| r.get(index))
    }
}
