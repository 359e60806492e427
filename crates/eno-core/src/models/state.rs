use serde::{Deserialize, Serialize};

/// Most recent observed reconciliation state of one resource.
///
/// Value equality between successive states drives the cache's enqueue
/// decisions, so every field participates in `PartialEq`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ready: Option<jiff::Timestamp>,
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl ResourceState {
    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }
}
