//! eno-resource
//!
//! The resource model of the synthesis pipeline: parse a manifest into a
//! typed [`Resource`], extract its control-plane annotations, compute the
//! content hash used for conflict resolution, and derive reconciliation
//! snapshots with overrides applied.

pub mod error;
pub mod managed;
pub mod overrides;
pub mod readiness;
pub mod resource;
pub mod snapshot;

pub use crate::error::ResourceError;
pub use crate::managed::{normalize_conflicting_managers, FieldManagerEntry, FIELD_MANAGER};
pub use crate::overrides::Override;
pub use crate::readiness::ReadinessCheck;
pub use crate::resource::{ParseMode, Resource};
pub use crate::snapshot::{snapshot, Snapshot};
