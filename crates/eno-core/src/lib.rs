//! eno-core
//!
//! Pure domain types and annotation conventions for the Eno synthesis
//! pipeline. No control-plane client dependency; this is the shared
//! vocabulary of the system.

pub mod annotations;
pub mod models;

pub use crate::models::composition::{Binding, Composition, CompositionSpec, CompositionStatus};
pub use crate::models::meta::{ObjectMeta, OwnerReference};
pub use crate::models::refs::{GroupKind, Gvk, ManifestRef, Nsn, Ref, SliceRef};
pub use crate::models::resource_list::ResourceList;
pub use crate::models::slice::{ResourceSlice, ResourceSliceSpec, ResourceSliceStatus, SliceManifest};
pub use crate::models::state::ResourceState;
pub use crate::models::synthesis::{InputRevisions, ResultSeverity, Synthesis, SynthesisResult};
pub use crate::models::synthesizer::{InputRef, InputResource, Synthesizer, SynthesizerSpec};
