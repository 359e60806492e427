//! eno-client
//!
//! The seam between the synthesis core and the control plane. The
//! surrounding HTTP/RPC plumbing, informers, and leader election live
//! outside this workspace; the core consumes only [`ControlPlaneClient`].
//!
//! [`MemoryClient`] is a full in-process implementation with the same
//! optimistic-concurrency semantics, used by the executor and write-buffer
//! tests.

use std::future::Future;
use std::pin::Pin;

use eno_core::{Composition, Gvk, Nsn, ResourceSlice, Synthesizer};

pub mod error;
pub mod memory;
pub mod retry;

pub use crate::error::ClientError;
pub use crate::memory::MemoryClient;
pub use crate::retry::retry_on_server_timeout;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Typed access to the control-plane records the core reads and writes.
///
/// Methods take owned arguments for dyn compatibility. Status updates use
/// optimistic concurrency: the write carries the resource version the
/// caller read, and a mismatched version fails with
/// [`ClientError::Conflict`].
pub trait ControlPlaneClient: Send + Sync {
    fn get_composition(&self, nsn: Nsn) -> BoxFuture<'_, Result<Composition, ClientError>>;

    /// Write a composition's status subresource under resource-version CAS.
    fn update_composition_status(
        &self,
        composition: Composition,
    ) -> BoxFuture<'_, Result<Composition, ClientError>>;

    fn get_synthesizer(&self, name: String) -> BoxFuture<'_, Result<Synthesizer, ClientError>>;

    /// Fetch an input object as unstructured JSON.
    fn get_input(
        &self,
        gvk: Gvk,
        nsn: Nsn,
    ) -> BoxFuture<'_, Result<serde_json::Value, ClientError>>;

    fn create_slice(&self, slice: ResourceSlice) -> BoxFuture<'_, Result<ResourceSlice, ClientError>>;

    fn get_slice(&self, nsn: Nsn) -> BoxFuture<'_, Result<ResourceSlice, ClientError>>;

    /// Apply a JSON Patch to a slice's status subresource.
    fn patch_slice_status(
        &self,
        nsn: Nsn,
        patch: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), ClientError>>;
}
