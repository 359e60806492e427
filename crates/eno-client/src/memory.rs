use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use eno_core::{Composition, Gvk, Nsn, ResourceSlice, Synthesizer};

use crate::error::ClientError;
use crate::{BoxFuture, ControlPlaneClient};

/// In-process [`ControlPlaneClient`] with real optimistic-concurrency
/// semantics: status updates CAS on resource version, slice status patches
/// honor JSON-Patch `test` preconditions, and callers can inject failures
/// to exercise retry paths.
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    compositions: HashMap<Nsn, Composition>,
    synthesizers: HashMap<String, Synthesizer>,
    inputs: HashMap<(Gvk, Nsn), serde_json::Value>,
    slices: HashMap<Nsn, ResourceSlice>,
    next_resource_version: u64,
    injected_patch_errors: VecDeque<ClientError>,
    injected_create_errors: VecDeque<ClientError>,
    injected_status_errors: VecDeque<ClientError>,
    slice_patch_attempts: usize,
    slice_create_attempts: usize,
    status_update_attempts: usize,
}

impl MemoryState {
    fn next_rv(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a composition, stamping a fresh resource version.
    pub fn put_composition(&self, mut composition: Composition) {
        let mut state = self.state.lock().unwrap();
        composition.metadata.resource_version = Some(state.next_rv());
        state
            .compositions
            .insert(composition.nsn(), composition);
    }

    pub fn put_synthesizer(&self, synthesizer: Synthesizer) {
        let mut state = self.state.lock().unwrap();
        state
            .synthesizers
            .insert(synthesizer.metadata.name.clone(), synthesizer);
    }

    pub fn put_input(&self, gvk: Gvk, nsn: Nsn, object: serde_json::Value) {
        self.state.lock().unwrap().inputs.insert((gvk, nsn), object);
    }

    pub fn put_slice(&self, mut slice: ResourceSlice) {
        let mut state = self.state.lock().unwrap();
        slice.metadata.resource_version = Some(state.next_rv());
        state.slices.insert(slice.metadata.nsn(), slice);
    }

    pub fn remove_slice(&self, nsn: &Nsn) {
        self.state.lock().unwrap().slices.remove(nsn);
    }

    /// Current copy of a composition, if stored.
    pub fn composition(&self, nsn: &Nsn) -> Option<Composition> {
        self.state.lock().unwrap().compositions.get(nsn).cloned()
    }

    /// Current copy of a slice, if stored.
    pub fn slice(&self, nsn: &Nsn) -> Option<ResourceSlice> {
        self.state.lock().unwrap().slices.get(nsn).cloned()
    }

    /// All stored slices, in no particular order.
    pub fn slices(&self) -> Vec<ResourceSlice> {
        self.state.lock().unwrap().slices.values().cloned().collect()
    }

    /// Queue an error to be returned by the next slice status patch
    /// instead of applying it.
    pub fn fail_next_slice_patch(&self, err: ClientError) {
        self.state
            .lock()
            .unwrap()
            .injected_patch_errors
            .push_back(err);
    }

    /// Queue an error for the next slice create instead of storing it.
    pub fn fail_next_slice_create(&self, err: ClientError) {
        self.state
            .lock()
            .unwrap()
            .injected_create_errors
            .push_back(err);
    }

    /// Queue an error for the next composition status update.
    pub fn fail_next_status_update(&self, err: ClientError) {
        self.state
            .lock()
            .unwrap()
            .injected_status_errors
            .push_back(err);
    }

    /// Number of slice status patch requests issued so far, including
    /// failed ones.
    pub fn slice_patch_attempts(&self) -> usize {
        self.state.lock().unwrap().slice_patch_attempts
    }

    /// Number of slice create requests issued so far, including failed
    /// ones.
    pub fn slice_create_attempts(&self) -> usize {
        self.state.lock().unwrap().slice_create_attempts
    }

    /// Number of composition status update requests issued so far,
    /// including failed ones.
    pub fn status_update_attempts(&self) -> usize {
        self.state.lock().unwrap().status_update_attempts
    }
}

impl ControlPlaneClient for MemoryClient {
    fn get_composition(&self, nsn: Nsn) -> BoxFuture<'_, Result<Composition, ClientError>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .compositions
                .get(&nsn)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(format!("composition {nsn}")))
        })
    }

    fn update_composition_status(
        &self,
        composition: Composition,
    ) -> BoxFuture<'_, Result<Composition, ClientError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.status_update_attempts += 1;
            if let Some(err) = state.injected_status_errors.pop_front() {
                return Err(err);
            }
            let nsn = composition.nsn();
            let rv = state.next_rv();
            let stored = state
                .compositions
                .get_mut(&nsn)
                .ok_or_else(|| ClientError::NotFound(format!("composition {nsn}")))?;
            if stored.metadata.resource_version != composition.metadata.resource_version {
                return Err(ClientError::Conflict(format!(
                    "composition {nsn}: stale resource version"
                )));
            }
            stored.status = composition.status;
            stored.metadata.resource_version = Some(rv);
            Ok(stored.clone())
        })
    }

    fn get_synthesizer(&self, name: String) -> BoxFuture<'_, Result<Synthesizer, ClientError>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .synthesizers
                .get(&name)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(format!("synthesizer {name}")))
        })
    }

    fn get_input(
        &self,
        gvk: Gvk,
        nsn: Nsn,
    ) -> BoxFuture<'_, Result<serde_json::Value, ClientError>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .inputs
                .get(&(gvk.clone(), nsn.clone()))
                .cloned()
                .ok_or_else(|| {
                    ClientError::NotFound(format!("input {}/{} {nsn}", gvk.group, gvk.kind))
                })
        })
    }

    fn create_slice(&self, mut slice: ResourceSlice) -> BoxFuture<'_, Result<ResourceSlice, ClientError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.slice_create_attempts += 1;
            if let Some(err) = state.injected_create_errors.pop_front() {
                return Err(err);
            }
            slice.metadata.resource_version = Some(state.next_rv());
            state.slices.insert(slice.metadata.nsn(), slice.clone());
            Ok(slice)
        })
    }

    fn get_slice(&self, nsn: Nsn) -> BoxFuture<'_, Result<ResourceSlice, ClientError>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .slices
                .get(&nsn)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(format!("resource slice {nsn}")))
        })
    }

    fn patch_slice_status(
        &self,
        nsn: Nsn,
        patch: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.slice_patch_attempts += 1;
            if let Some(err) = state.injected_patch_errors.pop_front() {
                return Err(err);
            }
            let rv = state.next_rv();
            let slice = state
                .slices
                .get_mut(&nsn)
                .ok_or_else(|| ClientError::NotFound(format!("resource slice {nsn}")))?;

            let mut doc = serde_json::to_value(&*slice)?;
            apply_json_patch(&mut doc, &patch)?;
            let mut patched: ResourceSlice = serde_json::from_value(doc)?;
            patched.metadata.resource_version = Some(rv);
            *slice = patched;
            Ok(())
        })
    }
}

/// Apply a JSON Patch document (`test`/`add`/`replace` ops) in place.
/// A failed `test` precondition maps to [`ClientError::Conflict`], the
/// same class an apiserver reports for it.
fn apply_json_patch(doc: &mut serde_json::Value, patch: &serde_json::Value) -> Result<(), ClientError> {
    let ops = patch
        .as_array()
        .ok_or_else(|| ClientError::Serialization("patch is not an array".into()))?;

    for op in ops {
        let kind = op.get("op").and_then(|v| v.as_str()).unwrap_or_default();
        let path = op.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let value = op.get("value").cloned().unwrap_or(serde_json::Value::Null);

        match kind {
            "test" => {
                let current = doc.pointer(path).cloned().unwrap_or(serde_json::Value::Null);
                if current != value {
                    return Err(ClientError::Conflict(format!(
                        "test failed at {path}"
                    )));
                }
            }
            "replace" => {
                let target = doc.pointer_mut(path).ok_or_else(|| {
                    ClientError::Serialization(format!("replace path {path} does not exist"))
                })?;
                *target = value;
            }
            "add" => {
                let (parent, token) = split_pointer(path)?;
                let target = doc.pointer_mut(parent).ok_or_else(|| {
                    ClientError::Serialization(format!("add parent {parent} does not exist"))
                })?;
                match target {
                    serde_json::Value::Object(map) => {
                        map.insert(token.to_string(), value);
                    }
                    serde_json::Value::Array(items) => {
                        if token == "-" {
                            items.push(value);
                        } else {
                            let index: usize = token.parse().map_err(|_| {
                                ClientError::Serialization(format!("bad array index {token}"))
                            })?;
                            if index > items.len() {
                                return Err(ClientError::Serialization(format!(
                                    "array index {index} out of bounds"
                                )));
                            }
                            items.insert(index, value);
                        }
                    }
                    _ => {
                        return Err(ClientError::Serialization(format!(
                            "add parent {parent} is not a container"
                        )));
                    }
                }
            }
            other => {
                return Err(ClientError::Serialization(format!(
                    "unsupported patch op {other}"
                )));
            }
        }
    }
    Ok(())
}

fn split_pointer(path: &str) -> Result<(&str, &str), ClientError> {
    path.rsplit_once('/')
        .ok_or_else(|| ClientError::Serialization(format!("bad pointer {path}")))
}

#[cfg(test)]
mod tests {
    use eno_core::{ObjectMeta, ResourceSliceSpec, SliceManifest};
    use serde_json::json;

    use super::*;

    fn slice(nsn: &Nsn, manifests: usize) -> ResourceSlice {
        ResourceSlice {
            metadata: ObjectMeta {
                name: nsn.name.clone(),
                namespace: nsn.namespace.clone(),
                ..ObjectMeta::default()
            },
            spec: ResourceSliceSpec {
                synthesis_uuid: None,
                resources: (0..manifests)
                    .map(|_| SliceManifest::default())
                    .collect(),
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn status_update_requires_fresh_resource_version() {
        let client = MemoryClient::new();
        let mut composition = Composition::default();
        composition.metadata.name = "demo".into();
        composition.metadata.namespace = "default".into();
        client.put_composition(composition);

        let nsn = Nsn::new("default", "demo");
        let fetched = client.get_composition(nsn.clone()).await.unwrap();

        // A second writer sneaks in and bumps the version.
        client.put_composition(fetched.clone());

        let err = client.update_composition_status(fetched).await.unwrap_err();
        assert!(err.is_conflict());

        let refetched = client.get_composition(nsn).await.unwrap();
        assert!(client.update_composition_status(refetched).await.is_ok());
    }

    #[tokio::test]
    async fn slice_patch_honors_test_precondition() {
        let client = MemoryClient::new();
        let nsn = Nsn::new("default", "slice-a");
        client.put_slice(slice(&nsn, 2));

        // Initialize against a null status array.
        let init = json!([
            {"op": "test", "path": "/status/resources", "value": null},
            {"op": "add", "path": "/status/resources", "value": [
                {"reconciled": false, "deleted": false},
                {"reconciled": false, "deleted": false},
            ]},
        ]);
        client
            .patch_slice_status(nsn.clone(), init.clone())
            .await
            .unwrap();

        // Re-running the init now trips the null precondition.
        let err = client.patch_slice_status(nsn.clone(), init).await.unwrap_err();
        assert!(err.is_conflict());

        let replace = json!([
            {"op": "test", "path": "/status/resources/1", "value": {"reconciled": false, "deleted": false}},
            {"op": "replace", "path": "/status/resources/1", "value": {"reconciled": true, "deleted": false}},
        ]);
        client.patch_slice_status(nsn.clone(), replace).await.unwrap();

        let stored = client.slice(&nsn).unwrap();
        assert!(stored.resource_state(1).unwrap().reconciled);
        assert!(!stored.resource_state(0).unwrap().reconciled);
    }

    #[tokio::test]
    async fn injected_patch_errors_are_consumed_in_order() {
        let client = MemoryClient::new();
        let nsn = Nsn::new("default", "slice-a");
        client.put_slice(slice(&nsn, 1));
        client.fail_next_slice_patch(ClientError::Conflict("interference".into()));

        let patch = json!([
            {"op": "test", "path": "/status/resources", "value": null},
            {"op": "add", "path": "/status/resources", "value": [{"reconciled": false, "deleted": false}]},
        ]);
        let err = client
            .patch_slice_status(nsn.clone(), patch.clone())
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        client.patch_slice_status(nsn, patch).await.unwrap();
        assert_eq!(client.slice_patch_attempts(), 2);
    }
}
