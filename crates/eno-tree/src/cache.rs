use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use uuid::Uuid;

use eno_core::{Composition, ManifestRef, Nsn, Ref, ResourceSlice};
use eno_queue::WorkQueue;
use eno_resource::Resource;

use crate::error::TreeError;
use crate::tree::Tree;

/// Work item handed to the downstream reconciler.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub resource: Ref,
    pub composition: Nsn,
}

/// Per-process cache of dependency trees, keyed by synthesis UUID.
///
/// The cache is the single writer to its trees; informer handlers call
/// [`ResourceCache::visit`] and reconcilers call [`ResourceCache::get`],
/// all serialized behind one mutex.
pub struct ResourceCache {
    queue: WorkQueue<ReconcileRequest>,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    trees: HashMap<Uuid, Tree>,
    by_composition: HashMap<Nsn, HashSet<Uuid>>,
}

impl ResourceCache {
    pub fn new(queue: WorkQueue<ReconcileRequest>) -> Self {
        Self {
            queue,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The queue state transitions are announced on.
    pub fn queue(&self) -> &WorkQueue<ReconcileRequest> {
        &self.queue
    }

    /// Build and store the tree for a synthesis from the authoritative
    /// slice set. Informer copies have their manifests pruned and are
    /// rejected; a repeat fill for a cached UUID is a no-op so state the
    /// reconciler is mid-way consuming is never lost.
    pub fn fill(
        &self,
        composition: &Nsn,
        synthesis_uuid: Uuid,
        slices: &[ResourceSlice],
    ) -> Result<(), TreeError> {
        let mut state = self.state.lock().unwrap();
        if state.trees.contains_key(&synthesis_uuid) {
            debug!(composition = %composition, synthesis_uuid = %synthesis_uuid, "tree already cached");
        } else {
            let mut resources = Vec::new();
            for slice in slices {
                for (index, entry) in slice.spec.resources.iter().enumerate() {
                    if entry.manifest.is_empty() {
                        return Err(TreeError::PrunedSlice(slice.metadata.nsn().to_string()));
                    }
                    let manifest_ref = ManifestRef {
                        slice: slice.metadata.nsn(),
                        index,
                    };
                    resources.push(Resource::from_slice_manifest(entry, manifest_ref)?);
                }
            }
            let tree = Tree::build(resources);
            info!(
                composition = %composition,
                synthesis_uuid = %synthesis_uuid,
                resources = tree.len(),
                "cached synthesis"
            );
            state.trees.insert(synthesis_uuid, tree);
        }
        state
            .by_composition
            .entry(composition.clone())
            .or_default()
            .insert(synthesis_uuid);
        Ok(())
    }

    /// Fold informer-sourced slice statuses into the synthesis's tree,
    /// enqueuing reconcile work for every state transition. Returns false
    /// when no tree is cached for the UUID; the caller must fill first.
    pub fn visit(
        &self,
        composition: &Nsn,
        synthesis_uuid: Uuid,
        slices: &[ResourceSlice],
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(tree) = state.trees.get_mut(&synthesis_uuid) else {
            return false;
        };

        let queue = self.queue.clone();
        let mut enqueue = |resource: Ref| {
            queue.add(ReconcileRequest {
                resource,
                composition: composition.clone(),
            });
        };
        for slice in slices {
            let Some(statuses) = &slice.status.resources else {
                continue;
            };
            for (index, status) in statuses.iter().enumerate() {
                let manifest_ref = ManifestRef {
                    slice: slice.metadata.nsn(),
                    index,
                };
                tree.update_state(&manifest_ref, status, &mut enqueue);
            }
        }
        true
    }

    /// Look up a resource and its visibility in a synthesis's tree.
    pub fn get(&self, synthesis_uuid: Uuid, resource_ref: &Ref) -> Option<(Arc<Resource>, bool)> {
        self.state
            .lock()
            .unwrap()
            .trees
            .get(&synthesis_uuid)
            .and_then(|tree| tree.get(resource_ref))
    }

    /// Drop every tree of the composition that its current or previous
    /// synthesis no longer references. A `None` composition (deleted from
    /// the control plane) drops them all.
    pub fn purge(&self, composition_nsn: &Nsn, composition: Option<&Composition>) {
        let mut state = self.state.lock().unwrap();
        let CacheState {
            trees,
            by_composition,
        } = &mut *state;

        let Some(uuids) = by_composition.get_mut(composition_nsn) else {
            return;
        };
        uuids.retain(|uuid| {
            let keep = composition.is_some_and(|c| c.references_synthesis(*uuid));
            if !keep {
                debug!(composition = %composition_nsn, synthesis_uuid = %uuid, "purging synthesis");
                trees.remove(uuid);
            }
            keep
        });
        if uuids.is_empty() {
            by_composition.remove(composition_nsn);
        }
    }

    /// JSON rendering of one tree for golden-file tests.
    pub fn tree_json(&self, synthesis_uuid: Uuid) -> Option<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .trees
            .get(&synthesis_uuid)
            .map(Tree::to_json)
    }
}
