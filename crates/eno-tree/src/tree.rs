use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use eno_core::{ManifestRef, Ref, ResourceState};
use eno_resource::Resource;

/// The dependency graph of one synthesis.
///
/// Nodes are the synthesis's resources; edges order visibility by
/// readiness group and by CRD→CR definition. Not concurrency-safe: the
/// owning cache serializes all access behind its mutex.
pub struct Tree {
    nodes: HashMap<Ref, Node>,
    by_manifest: HashMap<ManifestRef, Ref>,
}

struct Node {
    resource: Arc<Resource>,
    /// Refs that must signal ready (or deleted, during teardown) before
    /// this node becomes visible.
    pending_dependencies: HashSet<Ref>,
    /// Inverse edges. A set: a CRD edge may coincide with a group edge.
    dependents: HashSet<Ref>,
    /// Whether any state update has ever been observed.
    seen: bool,
}

impl Tree {
    /// Index a synthesis's resources and wire the dependency edges.
    ///
    /// Two resources sharing a `Ref` resolve deterministically: the larger
    /// `manifest_hash` wins and the loser is dropped.
    pub fn build(resources: Vec<Resource>) -> Self {
        let mut winners: HashMap<Ref, Resource> = HashMap::with_capacity(resources.len());
        for resource in resources {
            match winners.entry(resource.resource_ref.clone()) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(resource);
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    if resource.manifest_hash > slot.get().manifest_hash {
                        warn!(resource = %resource.resource_ref, "replacing conflicting manifest");
                        slot.insert(resource);
                    } else {
                        warn!(resource = %resource.resource_ref, "dropping conflicting manifest");
                    }
                }
            }
        }

        let mut nodes: HashMap<Ref, Node> = winners
            .into_iter()
            .map(|(r, resource)| {
                (
                    r,
                    Node {
                        resource: Arc::new(resource),
                        pending_dependencies: HashSet::new(),
                        dependents: HashSet::new(),
                        seen: false,
                    },
                )
            })
            .collect();

        // Readiness-group edges: every node depends on the whole of the
        // immediately lower populated group. Groups are sparse.
        let mut groups: BTreeMap<i64, Vec<Ref>> = BTreeMap::new();
        for (r, node) in &nodes {
            groups
                .entry(node.resource.readiness_group)
                .or_default()
                .push(r.clone());
        }
        let ordered: Vec<&Vec<Ref>> = groups.values().collect();
        for pair in ordered.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            for dependent in upper {
                for dependency in lower {
                    nodes
                        .get_mut(dependent)
                        .unwrap()
                        .pending_dependencies
                        .insert(dependency.clone());
                    nodes
                        .get_mut(dependency)
                        .unwrap()
                        .dependents
                        .insert(dependent.clone());
                }
            }
        }

        // CRD→CR edges: a resource whose group/kind is defined by a CRD in
        // the same synthesis waits for that CRD.
        let defined: HashMap<_, Ref> = nodes
            .iter()
            .filter_map(|(r, node)| {
                node.resource
                    .defined_group_kind
                    .clone()
                    .map(|gk| (gk, r.clone()))
            })
            .collect();
        let edges: Vec<(Ref, Ref)> = nodes
            .iter()
            .filter_map(|(r, node)| {
                let crd = defined.get(&node.resource.gvk.group_kind())?;
                (crd != r).then(|| (crd.clone(), r.clone()))
            })
            .collect();
        for (crd, cr) in edges {
            nodes
                .get_mut(&cr)
                .unwrap()
                .pending_dependencies
                .insert(crd.clone());
            nodes.get_mut(&crd).unwrap().dependents.insert(cr);
        }

        let by_manifest = nodes
            .iter()
            .map(|(r, node)| (node.resource.manifest_ref.clone(), r.clone()))
            .collect();

        let tree = Self { nodes, by_manifest };
        debug_assert!(tree.is_acyclic(), "dependency tree must be acyclic");
        tree
    }

    /// Look up a resource and whether it is visible to the reconciler.
    pub fn get(&self, resource_ref: &Ref) -> Option<(Arc<Resource>, bool)> {
        let node = self.nodes.get(resource_ref)?;
        Some((Arc::clone(&node.resource), self.visible(resource_ref, node)))
    }

    /// `visible(node) = ¬backtracks(node) ∧ pendingDependencies = ∅`.
    fn visible(&self, resource_ref: &Ref, node: &Node) -> bool {
        !self.backtracks(resource_ref, node) && node.pending_dependencies.is_empty()
    }

    /// A node backtracks when a dependent addresses the same downstream
    /// object (same effective GVK + namespace + name) and is itself
    /// unblocked: re-applying this node would fight the later override.
    fn backtracks(&self, resource_ref: &Ref, node: &Node) -> bool {
        node.dependents.iter().any(|dep_ref| {
            let Some(dependent) = self.nodes.get(dep_ref) else {
                return false;
            };
            dependent.resource.gvk == node.resource.gvk
                && dep_ref.namespace == resource_ref.namespace
                && dep_ref.name == resource_ref.name
                && dependent.pending_dependencies.is_empty()
        })
    }

    /// Fold one observed state into the tree.
    ///
    /// Enqueues the resource itself when the state is news, and unblocks
    /// dependents when the resource transitions to ready (or to deleted,
    /// which satisfies dependencies during teardown).
    pub fn update_state(
        &mut self,
        manifest_ref: &ManifestRef,
        state: &ResourceState,
        enqueue: &mut dyn FnMut(Ref),
    ) {
        let Some(resource_ref) = self.by_manifest.get(manifest_ref).cloned() else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&resource_ref) else {
            return;
        };

        let last = node.resource.latest_known_state();
        let fresh = !node.seen && last.is_none();
        let changed = last.as_deref() != Some(state);
        if fresh || changed {
            enqueue(resource_ref.clone());
        }

        let became_ready =
            state.ready.is_some() && last.as_deref().map_or(true, |l| l.ready.is_none());
        let became_deleted = state.deleted && last.as_deref().map_or(true, |l| !l.deleted);

        node.resource.store_state(state.clone());
        node.seen = true;

        if became_ready || became_deleted {
            let dependents: Vec<Ref> = node.dependents.iter().cloned().collect();
            for dep_ref in dependents {
                if let Some(dependent) = self.nodes.get_mut(&dep_ref) {
                    dependent.pending_dependencies.remove(&resource_ref);
                    enqueue(dep_ref);
                }
            }
        }
    }

    /// Number of resources indexed in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flat JSON rendering for golden-file tests: Ref → state + edges,
    /// keys and edge lists sorted for stable output.
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        let mut refs: Vec<&Ref> = self.nodes.keys().collect();
        refs.sort();
        for r in refs {
            let node = &self.nodes[r];
            let state = node.resource.latest_known_state();
            let mut dependencies: Vec<String> = node
                .pending_dependencies
                .iter()
                .map(Ref::to_string)
                .collect();
            dependencies.sort();
            let mut dependents: Vec<String> =
                node.dependents.iter().map(Ref::to_string).collect();
            dependents.sort();
            out.insert(
                r.to_string(),
                json!({
                    "ready": state.as_deref().is_some_and(ResourceState::is_ready),
                    "reconciled": state.as_deref().is_some_and(|s| s.reconciled),
                    "dependencies": dependencies,
                    "dependents": dependents,
                }),
            );
        }
        Value::Object(out)
    }

    fn is_acyclic(&self) -> bool {
        // Kahn over dependent edges; cycles leave nodes unvisited.
        let mut indegree: HashMap<&Ref, usize> = self
            .nodes
            .iter()
            .map(|(r, node)| (r, node.pending_dependencies.len()))
            .collect();
        let mut stack: Vec<&Ref> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.pending_dependencies.is_empty())
            .map(|(r, _)| r)
            .collect();
        let mut visited = 0usize;
        while let Some(r) = stack.pop() {
            visited += 1;
            for dep in &self.nodes[r].dependents {
                // Dependent edges may repeat refs; guard against underflow.
                if let Some(d) = indegree.get_mut(dep) {
                    if *d > 0 {
                        *d -= 1;
                        if *d == 0 {
                            stack.push(dep);
                        }
                    }
                }
            }
        }
        visited == self.nodes.len()
    }
}
