use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use eno_core::{
    annotations, Composition, OwnerReference, Ref, ResourceSlice, ResourceSliceSpec, SliceManifest,
};

use crate::error::SliceError;

/// Partitioning limits for one slice set.
#[derive(Debug, Clone)]
pub struct SliceConfig {
    /// Budget of summed manifest JSON bytes per slice.
    pub max_slice_bytes: usize,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            max_slice_bytes: 512 * 1024,
        }
    }
}

/// Diff the desired outputs against the previous slice set and partition
/// the result into new slices.
///
/// Desired manifests come first in output order; unretired tombstones
/// from the previous set follow in slice+index order. A previous manifest
/// produces no tombstone when it is a patch (nothing was created), when
/// its object is still present in the outputs (possibly at a new
/// version), or when its tombstone has already been reconciled.
pub fn slice(
    composition: &Composition,
    previous: &[ResourceSlice],
    outputs: &[Value],
    synthesis_uuid: Uuid,
    config: &SliceConfig,
) -> Result<Vec<ResourceSlice>, SliceError> {
    let mut present = HashSet::with_capacity(outputs.len());
    for output in outputs {
        present.insert(manifest_key(output)?.0);
    }

    let mut manifests: Vec<SliceManifest> = Vec::with_capacity(outputs.len());
    for output in outputs {
        manifests.push(SliceManifest {
            manifest: serde_json::to_string(output)?,
            deleted: false,
        });
    }

    for slice in previous {
        for (index, entry) in slice.spec.resources.iter().enumerate() {
            let parsed: Value = match serde_json::from_str(&entry.manifest) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(
                        slice = %slice.metadata.nsn(),
                        index,
                        error = %e,
                        "dropping unparseable previous manifest"
                    );
                    continue;
                }
            };
            let (key, is_patch) = match manifest_key(&parsed) {
                Ok(key) => key,
                Err(e) => {
                    warn!(
                        slice = %slice.metadata.nsn(),
                        index,
                        error = %e,
                        "dropping unkeyable previous manifest"
                    );
                    continue;
                }
            };

            // Patches target objects some other manifest owns; removing
            // one never deletes anything downstream.
            if is_patch {
                continue;
            }
            if present.contains(&key) {
                continue;
            }
            let reconciled = slice
                .resource_state(index)
                .map(|state| state.reconciled)
                .unwrap_or(false);
            if entry.deleted && reconciled {
                // The downstream deletion is confirmed; retire the tombstone.
                continue;
            }
            manifests.push(SliceManifest {
                manifest: entry.manifest.clone(),
                deleted: true,
            });
        }
    }

    Ok(partition(composition, manifests, synthesis_uuid, config))
}

/// Identity key for the present-refs set. For `Patch` pseudo-manifests
/// the key addresses the nested target, not the pseudo-kind; returns
/// whether the manifest was a patch.
fn manifest_key(manifest: &Value) -> Result<(Ref, bool), SliceError> {
    let api_version = required(manifest, "/apiVersion")?;
    let kind = required(manifest, "/kind")?;
    let name = required(manifest, "/metadata/name")?;
    let namespace = manifest
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let group = api_version.split_once('/').map(|(g, _)| g).unwrap_or_default();
    let is_patch = group == annotations::DOMAIN && kind == "Patch";

    let (group, kind) = if is_patch {
        let target_api_version = required(manifest, "/patch/apiVersion")?;
        let target_kind = required(manifest, "/patch/kind")?;
        let target_group = target_api_version
            .split_once('/')
            .map(|(g, _)| g.to_string())
            .unwrap_or_default();
        (target_group, target_kind)
    } else {
        (group.to_string(), kind)
    };

    Ok((
        Ref {
            group,
            kind,
            namespace,
            name,
        },
        is_patch,
    ))
}

fn required(manifest: &Value, pointer: &str) -> Result<String, SliceError> {
    manifest
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SliceError::InvalidManifest(format!("missing required field {pointer}")))
}

/// Greedy partition by manifest bytes. A slice always holds at least one
/// manifest, so an oversized manifest gets a slice to itself rather than
/// being dropped.
fn partition(
    composition: &Composition,
    manifests: Vec<SliceManifest>,
    synthesis_uuid: Uuid,
    config: &SliceConfig,
) -> Vec<ResourceSlice> {
    let mut slices = Vec::new();
    let mut current: Vec<SliceManifest> = Vec::new();
    let mut current_bytes = 0usize;

    for manifest in manifests {
        let bytes = manifest.manifest.len();
        if !current.is_empty() && current_bytes + bytes > config.max_slice_bytes {
            slices.push(new_slice(composition, std::mem::take(&mut current), synthesis_uuid));
            current_bytes = 0;
        }
        current_bytes += bytes;
        current.push(manifest);
    }
    if !current.is_empty() {
        slices.push(new_slice(composition, current, synthesis_uuid));
    }
    slices
}

fn new_slice(
    composition: &Composition,
    resources: Vec<SliceManifest>,
    synthesis_uuid: Uuid,
) -> ResourceSlice {
    let mut slice = ResourceSlice::default();
    slice.metadata.name = format!("{}-{}", composition.metadata.name, Uuid::new_v4());
    slice.metadata.namespace = composition.metadata.namespace.clone();
    slice.metadata.finalizers = vec![annotations::CLEANUP_FINALIZER.to_string()];
    slice.metadata.owner_references = vec![OwnerReference {
        api_version: "eno.azure.io/v1".to_string(),
        kind: "Composition".to_string(),
        name: composition.metadata.name.clone(),
        controller: true,
        block_owner_deletion: true,
    }];
    slice.spec = ResourceSliceSpec {
        synthesis_uuid: Some(synthesis_uuid),
        resources,
    };
    slice
}
