use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use jiff::SignedDuration;
use rustc_hash::FxHasher;
use serde_json::Value;
use tracing::warn;

use eno_core::{annotations, GroupKind, Gvk, ManifestRef, Ref, ResourceState, SliceManifest};

use crate::error::ResourceError;
use crate::overrides::Override;
use crate::readiness::{parse_readiness_checks, ReadinessCheck};

/// Floor for `reconcile-interval`; tighter loops would hammer the
/// downstream apiserver.
const MIN_RECONCILE_INTERVAL: SignedDuration = SignedDuration::from_secs(1);

/// How strictly to treat malformed metadata.
///
/// Synthesizer output is validated with [`ParseMode::Strict`] before any
/// slice is written, so manifests read back from slices can be parsed with
/// [`ParseMode::Lenient`], which logs and falls back to defaults instead
/// of failing the whole slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Lenient,
}

impl ParseMode {
    fn is_lenient(self) -> bool {
        self == ParseMode::Lenient
    }
}

/// A manifest parsed out of a resource slice.
///
/// The `Ref` is immutable after parse and identifies the manifest within
/// its synthesis. Two manifests sharing a `Ref` compete via
/// `manifest_hash` order; a `Patch` pseudo-resource keeps its own `Ref`
/// and addresses its target through the effective `gvk`.
#[derive(Debug)]
pub struct Resource {
    pub resource_ref: Ref,
    pub manifest_ref: ManifestRef,
    /// Effective GVK; for patches this is the nested target's GVK.
    pub gvk: Gvk,
    /// For CRDs, the group/kind the definition serves.
    pub defined_group_kind: Option<GroupKind>,
    pub readiness_group: i64,
    pub readiness_checks: Vec<ReadinessCheck>,
    pub reconcile_interval: Option<SignedDuration>,
    pub overrides: Vec<Override>,
    /// 64-bit content hash of the raw manifest bytes. Total order for
    /// same-Ref conflicts: the larger hash wins.
    pub manifest_hash: u64,
    /// Tombstone flag carried from the slice entry.
    pub manifest_deleted: bool,
    pub is_patch: bool,
    parsed: Value,
    latest_known_state: ArcSwapOption<ResourceState>,
}

impl Resource {
    /// Parse a slice entry leniently.
    pub fn from_slice_manifest(
        entry: &SliceManifest,
        manifest_ref: ManifestRef,
    ) -> Result<Self, ResourceError> {
        Self::from_manifest(
            &entry.manifest,
            manifest_ref,
            entry.deleted,
            ParseMode::Lenient,
        )
    }

    /// Parse a raw manifest string. The content hash covers the bytes as
    /// given, so formatting differences produce distinct hashes.
    pub fn from_manifest(
        manifest: &str,
        manifest_ref: ManifestRef,
        deleted: bool,
        mode: ParseMode,
    ) -> Result<Self, ResourceError> {
        let value: Value = serde_json::from_str(manifest)
            .map_err(|e| ResourceError::manifest(format!("not valid JSON: {e}")))?;
        Self::parse(value, hash_manifest(manifest.as_bytes()), manifest_ref, deleted, mode)
    }

    /// Parse an unstructured object, e.g. one item of a synthesizer's
    /// output, before it has been serialized into a slice.
    pub fn from_value(
        value: &Value,
        manifest_ref: ManifestRef,
        mode: ParseMode,
    ) -> Result<Self, ResourceError> {
        let serialized = serde_json::to_string(value)?;
        Self::parse(
            value.clone(),
            hash_manifest(serialized.as_bytes()),
            manifest_ref,
            false,
            mode,
        )
    }

    fn parse(
        mut value: Value,
        manifest_hash: u64,
        manifest_ref: ManifestRef,
        manifest_deleted: bool,
        mode: ParseMode,
    ) -> Result<Self, ResourceError> {
        let api_version = required_string(&value, "/apiVersion")?;
        let kind = required_string(&value, "/kind")?;
        let name = required_string(&value, "/metadata/name")?;
        let namespace = value
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Synthesizers built on generated structs emit empty defaults for
        // status and creationTimestamp; they must not affect equality.
        if let Some(root) = value.as_object_mut() {
            root.remove("status");
        }
        if let Some(metadata) = value.pointer_mut("/metadata").and_then(Value::as_object_mut) {
            metadata.remove("creationTimestamp");
        }

        let manifest_gvk = Gvk::from_api_version(&api_version, kind.clone());
        let is_patch =
            manifest_gvk.group == annotations::DOMAIN && manifest_gvk.kind == "Patch";

        let gvk = if is_patch {
            let target_api_version = required_string(&value, "/patch/apiVersion")?;
            let target_kind = required_string(&value, "/patch/kind")?;
            if let Some(ops) = value.pointer("/patch/ops") {
                if !ops.is_array() {
                    return Err(ResourceError::manifest("patch.ops must be an array"));
                }
            }
            Gvk::from_api_version(&target_api_version, target_kind)
        } else {
            manifest_gvk.clone()
        };

        let defined_group_kind = if manifest_gvk.group == "apiextensions.k8s.io"
            && manifest_gvk.kind == "CustomResourceDefinition"
        {
            parse_defined_group_kind(&value, mode, &manifest_ref)?
        } else {
            None
        };

        let annotations = manifest_annotations(&value, mode, &manifest_ref)?;
        let readiness_group = parse_readiness_group(&annotations, mode, &manifest_ref)?;
        let readiness_checks = match parse_readiness_checks(&annotations) {
            Ok(checks) => checks,
            Err(e) if mode.is_lenient() => {
                warn!(manifest = %manifest_ref, error = %e, "dropping readiness checks");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let reconcile_interval = parse_reconcile_interval(&annotations, mode, &manifest_ref)?;
        let overrides = parse_overrides(&annotations, mode, &manifest_ref)?;

        // A patch keeps its pseudo-kind identity so that it can coexist in
        // the tree with a real manifest for the same object; the two meet
        // through the effective GVK instead.
        Ok(Self {
            resource_ref: Ref {
                group: manifest_gvk.group.clone(),
                kind: manifest_gvk.kind.clone(),
                namespace,
                name,
            },
            manifest_ref,
            gvk,
            defined_group_kind,
            readiness_group,
            readiness_checks,
            reconcile_interval,
            overrides,
            manifest_hash,
            manifest_deleted,
            is_patch,
            parsed: value,
            latest_known_state: ArcSwapOption::empty(),
        })
    }

    /// The parsed manifest with status and creationTimestamp stripped.
    pub fn parsed(&self) -> &Value {
        &self.parsed
    }

    /// Most recent observed state, if any update has arrived.
    pub fn latest_known_state(&self) -> Option<Arc<ResourceState>> {
        self.latest_known_state.load_full()
    }

    /// Atomically publish a new observed state.
    pub fn store_state(&self, state: ResourceState) {
        self.latest_known_state.store(Some(Arc::new(state)));
    }
}

fn hash_manifest(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

fn required_string(value: &Value, pointer: &str) -> Result<String, ResourceError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResourceError::manifest(format!("missing required field {pointer}")))
}

fn parse_defined_group_kind(
    value: &Value,
    mode: ParseMode,
    manifest_ref: &ManifestRef,
) -> Result<Option<GroupKind>, ResourceError> {
    let group = value.pointer("/spec/group").and_then(Value::as_str);
    let kind = value.pointer("/spec/names/kind").and_then(Value::as_str);
    match (group, kind) {
        (Some(group), Some(kind)) => Ok(Some(GroupKind {
            group: group.to_string(),
            kind: kind.to_string(),
        })),
        _ if mode.is_lenient() => {
            warn!(manifest = %manifest_ref, "CRD is missing spec.group or spec.names.kind");
            Ok(None)
        }
        _ => Err(ResourceError::manifest(
            "CRD is missing spec.group or spec.names.kind",
        )),
    }
}

fn manifest_annotations(
    value: &Value,
    mode: ParseMode,
    manifest_ref: &ManifestRef,
) -> Result<BTreeMap<String, String>, ResourceError> {
    let mut out = BTreeMap::new();
    let Some(map) = value
        .pointer("/metadata/annotations")
        .and_then(Value::as_object)
    else {
        return Ok(out);
    };
    for (key, value) in map {
        match value.as_str() {
            Some(s) => {
                out.insert(key.clone(), s.to_string());
            }
            None if mode.is_lenient() => {
                warn!(manifest = %manifest_ref, key, "ignoring non-string annotation");
            }
            None => {
                return Err(ResourceError::manifest(format!(
                    "annotation {key:?} is not a string"
                )));
            }
        }
    }
    Ok(out)
}

fn parse_readiness_group(
    annotations: &BTreeMap<String, String>,
    mode: ParseMode,
    manifest_ref: &ManifestRef,
) -> Result<i64, ResourceError> {
    let Some(raw) = annotations.get(annotations::READINESS_GROUP) else {
        return Ok(0);
    };
    match raw.parse::<i64>() {
        Ok(group) => Ok(group),
        Err(_) if mode.is_lenient() => {
            warn!(manifest = %manifest_ref, value = %raw, "invalid readiness group, using 0");
            Ok(0)
        }
        Err(_) => Err(ResourceError::manifest(format!(
            "readiness group {raw:?} is not an integer"
        ))),
    }
}

fn parse_reconcile_interval(
    annotations: &BTreeMap<String, String>,
    mode: ParseMode,
    manifest_ref: &ManifestRef,
) -> Result<Option<SignedDuration>, ResourceError> {
    let Some(raw) = annotations.get(annotations::RECONCILE_INTERVAL) else {
        return Ok(None);
    };
    let interval = match raw.parse::<SignedDuration>() {
        Ok(interval) => interval,
        Err(_) if mode.is_lenient() => {
            warn!(manifest = %manifest_ref, value = %raw, "invalid reconcile interval, ignoring");
            return Ok(None);
        }
        Err(_) => {
            return Err(ResourceError::manifest(format!(
                "reconcile interval {raw:?} is not a duration"
            )));
        }
    };
    if interval < MIN_RECONCILE_INTERVAL {
        warn!(manifest = %manifest_ref, value = %raw, "clamping reconcile interval to 1s");
        return Ok(Some(MIN_RECONCILE_INTERVAL));
    }
    Ok(Some(interval))
}

fn parse_overrides(
    annotations: &BTreeMap<String, String>,
    mode: ParseMode,
    manifest_ref: &ManifestRef,
) -> Result<Vec<Override>, ResourceError> {
    let Some(raw) = annotations.get(annotations::OVERRIDES) else {
        return Ok(Vec::new());
    };
    let parse = || -> Result<Vec<Override>, ResourceError> {
        let ops: Vec<Override> = serde_json::from_str(raw)
            .map_err(|e| ResourceError::InvalidOverride(format!("overrides annotation: {e}")))?;
        for op in &ops {
            op.validate()?;
        }
        Ok(ops)
    };
    match parse() {
        Ok(ops) => Ok(ops),
        Err(e) if mode.is_lenient() => {
            warn!(manifest = %manifest_ref, error = %e, "dropping overrides");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
