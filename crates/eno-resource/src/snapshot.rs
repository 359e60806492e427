use jiff::SignedDuration;
use serde_json::Value;

use eno_core::{annotations, Composition};

use crate::error::ResourceError;
use crate::resource::Resource;

/// The reconciler-facing rendering of a resource against one observed
/// live object: overrides applied, control-plane metadata stripped.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub manifest: Value,
    pub disable_updates: bool,
    /// Force delete+create instead of update.
    pub replace: bool,
    pub reconcile_interval: Option<SignedDuration>,
    /// The downstream object should not exist.
    pub deleted: bool,
}

/// Derive a snapshot of `resource` for reconciliation.
///
/// Overrides run in order against a draft of the parsed manifest; the
/// post-override annotations decide update semantics; Eno-domain
/// annotations and labels never ship downstream.
pub fn snapshot(
    resource: &Resource,
    composition: &Composition,
    live: Option<&Value>,
) -> Result<Snapshot, ResourceError> {
    let mut draft = resource.parsed().clone();
    for op in &resource.overrides {
        op.apply(live, &mut draft)?;
    }

    let disable_updates = annotation_bool(&draft, annotations::DISABLE_UPDATES);
    let replace = annotation_bool(&draft, annotations::REPLACE);
    let reconcile_interval = annotation_interval(&draft, resource);

    let deleted = (composition.deleting() && !composition.orphan())
        || resource.manifest_deleted
        || (resource.is_patch && patch_sets_deletion_timestamp(&draft));

    strip_eno_metadata(&mut draft);

    Ok(Snapshot {
        manifest: draft,
        disable_updates,
        replace,
        reconcile_interval,
        deleted,
    })
}

fn annotation_bool(draft: &Value, key: &str) -> bool {
    draft
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
        == Some("true")
}

/// Post-override annotations win; an override may add or drop the
/// interval relative to what was parsed from the slice.
fn annotation_interval(draft: &Value, resource: &Resource) -> Option<SignedDuration> {
    match draft
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(annotations::RECONCILE_INTERVAL))
        .and_then(Value::as_str)
    {
        Some(raw) => raw.parse::<SignedDuration>().ok().map(|interval| {
            if interval < SignedDuration::from_secs(1) {
                SignedDuration::from_secs(1)
            } else {
                interval
            }
        }),
        None => resource.reconcile_interval,
    }
}

fn patch_sets_deletion_timestamp(draft: &Value) -> bool {
    let Some(ops) = draft.pointer("/patch/ops").and_then(Value::as_array) else {
        return false;
    };
    ops.iter().any(|op| {
        op.get("path").and_then(Value::as_str) == Some("/metadata/deletionTimestamp")
            && op
                .get("value")
                .map(|v| !v.is_null() && v.as_str() != Some(""))
                .unwrap_or(false)
    })
}

/// Remove every `eno.azure.io` annotation and label from the draft; they
/// are control-plane metadata, not part of the desired object.
fn strip_eno_metadata(draft: &mut Value) {
    for pointer in ["/metadata/annotations", "/metadata/labels"] {
        if let Some(map) = draft.pointer_mut(pointer).and_then(Value::as_object_mut) {
            map.retain(|key, _| !annotations::is_eno_key(key));
        }
    }
    if let Some(metadata) = draft.pointer_mut("/metadata").and_then(Value::as_object_mut) {
        for field in ["annotations", "labels"] {
            if metadata.get(field).and_then(Value::as_object).is_some_and(|m| m.is_empty()) {
                metadata.remove(field);
            }
        }
    }
}
