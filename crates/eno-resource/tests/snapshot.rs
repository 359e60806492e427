use eno_core::{Composition, ManifestRef, Nsn};
use eno_resource::{snapshot, ParseMode, Resource};
use serde_json::json;

fn manifest_ref() -> ManifestRef {
    ManifestRef {
        slice: Nsn::new("default", "slice-a"),
        index: 0,
    }
}

fn parse(manifest: &str, deleted: bool) -> Resource {
    Resource::from_manifest(manifest, manifest_ref(), deleted, ParseMode::Strict).unwrap()
}

#[test]
fn overrides_apply_in_order() {
    let manifest = r#"{
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": "web",
            "annotations": {
                "eno.azure.io/overrides": "[{\"path\": \"/spec/replicas\", \"value\": 3}, {\"path\": \"/spec/replicas\", \"value\": 7}]"
            }
        },
        "spec": {"replicas": 1}
    }"#;
    let resource = parse(manifest, false);
    let snap = snapshot(&resource, &Composition::default(), None).unwrap();
    assert_eq!(snap.manifest.pointer("/spec/replicas"), Some(&json!(7)));
}

#[test]
fn eno_metadata_never_ships_downstream() {
    let manifest = r#"{
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": "x",
            "annotations": {
                "eno.azure.io/readiness-group": "2",
                "eno.azure.io/disable-updates": "true",
                "app.kubernetes.io/name": "demo"
            },
            "labels": {"eno.azure.io/owner": "c1", "tier": "web"}
        }
    }"#;
    let resource = parse(manifest, false);
    let snap = snapshot(&resource, &Composition::default(), None).unwrap();

    let annotations = snap.manifest.pointer("/metadata/annotations").unwrap();
    assert_eq!(annotations, &json!({"app.kubernetes.io/name": "demo"}));
    let labels = snap.manifest.pointer("/metadata/labels").unwrap();
    assert_eq!(labels, &json!({"tier": "web"}));
    // But the semantics were extracted before stripping.
    assert!(snap.disable_updates);
}

#[test]
fn empty_metadata_maps_are_dropped_after_stripping() {
    let manifest = r#"{
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": "x",
            "annotations": {"eno.azure.io/replace": "true"}
        }
    }"#;
    let resource = parse(manifest, false);
    let snap = snapshot(&resource, &Composition::default(), None).unwrap();

    assert!(snap.replace);
    assert!(snap.manifest.pointer("/metadata/annotations").is_none());
}

#[test]
fn deletion_predicate_composition_teardown() {
    let manifest = r#"{"apiVersion":"v1","kind":"ConfigMap","metadata":{"name":"x"}}"#;
    let resource = parse(manifest, false);

    let mut composition = Composition::default();
    composition.metadata.deletion_timestamp = Some(jiff::Timestamp::UNIX_EPOCH);
    let snap = snapshot(&resource, &composition, None).unwrap();
    assert!(snap.deleted, "deleting composition deletes its resources");

    composition.metadata.annotations.insert(
        "eno.azure.io/deletion-strategy".into(),
        "orphan".into(),
    );
    let snap = snapshot(&resource, &composition, None).unwrap();
    assert!(!snap.deleted, "orphan strategy leaves downstream objects");
}

#[test]
fn deletion_predicate_tombstone() {
    let manifest = r#"{"apiVersion":"v1","kind":"ConfigMap","metadata":{"name":"x"}}"#;
    let resource = parse(manifest, true);
    let snap = snapshot(&resource, &Composition::default(), None).unwrap();
    assert!(snap.deleted);
}

#[test]
fn deletion_predicate_patch_deletion_timestamp() {
    let deleting = r#"{
        "apiVersion": "eno.azure.io/v1",
        "kind": "Patch",
        "metadata": {"name": "x"},
        "patch": {
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "ops": [{"op": "add", "path": "/metadata/deletionTimestamp", "value": "2024-01-01T00:00:00Z"}]
        }
    }"#;
    let snap = snapshot(&parse(deleting, false), &Composition::default(), None).unwrap();
    assert!(snap.deleted);

    let not_deleting = r#"{
        "apiVersion": "eno.azure.io/v1",
        "kind": "Patch",
        "metadata": {"name": "x"},
        "patch": {
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "ops": [{"op": "add", "path": "/metadata/deletionTimestamp", "value": null}]
        }
    }"#;
    let snap = snapshot(&parse(not_deleting, false), &Composition::default(), None).unwrap();
    assert!(!snap.deleted, "null value is not a deletion");
}

#[test]
fn override_condition_sees_the_live_object() {
    let manifest = r#"{
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": "web",
            "annotations": {
                "eno.azure.io/overrides": "[{\"path\": \"/spec/replicas\", \"value\": null, \"condition\": \"missing(/metadata/uid)\"}]"
            }
        },
        "spec": {"replicas": 2}
    }"#;
    let resource = parse(manifest, false);

    // Not created yet: the field is dropped so the cluster default wins.
    let snap = snapshot(&resource, &Composition::default(), None).unwrap();
    assert!(snap.manifest.pointer("/spec/replicas").is_none());

    // Already live: the manifest value stands.
    let live = json!({"metadata": {"uid": "123"}});
    let snap = snapshot(&resource, &Composition::default(), Some(&live)).unwrap();
    assert_eq!(snap.manifest.pointer("/spec/replicas"), Some(&json!(2)));
}

#[test]
fn post_override_reconcile_interval_wins() {
    let manifest = r#"{
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": "x",
            "annotations": {
                "eno.azure.io/reconcile-interval": "30s",
                "eno.azure.io/overrides": "[{\"path\": \"/metadata/annotations/eno.azure.io~1reconcile-interval\", \"value\": \"5m\"}]"
            }
        }
    }"#;
    let resource = parse(manifest, false);
    let snap = snapshot(&resource, &Composition::default(), None).unwrap();
    assert_eq!(snap.reconcile_interval.unwrap().as_secs(), 300);
}
