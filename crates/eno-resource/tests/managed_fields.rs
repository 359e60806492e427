use eno_resource::{normalize_conflicting_managers, FieldManagerEntry, FIELD_MANAGER};

#[test]
fn no_drift_is_a_no_op() {
    let eno = FieldManagerEntry::new(FIELD_MANAGER, ["spec.replicas", "spec.template"]);
    let other = FieldManagerEntry::new("kubectl", ["metadata.labels"]);

    let (adjusted, touched, modified) = normalize_conflicting_managers(
        &[eno.clone()],
        &[eno.clone(), other.clone()],
        &[eno.clone()],
    );

    assert!(!modified);
    assert_eq!(touched, "");
    assert_eq!(adjusted, vec![eno, other]);
}

#[test]
fn reclaims_fields_stolen_by_another_manager() {
    let previous = FieldManagerEntry::new(FIELD_MANAGER, ["spec.replicas", "spec.paused"]);
    // An operator took over spec.replicas.
    let current = vec![
        FieldManagerEntry::new(FIELD_MANAGER, ["spec.paused"]),
        FieldManagerEntry::new("hpa-controller", ["spec.replicas", "status.conditions"]),
    ];
    let next = vec![FieldManagerEntry::new(
        FIELD_MANAGER,
        ["spec.replicas", "spec.paused"],
    )];

    let (adjusted, touched, modified) =
        normalize_conflicting_managers(&[previous], &current, &next);

    assert!(modified);
    assert_eq!(touched, "spec.replicas");

    let eno = adjusted.iter().find(|e| e.manager == FIELD_MANAGER).unwrap();
    assert!(eno.fields.contains("spec.replicas"));
    assert!(eno.fields.contains("spec.paused"));

    let hpa = adjusted.iter().find(|e| e.manager == "hpa-controller").unwrap();
    assert!(!hpa.fields.contains("spec.replicas"));
    assert!(hpa.fields.contains("status.conditions"));
}

#[test]
fn managers_left_empty_are_dropped() {
    let previous = FieldManagerEntry::new(FIELD_MANAGER, ["data.mode"]);
    let current = vec![
        FieldManagerEntry::new(FIELD_MANAGER, []),
        FieldManagerEntry::new("kubectl-edit", ["data.mode"]),
    ];
    let next = vec![FieldManagerEntry::new(FIELD_MANAGER, ["data.mode"])];

    let (adjusted, _, modified) = normalize_conflicting_managers(&[previous], &current, &next);

    assert!(modified);
    assert_eq!(adjusted.len(), 1);
    assert_eq!(adjusted[0].manager, FIELD_MANAGER);
    assert!(adjusted[0].fields.contains("data.mode"));
}

#[test]
fn recreates_a_missing_eno_entry() {
    let previous = FieldManagerEntry::new(FIELD_MANAGER, ["spec.selector"]);
    let current = vec![FieldManagerEntry::new("kubectl", ["spec.selector"])];
    let next = vec![FieldManagerEntry::new(FIELD_MANAGER, ["spec.selector"])];

    let (adjusted, touched, modified) =
        normalize_conflicting_managers(&[previous], &current, &next);

    assert!(modified);
    assert_eq!(touched, "spec.selector");
    assert!(adjusted.iter().any(|e| e.manager == FIELD_MANAGER));
    let kubectl = adjusted.iter().find(|e| e.manager == "kubectl");
    assert!(kubectl.is_none(), "kubectl lost its only field and was dropped");
}

#[test]
fn fields_only_in_next_are_claimed_up_front() {
    // First apply of a new field: nothing to subtract, Eno's entry grows.
    let current = vec![FieldManagerEntry::new(FIELD_MANAGER, ["spec.replicas"])];
    let next = vec![FieldManagerEntry::new(
        FIELD_MANAGER,
        ["spec.replicas", "spec.minReadySeconds"],
    )];

    let (adjusted, touched, modified) = normalize_conflicting_managers(&[], &current, &next);

    assert!(modified);
    assert_eq!(touched, "spec.minReadySeconds");
    assert!(adjusted[0].fields.contains("spec.minReadySeconds"));
}
