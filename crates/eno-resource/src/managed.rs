use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The field manager name Eno applies under.
pub const FIELD_MANAGER: &str = "eno";

/// One managed-fields entry on a downstream object: a manager name and
/// the set of field paths it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldManagerEntry {
    pub manager: String,
    #[serde(default)]
    pub fields: BTreeSet<String>,
}

impl FieldManagerEntry {
    pub fn new(manager: impl Into<String>, fields: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            manager: manager.into(),
            fields: fields.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Repair managed-fields drift after another manager takes ownership of
/// fields Eno applies.
///
/// `previous` is Eno's entry set from the last apply, `current` is what
/// the object carries now, and `next` is the set the pending apply will
/// produce. Fields Eno owned previously or is about to own are re-unioned
/// into Eno's entry and subtracted from every other manager. Returns the
/// adjusted entries, the first field path that had to be reclaimed (empty
/// when none), and whether anything changed.
pub fn normalize_conflicting_managers(
    previous: &[FieldManagerEntry],
    current: &[FieldManagerEntry],
    next: &[FieldManagerEntry],
) -> (Vec<FieldManagerEntry>, String, bool) {
    let expected: BTreeSet<String> = previous
        .iter()
        .chain(next.iter())
        .filter(|entry| entry.manager == FIELD_MANAGER)
        .flat_map(|entry| entry.fields.iter().cloned())
        .collect();

    let mut adjusted = Vec::with_capacity(current.len());
    let mut touched = String::new();
    let mut modified = false;
    let mut saw_eno = false;

    for entry in current {
        let mut entry = entry.clone();
        if entry.manager == FIELD_MANAGER {
            saw_eno = true;
            for field in &expected {
                if entry.fields.insert(field.clone()) {
                    modified = true;
                    if touched.is_empty() {
                        touched = field.clone();
                    }
                }
            }
        } else {
            for field in &expected {
                if entry.fields.remove(field) {
                    modified = true;
                    if touched.is_empty() {
                        touched = field.clone();
                    }
                }
            }
        }
        // A manager stripped of its last field has no reason to remain.
        if !entry.fields.is_empty() || entry.manager == FIELD_MANAGER {
            adjusted.push(entry);
        } else {
            modified = true;
        }
    }

    if !saw_eno && !expected.is_empty() {
        modified = true;
        if touched.is_empty() {
            touched = expected.iter().next().cloned().unwrap_or_default();
        }
        adjusted.push(FieldManagerEntry {
            manager: FIELD_MANAGER.to_string(),
            fields: expected,
        });
    }

    (adjusted, touched, modified)
}
