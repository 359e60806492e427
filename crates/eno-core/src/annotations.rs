//! Annotation keys under the `eno.azure.io` domain.
//!
//! Manifests, input objects, and compositions carry control-plane metadata
//! as annotations. Everything under [`DOMAIN`] is stripped from snapshots
//! before a resource is shipped downstream.

/// Domain prefix for every Eno annotation and label.
pub const DOMAIN: &str = "eno.azure.io";

// ── manifest annotations ─────────────────────────────────────────────────

/// Integer readiness group controlling visibility ordering.
pub const READINESS_GROUP: &str = "eno.azure.io/readiness-group";

/// Unsuffixed readiness check, stored under the name `default`.
pub const READINESS: &str = "eno.azure.io/readiness";

/// Prefix for named readiness checks (`readiness-<name>`).
pub const READINESS_PREFIX: &str = "eno.azure.io/readiness-";

/// Duration between periodic resyncs of the resource.
pub const RECONCILE_INTERVAL: &str = "eno.azure.io/reconcile-interval";

/// Skip drift correction for the resource.
pub const DISABLE_UPDATES: &str = "eno.azure.io/disable-updates";

/// Force delete+create instead of update.
pub const REPLACE: &str = "eno.azure.io/replace";

/// JSON array of mutation ops applied at snapshot time.
pub const OVERRIDES: &str = "eno.azure.io/overrides";

// ── input-object annotations ─────────────────────────────────────────────

/// Caller-supplied monotonic version of an input object.
pub const REVISION: &str = "eno.azure.io/revision";

/// Synthesizer generation the input has caught up to.
pub const SYNTHESIZER_GENERATION: &str = "eno.azure.io/synthesizer-generation";

/// Composition generation the input has caught up to.
pub const COMPOSITION_GENERATION: &str = "eno.azure.io/composition-generation";

/// Binding key stamped on fetched inputs so the synthesizer can
/// disambiguate by key rather than GVK.
pub const INPUT_KEY: &str = "eno.azure.io/input-key";

// ── composition annotations ──────────────────────────────────────────────

/// Deletion strategy; the value [`DELETION_STRATEGY_ORPHAN`] leaves
/// downstream objects in place when the composition is deleted.
pub const DELETION_STRATEGY: &str = "eno.azure.io/deletion-strategy";

/// Orphan value for [`DELETION_STRATEGY`].
pub const DELETION_STRATEGY_ORPHAN: &str = "orphan";

// ── slice lifecycle ──────────────────────────────────────────────────────

/// Finalizer keeping a slice alive until its tombstones are reconciled.
pub const CLEANUP_FINALIZER: &str = "eno.azure.io/cleanup";

/// Returns true for annotation/label keys owned by the Eno control plane.
pub fn is_eno_key(key: &str) -> bool {
    key == DOMAIN || key.starts_with("eno.azure.io/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eno_keys_recognized() {
        assert!(is_eno_key(READINESS_GROUP));
        assert!(is_eno_key("eno.azure.io/anything"));
        assert!(!is_eno_key("example.com/readiness-group"));
        assert!(!is_eno_key("readiness-group"));
    }
}
