use std::collections::BTreeMap;

use eno_core::annotations;

use crate::error::ResourceError;

/// A named CEL expression evaluated by the downstream reconciler against
/// the live object. The core stores and orders the checks; evaluation is
/// the apply loop's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheck {
    pub name: String,
    pub expr: String,
}

/// Extract readiness checks from manifest annotations.
///
/// `eno.azure.io/readiness` becomes the check named `default`;
/// `eno.azure.io/readiness-<name>` keeps its suffix. Annotation-map order
/// puts `default` first, then named checks alphabetically.
pub fn parse_readiness_checks(
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<ReadinessCheck>, ResourceError> {
    let mut checks: Vec<ReadinessCheck> = Vec::new();

    for (key, value) in annotations {
        let name = if key == annotations::READINESS {
            "default".to_string()
        } else if let Some(suffix) = key.strip_prefix(annotations::READINESS_PREFIX) {
            if suffix == "group" {
                // eno.azure.io/readiness-group is its own annotation.
                continue;
            }
            suffix.to_string()
        } else {
            continue;
        };

        if value.trim().is_empty() {
            return Err(ResourceError::InvalidReadiness(format!(
                "empty expression for check {name:?}"
            )));
        }
        if checks.iter().any(|c| c.name == name) {
            return Err(ResourceError::InvalidReadiness(format!(
                "duplicate check name {name:?}"
            )));
        }
        checks.push(ReadinessCheck {
            name,
            expr: value.clone(),
        });
    }

    Ok(checks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unsuffixed_key_is_named_default() {
        let checks = parse_readiness_checks(&annotations(&[
            ("eno.azure.io/readiness", "self.status.ready == true"),
            ("eno.azure.io/readiness-replicas", "self.status.readyReplicas == self.spec.replicas"),
        ]))
        .unwrap();

        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].name, "default");
        assert_eq!(checks[1].name, "replicas");
    }

    #[test]
    fn readiness_group_is_not_a_check() {
        let checks = parse_readiness_checks(&annotations(&[
            ("eno.azure.io/readiness-group", "3"),
        ]))
        .unwrap();
        assert!(checks.is_empty());
    }

    #[test]
    fn duplicate_default_rejected() {
        let err = parse_readiness_checks(&annotations(&[
            ("eno.azure.io/readiness", "a"),
            ("eno.azure.io/readiness-default", "b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidReadiness(_)));
    }

    #[test]
    fn empty_expression_rejected() {
        let err = parse_readiness_checks(&annotations(&[("eno.azure.io/readiness", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidReadiness(_)));
    }
}
