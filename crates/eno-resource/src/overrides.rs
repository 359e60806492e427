use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResourceError;

/// One mutation op from the `eno.azure.io/overrides` annotation, applied
/// to the manifest draft at snapshot time.
///
/// `path` is a JSON Pointer into the draft. A `null` value removes the
/// target; anything else is written in place, creating missing object
/// segments along the way. An op with a `condition` only applies when the
/// condition holds against the live downstream object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Override {
    pub path: String,
    #[serde(default)]
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub condition: Option<String>,
}

impl Override {
    /// Strict-parse validation: the path must be a pointer and the
    /// condition must be in the supported grammar.
    pub fn validate(&self) -> Result<(), ResourceError> {
        if !self.path.starts_with('/') {
            return Err(ResourceError::InvalidOverride(format!(
                "path {:?} is not a JSON pointer",
                self.path
            )));
        }
        if let Some(condition) = &self.condition {
            Condition::parse(condition)?;
        }
        Ok(())
    }

    /// Apply the op to the draft. `live` is the current downstream object,
    /// absent when it has not been created yet.
    pub fn apply(&self, live: Option<&Value>, draft: &mut Value) -> Result<(), ResourceError> {
        if let Some(condition) = &self.condition {
            if !Condition::parse(condition)?.holds(live) {
                return Ok(());
            }
        }
        if self.value.is_null() {
            remove_pointer(draft, &self.path);
        } else {
            set_pointer(draft, &self.path, self.value.clone())?;
        }
        Ok(())
    }
}

/// The condition grammar covers the comparisons the control plane itself
/// emits: `missing(<pointer>)`, `<pointer> == <literal>`, and
/// `<pointer> != <literal>`. Lookups address the live object; an absent
/// live object resolves every pointer to null.
enum Condition {
    Missing(String),
    Equals(String, Value),
    NotEquals(String, Value),
}

impl Condition {
    fn parse(input: &str) -> Result<Self, ResourceError> {
        let input = input.trim();
        if let Some(inner) = input
            .strip_prefix("missing(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let pointer = inner.trim();
            if !pointer.starts_with('/') {
                return Err(ResourceError::InvalidOverride(format!(
                    "missing() takes a JSON pointer, got {pointer:?}"
                )));
            }
            return Ok(Condition::Missing(pointer.to_string()));
        }

        for (separator, not) in [("!=", true), ("==", false)] {
            if let Some((left, right)) = input.split_once(separator) {
                let pointer = left.trim();
                if !pointer.starts_with('/') {
                    return Err(ResourceError::InvalidOverride(format!(
                        "condition operand {pointer:?} is not a JSON pointer"
                    )));
                }
                let literal: Value = serde_json::from_str(right.trim()).map_err(|e| {
                    ResourceError::InvalidOverride(format!(
                        "condition literal {:?}: {e}",
                        right.trim()
                    ))
                })?;
                return Ok(if not {
                    Condition::NotEquals(pointer.to_string(), literal)
                } else {
                    Condition::Equals(pointer.to_string(), literal)
                });
            }
        }

        Err(ResourceError::InvalidOverride(format!(
            "unsupported condition {input:?}"
        )))
    }

    fn holds(&self, live: Option<&Value>) -> bool {
        let lookup = |pointer: &str| -> Value {
            live.and_then(|v| v.pointer(pointer))
                .cloned()
                .unwrap_or(Value::Null)
        };
        match self {
            Condition::Missing(pointer) => lookup(pointer).is_null(),
            Condition::Equals(pointer, literal) => lookup(pointer) == *literal,
            Condition::NotEquals(pointer, literal) => lookup(pointer) != *literal,
        }
    }
}

/// Write a value at a pointer, creating missing object segments. Array
/// indices must already exist; `-` appends.
fn set_pointer(doc: &mut Value, pointer: &str, value: Value) -> Result<(), ResourceError> {
    let tokens: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    if tokens.is_empty() {
        return Err(ResourceError::InvalidOverride(
            "cannot replace the document root".into(),
        ));
    }

    let mut target = doc;
    for (i, token) in tokens.iter().enumerate() {
        let last = i == tokens.len() - 1;
        match target {
            Value::Object(map) => {
                if last {
                    map.insert(token.clone(), value);
                    return Ok(());
                }
                target = map
                    .entry(token.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
            }
            Value::Array(items) => {
                if token == "-" {
                    if last {
                        items.push(value);
                        return Ok(());
                    }
                    return Err(ResourceError::InvalidOverride(format!(
                        "pointer {pointer}: `-` must be the final token"
                    )));
                }
                let index: usize = token.parse().map_err(|_| {
                    ResourceError::InvalidOverride(format!(
                        "pointer {pointer}: bad array index {token:?}"
                    ))
                })?;
                let len = items.len();
                let slot = items.get_mut(index).ok_or_else(|| {
                    ResourceError::InvalidOverride(format!(
                        "pointer {pointer}: index {index} out of bounds (len {len})"
                    ))
                })?;
                if last {
                    *slot = value;
                    return Ok(());
                }
                target = slot;
            }
            _ => {
                return Err(ResourceError::InvalidOverride(format!(
                    "pointer {pointer}: segment {token:?} traverses a scalar"
                )));
            }
        }
    }
    unreachable!("loop returns on the final token")
}

/// Remove the value at a pointer if it resolves. Missing targets are a
/// no-op: deletions are idempotent.
fn remove_pointer(doc: &mut Value, pointer: &str) {
    let Some((parent, token)) = pointer.rsplit_once('/') else {
        return;
    };
    let token = token.replace("~1", "/").replace("~0", "~");
    let Some(parent) = doc.pointer_mut(parent) else {
        return;
    };
    match parent {
        Value::Object(map) => {
            map.remove(&token);
        }
        Value::Array(items) => {
            if let Ok(index) = token.parse::<usize>()
                && index < items.len()
            {
                items.remove(index);
            }
        }
        _ => {}
    }
}
