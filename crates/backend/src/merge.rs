//! Recursive deep-merge of configuration fragments.

use std::fmt;

use serde_json::Value;
use wharf_types::ConfigFragment;

/// A scalar (or type) that a later fragment replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConflict {
    /// Dotted path of the overridden key.
    pub path: String,
    pub previous: Value,
    pub incoming: Value,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.path, self.previous, self.incoming)
    }
}

/// Merge `incoming` into `base`; on disagreement `incoming` wins.
///
/// Nested mappings merge recursively. Arrays are treated as scalars.
pub fn merge(mut base: ConfigFragment, incoming: &ConfigFragment) -> ConfigFragment {
    merge_into(&mut base, incoming, "", &mut None);
    base
}

/// Like [`merge`], also reporting every value that was overridden.
pub fn merge_tracked(mut base: ConfigFragment, incoming: &ConfigFragment) -> (ConfigFragment, Vec<MergeConflict>) {
    let mut conflicts = Some(Vec::new());
    merge_into(&mut base, incoming, "", &mut conflicts);
    (base, conflicts.unwrap_or_default())
}

fn merge_into(
    base: &mut ConfigFragment,
    incoming: &ConfigFragment,
    prefix: &str,
    conflicts: &mut Option<Vec<MergeConflict>>,
) {
    for (key, value) in incoming {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_into(existing, nested, &path, conflicts);
            }
            (Some(existing), _) if existing == value => {}
            (Some(existing), _) => {
                if let Some(conflicts) = conflicts.as_mut() {
                    conflicts.push(MergeConflict {
                        path,
                        previous: existing.clone(),
                        incoming: value.clone(),
                    });
                }
                *existing = value.clone();
            }
            (None, _) => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Look up a dotted path such as `backend.default`.
pub fn get_path<'a>(fragment: &'a ConfigFragment, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fragment.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set a dotted path, creating (or replacing non-object) intermediate mappings.
pub fn set_path(fragment: &mut ConfigFragment, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = fragment;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(ConfigFragment::new()));
        if !entry.is_object() {
            *entry = Value::Object(ConfigFragment::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}
