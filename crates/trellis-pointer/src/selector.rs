use serde_json::Value;
use thiserror::Error;

use crate::pointer::{decode_segment, encode_segment};

/// Failure while resolving a selector path, carrying the numeric pointer
/// resolved up to the failing step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("no element with id '{selector}' at {pointer_so_far}")]
    NotFound {
        selector: String,
        pointer_so_far: String,
    },
    #[error("multiple elements with id '{selector}' at {pointer_so_far}")]
    NotUnique {
        selector: String,
        pointer_so_far: String,
    },
    #[error("segment '{segment}' cannot be applied to value at {pointer_so_far}")]
    TypeError {
        segment: String,
        pointer_so_far: String,
    },
    #[error("segment '{segment}' does not resolve at {pointer_so_far}")]
    PointerResolve {
        segment: String,
        pointer_so_far: String,
    },
    #[error("malformed selector segment '{segment}'")]
    Path {
        segment: String,
        pointer_so_far: String,
    },
}

impl SelectorError {
    pub fn code(&self) -> &'static str {
        match self {
            SelectorError::NotFound { .. } => "SELECTOR_NOT_FOUND",
            SelectorError::NotUnique { .. } => "SELECTOR_NOT_UNIQUE",
            SelectorError::TypeError { .. } => "SELECTOR_TYPE_ERROR",
            SelectorError::PointerResolve { .. } => "POINTER_RESOLVE_ERROR",
            SelectorError::Path { .. } => "SELECTOR_PATH_ERROR",
        }
    }

    pub fn pointer_so_far(&self) -> &str {
        match self {
            SelectorError::NotFound { pointer_so_far, .. }
            | SelectorError::NotUnique { pointer_so_far, .. }
            | SelectorError::TypeError { pointer_so_far, .. }
            | SelectorError::PointerResolve { pointer_so_far, .. }
            | SelectorError::Path { pointer_so_far, .. } => pointer_so_far,
        }
    }
}

/// Whether a raw path contains an unresolved `@[id=..]` step.
pub fn contains_selector(path: &str) -> bool {
    path.contains("@[id=")
}

/// Whether a raw path carries plain numeric array indices. Selector steps
/// are exempt; resolved pointers are expected to be numeric.
pub fn contains_numeric_segment(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.first() == Some(&"") {
        segments.remove(0);
    }
    segments.into_iter().any(|seg| {
        if seg.starts_with("@[id=") && seg.ends_with(']') {
            return false;
        }
        let decoded = decode_segment(seg);
        !decoded.is_empty() && decoded.bytes().all(|b| b.is_ascii_digit())
    })
}

enum Step {
    Key(String),
    Selector(String),
    Append,
}

fn classify(segment: &str, pointer_so_far: &str) -> Result<Step, SelectorError> {
    if let Some(rest) = segment.strip_prefix("@[id=") {
        return match rest.strip_suffix(']') {
            Some(id) if !id.is_empty() => Ok(Step::Selector(id.to_string())),
            _ => Err(SelectorError::Path {
                segment: segment.to_string(),
                pointer_so_far: pointer_so_far.to_string(),
            }),
        };
    }
    if segment.starts_with("@[") {
        return Err(SelectorError::Path {
            segment: segment.to_string(),
            pointer_so_far: pointer_so_far.to_string(),
        });
    }
    if segment == "-" {
        return Ok(Step::Append);
    }
    Ok(Step::Key(segment.to_string()))
}

fn element_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

/// Resolve a selector path against a document into a fully numeric RFC-6901
/// pointer.
///
/// Each `@[id=X]` step matches the unique element of the preceding array
/// whose `id` equals `X`. Plain object keys and numeric indices traverse as
/// usual; the final segment is allowed to address a not-yet-existing key or
/// the insertion point one past the end of an array, so resolved `add`
/// targets re-resolve to themselves.
pub fn resolve_selector_path(doc: &Value, path: &str) -> Result<String, SelectorError> {
    let raw_segments: Vec<String> = {
        if path.is_empty() {
            return Ok(String::new());
        }
        let mut parts: Vec<&str> = path.split('/').collect();
        if parts.first() == Some(&"") {
            parts.remove(0);
        }
        parts.into_iter().map(decode_segment).collect()
    };

    let mut resolved: Vec<String> = Vec::with_capacity(raw_segments.len());
    let mut current: Option<&Value> = Some(doc);
    let last_idx = raw_segments.len() - 1;

    for (pos, segment) in raw_segments.iter().enumerate() {
        let pointer_so_far = render(&resolved);
        let is_last = pos == last_idx;
        let here = current.ok_or_else(|| SelectorError::PointerResolve {
            segment: segment.clone(),
            pointer_so_far: pointer_so_far.clone(),
        })?;

        match classify(segment, &pointer_so_far)? {
            Step::Selector(id) => {
                let items = here.as_array().ok_or_else(|| SelectorError::TypeError {
                    segment: segment.clone(),
                    pointer_so_far: pointer_so_far.clone(),
                })?;
                let mut matches = items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| element_id(item) == Some(id.as_str()));
                let first = matches.next();
                let second = matches.next();
                match (first, second) {
                    (Some((idx, item)), None) => {
                        resolved.push(idx.to_string());
                        current = Some(item);
                    }
                    (Some(_), Some(_)) => {
                        return Err(SelectorError::NotUnique {
                            selector: id,
                            pointer_so_far,
                        });
                    }
                    (None, _) => {
                        return Err(SelectorError::NotFound {
                            selector: id,
                            pointer_so_far,
                        });
                    }
                }
            }
            Step::Append => {
                if !here.is_array() || !is_last {
                    return Err(SelectorError::TypeError {
                        segment: segment.clone(),
                        pointer_so_far,
                    });
                }
                resolved.push("-".to_string());
                current = None;
            }
            Step::Key(key) => match here {
                Value::Object(map) => {
                    resolved.push(encode_segment(&key));
                    match map.get(&key) {
                        Some(next) => current = Some(next),
                        None if is_last => current = None,
                        None => {
                            return Err(SelectorError::PointerResolve {
                                segment: segment.clone(),
                                pointer_so_far,
                            });
                        }
                    }
                }
                Value::Array(items) => {
                    let valid_digits =
                        !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit());
                    let idx: usize = if valid_digits {
                        key.parse().map_err(|_| SelectorError::PointerResolve {
                            segment: segment.clone(),
                            pointer_so_far: pointer_so_far.clone(),
                        })?
                    } else {
                        return Err(SelectorError::PointerResolve {
                            segment: segment.clone(),
                            pointer_so_far,
                        });
                    };
                    if idx < items.len() {
                        resolved.push(key.clone());
                        current = Some(&items[idx]);
                    } else if idx == items.len() && is_last {
                        resolved.push(key.clone());
                        current = None;
                    } else {
                        return Err(SelectorError::PointerResolve {
                            segment: segment.clone(),
                            pointer_so_far,
                        });
                    }
                }
                _ => {
                    return Err(SelectorError::TypeError {
                        segment: segment.clone(),
                        pointer_so_far,
                    });
                }
            },
        }
    }

    Ok(render(&resolved))
}

fn render(segments: &[String]) -> String {
    if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Value {
        json!({
            "module": {"id": "job_management"},
            "entities": [
                {
                    "id": "entity.job",
                    "fields": [
                        {"id": "job.title"},
                        {"id": "job.status"},
                        {"id": "job.priority"},
                    ],
                }
            ],
        })
    }

    #[test]
    fn resolves_nested_selectors_to_numeric_pointer() {
        let doc = manifest();
        let resolved = resolve_selector_path(
            &doc,
            "/entities/@[id=entity.job]/fields/@[id=job.status]/id",
        )
        .unwrap();
        assert_eq!(resolved, "/entities/0/fields/1/id");
    }

    #[test]
    fn resolution_is_idempotent() {
        let doc = manifest();
        let once = resolve_selector_path(&doc, "/entities/@[id=entity.job]/fields/@[id=job.priority]")
            .unwrap();
        let twice = resolve_selector_path(&doc, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_id_is_not_found() {
        let doc = manifest();
        let err = resolve_selector_path(&doc, "/entities/@[id=entity.nope]/fields").unwrap_err();
        assert_eq!(err.code(), "SELECTOR_NOT_FOUND");
        assert_eq!(err.pointer_so_far(), "/entities");
    }

    #[test]
    fn duplicate_id_is_not_unique() {
        let doc = json!({"items": [{"id": "a"}, {"id": "a"}]});
        let err = resolve_selector_path(&doc, "/items/@[id=a]").unwrap_err();
        assert_eq!(err.code(), "SELECTOR_NOT_UNIQUE");
    }

    #[test]
    fn selector_against_non_array_is_type_error() {
        let doc = manifest();
        let err = resolve_selector_path(&doc, "/module/@[id=x]").unwrap_err();
        assert_eq!(err.code(), "SELECTOR_TYPE_ERROR");
        assert_eq!(err.pointer_so_far(), "/module");
    }

    #[test]
    fn missing_mid_path_key_fails_resolution() {
        let doc = manifest();
        let err = resolve_selector_path(&doc, "/missing/@[id=a]/x").unwrap_err();
        assert_eq!(err.code(), "POINTER_RESOLVE_ERROR");
    }

    #[test]
    fn final_segment_may_address_new_key_or_append_slot() {
        let doc = manifest();
        assert_eq!(
            resolve_selector_path(&doc, "/entities/@[id=entity.job]/display_field").unwrap(),
            "/entities/0/display_field"
        );
        assert_eq!(
            resolve_selector_path(&doc, "/entities/@[id=entity.job]/fields/-").unwrap(),
            "/entities/0/fields/-"
        );
    }

    #[test]
    fn malformed_selector_is_path_error() {
        let doc = manifest();
        let err = resolve_selector_path(&doc, "/entities/@[id=]").unwrap_err();
        assert_eq!(err.code(), "SELECTOR_PATH_ERROR");
    }

    #[test]
    fn numeric_segment_detection_skips_selectors() {
        assert!(contains_numeric_segment("/entities/0"));
        assert!(!contains_numeric_segment("/entities/@[id=entity.job]/fields"));
        assert!(!contains_numeric_segment("/entities/name"));
        assert!(!contains_numeric_segment(""));
    }
}
