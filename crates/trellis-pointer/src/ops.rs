use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::pointer::{array_index, container_and_token, get_value};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OpError {
    #[error("missing object key")]
    MissingKey,
    #[error("invalid list index")]
    InvalidIndex,
    #[error("list index out of range")]
    IndexOutOfRange,
    #[error("cannot traverse into non-container")]
    NonContainer,
    #[error("cannot mutate document root")]
    RootMutation,
    #[error("test operation failed")]
    TestFailed,
}

/// One RFC-6902 operation with a fully resolved pointer. This is the shape
/// previews emit in `resolved_ops` and the store replays on apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ResolvedOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl ResolvedOp {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedOp::Add { .. } => "add",
            ResolvedOp::Remove { .. } => "remove",
            ResolvedOp::Replace { .. } => "replace",
            ResolvedOp::Move { .. } => "move",
            ResolvedOp::Copy { .. } => "copy",
            ResolvedOp::Test { .. } => "test",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ResolvedOp::Add { path, .. }
            | ResolvedOp::Remove { path }
            | ResolvedOp::Replace { path, .. }
            | ResolvedOp::Move { path, .. }
            | ResolvedOp::Copy { path, .. }
            | ResolvedOp::Test { path, .. } => path,
        }
    }

    pub fn from_path(&self) -> Option<&str> {
        match self {
            ResolvedOp::Move { from, .. } | ResolvedOp::Copy { from, .. } => Some(from),
            _ => None,
        }
    }
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), OpError> {
    let (container, token) = container_and_token(doc, path)?.ok_or(OpError::RootMutation)?;
    match container {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(items) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            let idx = array_index(&token, items.len(), true)?;
            items.insert(idx, value);
            Ok(())
        }
        _ => Err(OpError::NonContainer),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<(), OpError> {
    let (container, token) = container_and_token(doc, path)?.ok_or(OpError::RootMutation)?;
    match container {
        Value::Object(map) => {
            map.shift_remove(&token).ok_or(OpError::MissingKey)?;
            Ok(())
        }
        Value::Array(items) => {
            let idx = array_index(&token, items.len(), false)?;
            items.remove(idx);
            Ok(())
        }
        _ => Err(OpError::NonContainer),
    }
}

fn replace(doc: &mut Value, path: &str, value: Value) -> Result<(), OpError> {
    let (container, token) = container_and_token(doc, path)?.ok_or(OpError::RootMutation)?;
    match container {
        Value::Object(map) => {
            let slot = map.get_mut(&token).ok_or(OpError::MissingKey)?;
            *slot = value;
            Ok(())
        }
        Value::Array(items) => {
            let idx = array_index(&token, items.len(), false)?;
            items[idx] = value;
            Ok(())
        }
        _ => Err(OpError::NonContainer),
    }
}

fn test(doc: &Value, path: &str, value: &Value) -> Result<(), OpError> {
    let existing = get_value(doc, path)?;
    if existing == value {
        Ok(())
    } else {
        Err(OpError::TestFailed)
    }
}

/// Apply one resolved operation in place. Move is remove-then-add; copy
/// deep-copies the source before inserting.
pub fn apply_op(doc: &mut Value, op: &ResolvedOp) -> Result<(), OpError> {
    match op {
        ResolvedOp::Add { path, value } => add(doc, path, value.clone()),
        ResolvedOp::Remove { path } => remove(doc, path),
        ResolvedOp::Replace { path, value } => replace(doc, path, value.clone()),
        ResolvedOp::Test { path, value } => test(doc, path, value),
        ResolvedOp::Move { from, path } => {
            let value = get_value(doc, from)?.clone();
            remove(doc, from)?;
            add(doc, path, value)
        }
        ResolvedOp::Copy { from, path } => {
            let value = get_value(doc, from)?.clone();
            add(doc, path, value)
        }
    }
}

/// Apply a sequence of resolved operations, stopping at the first failure.
/// On error the document may hold a partial result; callers apply to a copy.
pub fn apply_ops(doc: &mut Value, ops: &[ResolvedOp]) -> Result<(), (usize, OpError)> {
    for (idx, op) in ops.iter().enumerate() {
        apply_op(doc, op).map_err(|err| (idx, err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(raw: Value) -> ResolvedOp {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn add_inserts_into_arrays() {
        let mut doc = json!({"items": [1, 3]});
        apply_op(&mut doc, &op(json!({"op": "add", "path": "/items/1", "value": 2}))).unwrap();
        assert_eq!(doc, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn add_dash_appends() {
        let mut doc = json!({"items": [1]});
        apply_op(&mut doc, &op(json!({"op": "add", "path": "/items/-", "value": 2}))).unwrap();
        assert_eq!(doc, json!({"items": [1, 2]}));
    }

    #[test]
    fn add_at_len_appends() {
        let mut doc = json!({"items": [1]});
        apply_op(&mut doc, &op(json!({"op": "add", "path": "/items/1", "value": 2}))).unwrap();
        assert_eq!(doc, json!({"items": [1, 2]}));
    }

    #[test]
    fn remove_shifts_later_indices() {
        let mut doc = json!({"items": ["a", "b", "c"]});
        apply_op(&mut doc, &op(json!({"op": "remove", "path": "/items/0"}))).unwrap();
        assert_eq!(doc, json!({"items": ["b", "c"]}));
    }

    #[test]
    fn replace_requires_existing_key() {
        let mut doc = json!({"a": 1});
        let err = apply_op(
            &mut doc,
            &op(json!({"op": "replace", "path": "/b", "value": 2})),
        )
        .unwrap_err();
        assert_eq!(err, OpError::MissingKey);
    }

    #[test]
    fn test_op_is_strict_equality() {
        let doc = json!({"a": 1});
        let mut copy = doc.clone();
        apply_op(&mut copy, &op(json!({"op": "test", "path": "/a", "value": 1}))).unwrap();
        let err =
            apply_op(&mut copy, &op(json!({"op": "test", "path": "/a", "value": "1"}))).unwrap_err();
        assert_eq!(err, OpError::TestFailed);
    }

    #[test]
    fn move_deletes_then_adds() {
        let mut doc = json!({"items": ["a", "b"], "other": []});
        apply_op(
            &mut doc,
            &op(json!({"op": "move", "from": "/items/0", "path": "/other/-"})),
        )
        .unwrap();
        assert_eq!(doc, json!({"items": ["b"], "other": ["a"]}));
    }

    #[test]
    fn copy_leaves_source_in_place() {
        let mut doc = json!({"a": {"x": 1}, "list": []});
        apply_op(
            &mut doc,
            &op(json!({"op": "copy", "from": "/a", "path": "/list/-"})),
        )
        .unwrap();
        assert_eq!(doc, json!({"a": {"x": 1}, "list": [{"x": 1}]}));
    }

    #[test]
    fn root_mutation_is_rejected() {
        let mut doc = json!({});
        let err = apply_op(&mut doc, &op(json!({"op": "add", "path": "", "value": 1}))).unwrap_err();
        assert_eq!(err, OpError::RootMutation);
    }

    #[test]
    fn stops_at_first_failure_with_index() {
        let mut doc = json!({"items": []});
        let ops = [
            op(json!({"op": "add", "path": "/items/-", "value": 1})),
            op(json!({"op": "remove", "path": "/missing"})),
        ];
        let (idx, err) = apply_ops(&mut doc, &ops).unwrap_err();
        assert_eq!(idx, 1);
        assert_eq!(err, OpError::MissingKey);
    }
}
