//! Patch preview: validate a patch envelope against the current manifest,
//! resolve selector paths, expand the `add_field` macro, guard protected
//! paths, and dry-run the resolved operations on a copy. Previews never
//! touch the manifest store.

use serde::Serialize;
use serde_json::Value;

use trellis_hash::ContentHash;
use trellis_pointer::{
    ResolvedOp, apply_op, contains_numeric_segment, contains_selector, get_value, parse_pointer,
    resolve_selector_path,
};

const ALLOWED_OPS: &[&str] = &["add", "remove", "replace", "move", "copy", "test", "add_field"];

/// One problem found while validating or simulating a patch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchIssue {
    pub code: String,
    pub message: String,
    pub op_index: Option<usize>,
    pub path: Option<String>,
    pub resolved_path: Option<String>,
}

impl PatchIssue {
    fn new(code: &str, message: impl Into<String>) -> Self {
        PatchIssue {
            code: code.to_string(),
            message: message.into(),
            op_index: None,
            path: None,
            resolved_path: None,
        }
    }

    fn at_op(mut self, op_index: usize) -> Self {
        self.op_index = Some(op_index);
        self
    }

    fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn with_resolved(mut self, resolved: impl Into<String>) -> Self {
        self.resolved_path = Some(resolved.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpCounts {
    pub add: usize,
    pub remove: usize,
    pub replace: usize,
    #[serde(rename = "move")]
    pub move_: usize,
    pub copy: usize,
    pub test: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffSummary {
    pub touched: Vec<String>,
    pub counts: OpCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub ok: bool,
    pub errors: Vec<PatchIssue>,
    pub warnings: Vec<PatchIssue>,
    pub impact: Option<Impact>,
    pub resolved_ops: Vec<ResolvedOp>,
    pub diff_summary: DiffSummary,
}

impl PreviewResult {
    fn failed(errors: Vec<PatchIssue>, resolved_ops: Vec<ResolvedOp>) -> Self {
        let diff_summary = diff_summary(&resolved_ops);
        PreviewResult {
            ok: false,
            errors,
            warnings: Vec::new(),
            impact: None,
            resolved_ops,
            diff_summary,
        }
    }
}

fn diff_summary(ops: &[ResolvedOp]) -> DiffSummary {
    let mut counts = OpCounts::default();
    let mut touched: Vec<String> = Vec::new();
    for op in ops {
        match op {
            ResolvedOp::Add { .. } => counts.add += 1,
            ResolvedOp::Remove { .. } => counts.remove += 1,
            ResolvedOp::Replace { .. } => counts.replace += 1,
            ResolvedOp::Move { .. } => counts.move_ += 1,
            ResolvedOp::Copy { .. } => counts.copy += 1,
            ResolvedOp::Test { .. } => counts.test += 1,
        }
        touched.push(op.path().to_string());
        if let Some(from) = op.from_path() {
            touched.push(from.to_string());
        }
    }
    touched.sort_unstable();
    touched.dedup();
    DiffSummary { touched, counts }
}

/// Impact is derived purely from resolved op kinds: destructive edits rank
/// high, additive edits medium.
fn classify_impact(ops: &[ResolvedOp]) -> Option<Impact> {
    for op in ops {
        match op {
            ResolvedOp::Remove { .. } => return Some(Impact::High),
            ResolvedOp::Replace { path, .. } if path.contains("/id") => {
                return Some(Impact::High);
            }
            _ => {}
        }
    }
    if ops.iter().any(|op| matches!(op, ResolvedOp::Add { .. })) {
        return Some(Impact::Medium);
    }
    if !ops.is_empty() {
        return Some(Impact::Low);
    }
    None
}

/// Paths the patch pipeline refuses to touch regardless of the op.
pub fn is_protected_path(pointer: &str) -> bool {
    pointer.starts_with("/module/id") || pointer.starts_with("/module/requires")
}

fn resolve_path(
    doc: &Value,
    raw_path: &str,
    op_index: usize,
    errors: &mut Vec<PatchIssue>,
) -> Option<String> {
    if !contains_selector(raw_path) {
        return Some(raw_path.to_string());
    }
    match resolve_selector_path(doc, raw_path) {
        Ok(resolved) => Some(resolved),
        Err(err) => {
            let pointer_so_far = err.pointer_so_far().to_string();
            errors.push(
                PatchIssue::new(err.code(), err.to_string())
                    .at_op(op_index)
                    .with_path(raw_path)
                    .with_resolved(pointer_so_far),
            );
            None
        }
    }
}

fn expand_add_field(
    manifest: &Value,
    op: &Value,
    op_index: usize,
    errors: &mut Vec<PatchIssue>,
) -> Option<ResolvedOp> {
    let entity_id = op.get("entity_id").and_then(Value::as_str);
    let after_field_id = op.get("after_field_id").and_then(Value::as_str);
    let field = op.get("field");
    let (entity_id, after_field_id, field) = match (entity_id, after_field_id, field) {
        (Some(entity_id), Some(after_field_id), Some(field)) if !field.is_null() => {
            (entity_id, after_field_id, field)
        }
        _ => {
            errors.push(
                PatchIssue::new(
                    "ADD_FIELD_INVALID",
                    "add_field requires entity_id (str), after_field_id (str), and field",
                )
                .at_op(op_index),
            );
            return None;
        }
    };

    let fields_selector = format!("/entities/@[id={entity_id}]/fields");
    let resolved_fields_path = resolve_path(manifest, &fields_selector, op_index, errors)?;

    let after_selector = format!("/entities/@[id={entity_id}]/fields/@[id={after_field_id}]");
    let resolved_after_path = resolve_path(manifest, &after_selector, op_index, errors)?;

    let fields_list = match get_value(manifest, &resolved_fields_path) {
        Ok(value) => value,
        Err(err) => {
            errors.push(
                PatchIssue::new("ADD_FIELD_INVALID", format!("cannot access fields list: {err}"))
                    .at_op(op_index)
                    .with_path(fields_selector)
                    .with_resolved(resolved_fields_path),
            );
            return None;
        }
    };
    if !fields_list.is_array() {
        errors.push(
            PatchIssue::new("ADD_FIELD_INVALID", "fields target is not a list")
                .at_op(op_index)
                .with_path(fields_selector)
                .with_resolved(resolved_fields_path),
        );
        return None;
    }

    let tokens = parse_pointer(&resolved_after_path);
    let after_index: Option<usize> = tokens
        .last()
        .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|t| t.parse().ok());
    let after_index = match after_index {
        Some(idx) => idx,
        None => {
            errors.push(
                PatchIssue::new("ADD_FIELD_INVALID", "after_field_id did not resolve to an index")
                    .at_op(op_index)
                    .with_path(after_selector)
                    .with_resolved(resolved_after_path),
            );
            return None;
        }
    };

    // Inserting at index + 1 puts the new field right after its anchor;
    // when the anchor is last this is an append.
    Some(ResolvedOp::Add {
        path: format!("{resolved_fields_path}/{}", after_index + 1),
        value: field.clone(),
    })
}

/// Validate and dry-run a patch envelope against the given manifest.
pub fn preview_patch(manifest: &Value, patch: &Value) -> PreviewResult {
    let mut errors: Vec<PatchIssue> = Vec::new();
    let warnings: Vec<PatchIssue> = Vec::new();
    let mut resolved_ops: Vec<ResolvedOp> = Vec::new();

    let patch_obj = match patch.as_object() {
        Some(patch_obj) => patch_obj,
        None => {
            errors.push(PatchIssue::new("PATCH_NOT_OBJECT", "patch must be a JSON object"));
            return PreviewResult::failed(errors, resolved_ops);
        }
    };

    for field in [
        "patch_id",
        "target_module_id",
        "target_manifest_hash",
        "mode",
        "reason",
        "operations",
    ] {
        if !patch_obj.contains_key(field) {
            errors.push(PatchIssue::new(
                "PATCH_MISSING_FIELD",
                format!("missing required field: {field}"),
            ));
        }
    }
    if !errors.is_empty() {
        return PreviewResult::failed(errors, resolved_ops);
    }

    if patch_obj.get("mode").and_then(Value::as_str) != Some("preview") {
        errors.push(PatchIssue::new("PATCH_MODE_NOT_PREVIEW", "mode must be 'preview'"));
        return PreviewResult::failed(errors, resolved_ops);
    }

    let operations = match patch_obj.get("operations").and_then(Value::as_array) {
        Some(operations) => operations,
        None => {
            errors.push(PatchIssue::new("PATCH_OPS_NOT_LIST", "operations must be a list"));
            return PreviewResult::failed(errors, resolved_ops);
        }
    };

    let current_hash = match ContentHash::of_value(manifest) {
        Ok(hash) => hash.to_hex(),
        Err(err) => {
            errors.push(PatchIssue::new("PATCH_HASH_MISMATCH", err.to_string()));
            return PreviewResult::failed(errors, resolved_ops);
        }
    };
    if patch_obj.get("target_manifest_hash").and_then(Value::as_str) != Some(&current_hash) {
        errors.push(PatchIssue::new(
            "PATCH_HASH_MISMATCH",
            "target_manifest_hash does not match current manifest",
        ));
        return PreviewResult::failed(errors, resolved_ops);
    }

    for (idx, op) in operations.iter().enumerate() {
        if !op.is_object() {
            errors.push(PatchIssue::new("OP_NOT_OBJECT", "operation must be an object").at_op(idx));
            continue;
        }
        let op_name = op.get("op").and_then(Value::as_str).unwrap_or_default();
        if !ALLOWED_OPS.contains(&op_name) {
            errors.push(
                PatchIssue::new("OP_UNSUPPORTED", format!("unsupported op: {op_name}")).at_op(idx),
            );
            continue;
        }

        if op_name == "add_field" {
            if let Some(expanded) = expand_add_field(manifest, op, idx, &mut errors) {
                resolved_ops.push(expanded);
            }
            continue;
        }

        let path = op.get("path").and_then(Value::as_str);
        let from_path = op.get("from").and_then(Value::as_str);
        let has_value = op.get("value").is_some();

        let missing = match op_name {
            "add" | "replace" | "test" => path.is_none() || !has_value,
            "remove" => path.is_none(),
            "move" | "copy" => path.is_none() || from_path.is_none(),
            _ => false,
        };
        if missing {
            let message = match op_name {
                "remove" => "op requires path",
                "move" | "copy" => "op requires path and from",
                _ => "op requires path and value",
            };
            errors.push(PatchIssue::new("OP_MISSING_FIELD", message).at_op(idx));
            continue;
        }

        if let Some(path) = path {
            if contains_numeric_segment(path) {
                errors.push(
                    PatchIssue::new(
                        "OP_NUMERIC_INDEX_PATH",
                        "numeric index segments are not allowed in incoming paths",
                    )
                    .at_op(idx)
                    .with_path(path),
                );
                continue;
            }
        }
        if let Some(from_path) = from_path {
            if contains_numeric_segment(from_path) {
                errors.push(
                    PatchIssue::new(
                        "OP_NUMERIC_INDEX_PATH",
                        "numeric index segments are not allowed in incoming from paths",
                    )
                    .at_op(idx)
                    .with_path(from_path),
                );
                continue;
            }
        }

        let resolved_path = path.and_then(|p| resolve_path(manifest, p, idx, &mut errors));
        let resolved_from = if matches!(op_name, "move" | "copy") {
            from_path.and_then(|p| resolve_path(manifest, p, idx, &mut errors))
        } else {
            None
        };

        if (path.is_some() && resolved_path.is_none())
            || (matches!(op_name, "move" | "copy") && from_path.is_some() && resolved_from.is_none())
        {
            continue;
        }

        if let Some(resolved) = resolved_path.as_deref() {
            if is_protected_path(resolved) {
                errors.push(
                    PatchIssue::new("PROTECTED_PATH", "operation targets protected path")
                        .at_op(idx)
                        .with_path(path.unwrap_or_default())
                        .with_resolved(resolved),
                );
                continue;
            }
        }
        if let Some(resolved) = resolved_from.as_deref() {
            if is_protected_path(resolved) {
                errors.push(
                    PatchIssue::new("PROTECTED_PATH", "operation sources protected path")
                        .at_op(idx)
                        .with_path(from_path.unwrap_or_default())
                        .with_resolved(resolved),
                );
                continue;
            }
        }

        let resolved_path = resolved_path.unwrap_or_default();
        let normalized = match op_name {
            "add" => ResolvedOp::Add {
                path: resolved_path,
                value: op.get("value").cloned().unwrap_or(Value::Null),
            },
            "replace" => ResolvedOp::Replace {
                path: resolved_path,
                value: op.get("value").cloned().unwrap_or(Value::Null),
            },
            "test" => ResolvedOp::Test {
                path: resolved_path,
                value: op.get("value").cloned().unwrap_or(Value::Null),
            },
            "remove" => ResolvedOp::Remove { path: resolved_path },
            "move" => ResolvedOp::Move {
                from: resolved_from.unwrap_or_default(),
                path: resolved_path,
            },
            _ => ResolvedOp::Copy {
                from: resolved_from.unwrap_or_default(),
                path: resolved_path,
            },
        };
        resolved_ops.push(normalized);
    }

    if !errors.is_empty() {
        return PreviewResult::failed(errors, resolved_ops);
    }

    // Dry-run on a copy. Failures are recorded per op; later ops still run
    // so one preview surfaces as many problems as possible.
    let mut simulated = manifest.clone();
    for (idx, op) in resolved_ops.iter().enumerate() {
        if let Err(err) = apply_op(&mut simulated, op) {
            errors.push(
                PatchIssue::new("SIMULATION_ERROR", format!("simulation failed: {err}"))
                    .at_op(idx)
                    .with_path(op.path())
                    .with_resolved(op.path()),
            );
        }
    }

    let ok = errors.is_empty();
    let impact = if ok { classify_impact(&resolved_ops) } else { None };
    let diff = diff_summary(&resolved_ops);
    PreviewResult {
        ok,
        errors,
        warnings,
        impact,
        resolved_ops,
        diff_summary: diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Value {
        json!({
            "module": {"id": "job_management", "requires": []},
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

    fn base_patch(manifest: &Value) -> Value {
        json!({
            "patch_id": "p1",
            "target_module_id": "job_management",
            "target_manifest_hash": ContentHash::of_value(manifest).unwrap().to_hex(),
            "mode": "preview",
            "reason": "test",
            "operations": [],
        })
    }

    #[test]
    fn hash_mismatch_fails_early() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["target_manifest_hash"] = json!("sha256:deadbeef");
        let result = preview_patch(&manifest, &patch);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "PATCH_HASH_MISMATCH");
        assert!(result.resolved_ops.is_empty());
    }

    #[test]
    fn missing_fields_accumulate() {
        let result = preview_patch(&manifest(), &json!({"patch_id": "p1"}));
        assert!(!result.ok);
        let missing = result
            .errors
            .iter()
            .filter(|e| e.code == "PATCH_MISSING_FIELD")
            .count();
        assert_eq!(missing, 5);
    }

    #[test]
    fn selectors_resolve_and_simulate() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([
            {
                "op": "replace",
                "path": "/entities/@[id=entity.job]/fields/@[id=job.status]/id",
                "value": "job.state",
            }
        ]);
        let result = preview_patch(&manifest, &patch);
        assert!(result.ok, "{:?}", result.errors);
        assert_eq!(result.resolved_ops[0].path(), "/entities/0/fields/1/id");
        assert_eq!(result.impact, Some(Impact::High));
    }

    #[test]
    fn numeric_index_paths_are_rejected() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([{"op": "remove", "path": "/entities/0"}]);
        let result = preview_patch(&manifest, &patch);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "OP_NUMERIC_INDEX_PATH");
    }

    #[test]
    fn add_field_macro_expands_after_anchor() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([
            {
                "op": "add_field",
                "entity_id": "entity.job",
                "after_field_id": "job.status",
                "field": {"id": "job.owner"},
            }
        ]);
        let result = preview_patch(&manifest, &patch);
        assert!(result.ok, "{:?}", result.errors);
        assert_eq!(result.resolved_ops[0].kind(), "add");
        assert_eq!(result.resolved_ops[0].path(), "/entities/0/fields/2");
    }

    #[test]
    fn add_field_after_last_field_appends() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([
            {
                "op": "add_field",
                "entity_id": "entity.job",
                "after_field_id": "job.priority",
                "field": {"id": "job.owner"},
            }
        ]);
        let result = preview_patch(&manifest, &patch);
        assert!(result.ok, "{:?}", result.errors);
        assert_eq!(result.resolved_ops[0].path(), "/entities/0/fields/3");
    }

    #[test]
    fn add_field_unknown_anchor_is_reported() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([
            {
                "op": "add_field",
                "entity_id": "entity.job",
                "after_field_id": "job.missing",
                "field": {"id": "job.owner"},
            }
        ]);
        let result = preview_patch(&manifest, &patch);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "SELECTOR_NOT_FOUND");
    }

    #[test]
    fn protected_paths_are_denied() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([{"op": "replace", "path": "/module/id", "value": "x"}]);
        let result = preview_patch(&manifest, &patch);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "PROTECTED_PATH");
    }

    #[test]
    fn failing_test_op_is_a_simulation_error() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([
            {
                "op": "test",
                "path": "/entities/@[id=entity.job]/fields/@[id=job.status]/id",
                "value": "wrong",
            }
        ]);
        let result = preview_patch(&manifest, &patch);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "SIMULATION_ERROR");
    }

    #[test]
    fn diff_summary_collects_sorted_touched_paths() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([
            {
                "op": "replace",
                "path": "/entities/@[id=entity.job]/fields/@[id=job.status]/id",
                "value": "job.state",
            },
            {
                "op": "copy",
                "from": "/entities/@[id=entity.job]/fields/@[id=job.title]",
                "path": "/entities/@[id=entity.job]/fields/@[id=job.priority]",
            },
        ]);
        let result = preview_patch(&manifest, &patch);
        assert!(result.ok, "{:?}", result.errors);
        assert_eq!(result.diff_summary.counts.replace, 1);
        assert_eq!(result.diff_summary.counts.copy, 1);
        assert_eq!(
            result.diff_summary.touched,
            vec![
                "/entities/0/fields/0",
                "/entities/0/fields/1/id",
                "/entities/0/fields/2",
            ]
        );
    }

    #[test]
    fn empty_operation_list_has_no_impact() {
        let manifest = manifest();
        let patch = base_patch(&manifest);
        let result = preview_patch(&manifest, &patch);
        assert!(result.ok);
        assert_eq!(result.impact, None);
    }

    #[test]
    fn unsupported_op_is_reported_with_index() {
        let manifest = manifest();
        let mut patch = base_patch(&manifest);
        patch["operations"] = json!([{"op": "merge", "path": "/entities"}]);
        let result = preview_patch(&manifest, &patch);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "OP_UNSUPPORTED");
        assert_eq!(result.errors[0].op_index, Some(0));
    }
}
