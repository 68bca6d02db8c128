//! The manifest-embedded condition dialect (`domain`, `visible_when`, ...).
//! A narrower language than the runtime DSL: field/value or ref operands,
//! `conditions` lists for and/or, and a single `condition` for not.

use serde_json::Value;

use super::{Vctx, get, get_str, reject_unknown_keys};
use crate::catalog::{ALLOWED_CONDITION_KEYS, ALLOWED_CONDITION_OPS, MAX_CONDITION_DEPTH};

fn validate_operand(cx: &mut Vctx, value: &Value, path: &str) {
    if let Some(map) = value.as_object() {
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        if keys != ["ref"] {
            cx.error(
                "MANIFEST_CONDITION_OPERAND_INVALID",
                "operand must be a ref object",
                path,
            );
            return;
        }
        if !map.get("ref").map(Value::is_string).unwrap_or(false) {
            cx.error(
                "MANIFEST_CONDITION_REF_INVALID",
                "ref must be a string",
                format!("{path}.ref"),
            );
        }
    }
}

pub(crate) fn validate_condition(cx: &mut Vctx, condition: &Value, path: &str, depth: usize) {
    if depth > MAX_CONDITION_DEPTH {
        cx.error("MANIFEST_CONDITION_DEPTH", "condition is nested too deeply", path);
        return;
    }
    if !condition.is_object() {
        cx.error("MANIFEST_CONDITION_INVALID", "condition must be an object", path);
        return;
    }
    reject_unknown_keys(cx, condition, ALLOWED_CONDITION_KEYS, path);
    let op = match get_str(condition, "op") {
        Some(op) if ALLOWED_CONDITION_OPS.contains(&op) => op,
        _ => {
            cx.error(
                "MANIFEST_CONDITION_OP_INVALID",
                "condition.op must be allowlisted",
                format!("{path}.op"),
            );
            return;
        }
    };

    if op == "and" || op == "or" {
        let items = get(condition, "conditions").and_then(Value::as_array);
        match items {
            Some(items) if !items.is_empty() => {
                for (idx, item) in items.iter().enumerate() {
                    validate_condition(cx, item, &format!("{path}.conditions[{idx}]"), depth + 1);
                }
            }
            _ => {
                cx.error(
                    "MANIFEST_CONDITION_LIST_INVALID",
                    "conditions must be a non-empty list",
                    format!("{path}.conditions"),
                );
            }
        }
        return;
    }
    if op == "not" {
        match get(condition, "condition") {
            Some(inner) => validate_condition(cx, inner, &format!("{path}.condition"), depth + 1),
            None => {
                cx.error(
                    "MANIFEST_CONDITION_INVALID",
                    "not requires condition",
                    format!("{path}.condition"),
                );
            }
        }
        return;
    }

    let has_left = condition.as_object().is_some_and(|m| m.contains_key("left"));
    let has_right = condition.as_object().is_some_and(|m| m.contains_key("right"));
    if has_left || has_right {
        if !(has_left && has_right) {
            cx.error(
                "MANIFEST_CONDITION_INVALID",
                "left and right are required together",
                path,
            );
            return;
        }
        if let Some(left) = get(condition, "left") {
            validate_operand(cx, left, &format!("{path}.left"));
        }
        if let Some(right) = get(condition, "right") {
            validate_operand(cx, right, &format!("{path}.right"));
        }
        return;
    }

    let field = get_str(condition, "field").filter(|f| !f.is_empty());
    if field.is_none() {
        cx.error(
            "MANIFEST_CONDITION_FIELD_INVALID",
            "condition.field must be a string",
            format!("{path}.field"),
        );
    }
    let has_value = condition.as_object().is_some_and(|m| m.contains_key("value"));
    if op != "exists" && !has_value {
        cx.error(
            "MANIFEST_CONDITION_VALUE_INVALID",
            "condition.value is required",
            format!("{path}.value"),
        );
    }
}
