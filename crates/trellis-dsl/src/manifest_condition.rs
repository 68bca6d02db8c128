//! Evaluator for the manifest-embedded condition dialect (the shape the
//! manifest validator checks). Unlike the runtime DSL it is lenient: any
//! malformed node or unresolved reference evaluates to `false` rather than
//! raising. Used for `required_when` / `visible_when` / domain filters over
//! record data.

use serde_json::Value;

const ALLOWED_OPS: &[&str] = &[
    "eq", "neq", "gt", "gte", "lt", "lte", "in", "contains", "exists", "and", "or", "not",
];

fn get_by_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let map = data.as_object()?;
    // Flat keys with dots in them win over nested traversal.
    if let Some(value) = map.get(path) {
        return Some(value);
    }
    let mut current = data;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn resolve_ref<'a>(reference: &str, context: &'a Value) -> Option<&'a Value> {
    if let Some(path) = reference.strip_prefix("$record.") {
        return context.get("record").and_then(|r| get_by_path(r, path));
    }
    if let Some(path) = reference.strip_prefix("$candidate.") {
        return context.get("candidate").and_then(|c| get_by_path(c, path));
    }
    let candidate = context
        .get("candidate")
        .and_then(|c| get_by_path(c, reference))
        .filter(|v| !v.is_null());
    if candidate.is_some() {
        return candidate;
    }
    context.get("record").and_then(|r| get_by_path(r, reference))
}

fn resolve_operand<'a>(operand: &'a Value, context: &'a Value) -> Option<&'a Value> {
    if let Some(reference) = operand.get("ref").and_then(Value::as_str) {
        if operand.as_object().map(|o| o.len()) == Some(1) {
            return resolve_ref(reference, context);
        }
    }
    Some(operand)
}

fn as_comparable(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Evaluate a manifest-dialect condition against `{record, candidate}`
/// context. Total: anything malformed is simply `false`.
pub fn eval_manifest_condition(condition: &Value, context: &Value) -> bool {
    let obj = match condition.as_object() {
        Some(obj) if !obj.is_empty() => obj,
        _ => return false,
    };
    let op = match obj.get("op").and_then(Value::as_str) {
        Some(op) if ALLOWED_OPS.contains(&op) => op,
        _ => return false,
    };

    match op {
        "and" => obj
            .get("conditions")
            .and_then(Value::as_array)
            .map(|items| items.iter().all(|c| eval_manifest_condition(c, context)))
            .unwrap_or(true),
        "or" => obj
            .get("conditions")
            .and_then(Value::as_array)
            .map(|items| items.iter().any(|c| eval_manifest_condition(c, context)))
            .unwrap_or(false),
        "not" => !obj
            .get("condition")
            .map(|c| eval_manifest_condition(c, context))
            .unwrap_or(false),
        _ => {
            let has_sides = obj.contains_key("left") || obj.contains_key("right");
            let (left, right) = if has_sides {
                (
                    obj.get("left").and_then(|l| resolve_operand(l, context)),
                    obj.get("right").and_then(|r| resolve_operand(r, context)),
                )
            } else {
                let field = obj.get("field").and_then(Value::as_str);
                (
                    field.and_then(|f| resolve_ref(f, context)),
                    obj.get("value"),
                )
            };

            // A resolved JSON null behaves like an absent value, matching
            // the store's treatment of nullable record fields.
            let left = left.filter(|v| !v.is_null());
            let right = right.filter(|v| !v.is_null());

            match op {
                "exists" => left.map(|v| v.as_str() != Some("")).unwrap_or(false),
                "eq" => left == right,
                "neq" => left != right,
                "gt" => matches!(
                    (as_comparable(left), as_comparable(right)),
                    (Some(l), Some(r)) if l > r
                ),
                "gte" => matches!(
                    (as_comparable(left), as_comparable(right)),
                    (Some(l), Some(r)) if l >= r
                ),
                "lt" => matches!(
                    (as_comparable(left), as_comparable(right)),
                    (Some(l), Some(r)) if l < r
                ),
                "lte" => matches!(
                    (as_comparable(left), as_comparable(right)),
                    (Some(l), Some(r)) if l <= r
                ),
                "in" => match (left, right.and_then(Value::as_array)) {
                    (Some(l), Some(items)) => items.contains(l),
                    _ => false,
                },
                "contains" => match (left, right) {
                    (Some(Value::Array(items)), Some(r)) => items.contains(r),
                    (Some(Value::String(l)), Some(Value::String(r))) => l.contains(r.as_str()),
                    _ => false,
                },
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "record": {"job.status": "done", "job.count": 3, "nested": {"flag": true}},
            "candidate": {"job.status": "open"},
        })
    }

    #[test]
    fn field_conditions_read_record_data() {
        let cond = json!({"op": "eq", "field": "job.status", "value": "open"});
        // Candidate values shadow record values for bare references.
        assert!(eval_manifest_condition(&cond, &context()));
        let cond = json!({"op": "eq", "field": "$record.job.status", "value": "done"});
        assert!(eval_manifest_condition(&cond, &context()));
    }

    #[test]
    fn flat_keys_win_over_nested_paths() {
        let ctx = json!({"record": {"a.b": 1, "a": {"b": 2}}});
        let cond = json!({"op": "eq", "field": "$record.a.b", "value": 1});
        assert!(eval_manifest_condition(&cond, &ctx));
    }

    #[test]
    fn ref_operands_resolve_both_sides() {
        let cond = json!({
            "op": "eq",
            "left": {"ref": "$record.job.status"},
            "right": {"ref": "$candidate.job.status"},
        });
        assert!(!eval_manifest_condition(&cond, &context()));
    }

    #[test]
    fn boolean_combinators() {
        let cond = json!({
            "op": "and",
            "conditions": [
                {"op": "exists", "field": "$record.job.status"},
                {"op": "not", "condition": {"op": "eq", "field": "$record.job.count", "value": 4}},
            ],
        });
        assert!(eval_manifest_condition(&cond, &context()));
    }

    #[test]
    fn exists_treats_empty_string_as_absent() {
        let ctx = json!({"record": {"a": ""}});
        assert!(!eval_manifest_condition(&json!({"op": "exists", "field": "a"}), &ctx));
    }

    #[test]
    fn malformed_conditions_are_false() {
        assert!(!eval_manifest_condition(&json!(null), &context()));
        assert!(!eval_manifest_condition(&json!({"op": "launch"}), &context()));
        assert!(!eval_manifest_condition(&json!({}), &context()));
    }

    #[test]
    fn numeric_comparisons() {
        let cond = json!({"op": "gte", "field": "$record.job.count", "value": 3});
        assert!(eval_manifest_condition(&cond, &context()));
        let cond = json!({"op": "lt", "field": "$record.job.count", "value": 3});
        assert!(!eval_manifest_condition(&cond, &context()));
    }
}
