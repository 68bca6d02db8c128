use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_DEPTH_LIMIT: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("{message} (path={path})")]
    Schema { message: String, path: String },
    #[error("depth limit exceeded (path={path})")]
    Depth { path: String },
    #[error("unresolved var: {name} (path={path})")]
    VarUnresolved { name: String, path: String },
    #[error("{message} (path={path})")]
    Type { message: String, path: String },
    #[error("unknown op: {op} (path={path})")]
    UnknownOp { op: String, path: String },
}

impl ConditionError {
    pub fn code(&self) -> &'static str {
        match self {
            ConditionError::Schema { .. } => "CONDITION_SCHEMA_ERROR",
            ConditionError::Depth { .. } => "CONDITION_DEPTH_EXCEEDED",
            ConditionError::VarUnresolved { .. } => "CONDITION_VAR_UNRESOLVED",
            ConditionError::Type { .. } => "CONDITION_TYPE_ERROR",
            ConditionError::UnknownOp { .. } => "CONDITION_UNKNOWN_OP",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ConditionError::Schema { path, .. }
            | ConditionError::Depth { path }
            | ConditionError::VarUnresolved { path, .. }
            | ConditionError::Type { path, .. }
            | ConditionError::UnknownOp { path, .. } => path,
        }
    }
}

fn schema(message: impl Into<String>, path: &str) -> ConditionError {
    ConditionError::Schema {
        message: message.into(),
        path: path.to_string(),
    }
}

fn type_error(message: impl Into<String>, path: &str) -> ConditionError {
    ConditionError::Type {
        message: message.into(),
        path: path.to_string(),
    }
}

fn check_depth(depth: usize, limit: usize, path: &str) -> Result<(), ConditionError> {
    if depth > limit {
        Err(ConditionError::Depth {
            path: path.to_string(),
        })
    } else {
        Ok(())
    }
}

fn resolve_var<'a>(ctx: &'a Map<String, Value>, name: &str, path: &str) -> Result<&'a Value, ConditionError> {
    let unresolved = || ConditionError::VarUnresolved {
        name: name.to_string(),
        path: path.to_string(),
    };
    let mut parts = name.split('.');
    let first = parts.next().unwrap_or("");
    let mut current = ctx.get(first).ok_or_else(&unresolved)?;
    for part in parts {
        current = current
            .as_object()
            .and_then(|map| map.get(part))
            .ok_or_else(&unresolved)?;
    }
    Ok(current)
}

fn is_number(value: &Value) -> bool {
    value.is_number()
}

fn numeric(value: &Value, path: &str) -> Result<f64, ConditionError> {
    let n = value
        .as_f64()
        .ok_or_else(|| type_error("comparison requires numbers", path))?;
    if !n.is_finite() {
        return Err(type_error("non-finite number", path));
    }
    Ok(n)
}

fn eval_value(
    node: &Value,
    ctx: &Map<String, Value>,
    path: &str,
    depth: usize,
    limit: usize,
) -> Result<Value, ConditionError> {
    check_depth(depth, limit, path)?;
    let obj = node
        .as_object()
        .ok_or_else(|| schema("value node must be object", path))?;
    if let Some(var) = obj.get("var") {
        let name = var
            .as_str()
            .ok_or_else(|| schema("var must be string", path))?;
        return resolve_var(ctx, name, path).cloned();
    }
    if let Some(literal) = obj.get("literal") {
        return Ok(literal.clone());
    }
    if let Some(array) = obj.get("array") {
        let items = array
            .as_array()
            .ok_or_else(|| schema("array must be list", path))?;
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            out.push(eval_value(item, ctx, &format!("{path}.array[{idx}]"), depth + 1, limit)?);
        }
        return Ok(Value::Array(out));
    }
    Err(schema("invalid value node", path))
}

fn eval_exists(
    node: &Value,
    ctx: &Map<String, Value>,
    path: &str,
    depth: usize,
    limit: usize,
) -> Result<bool, ConditionError> {
    check_depth(depth, limit, path)?;
    let obj = node
        .as_object()
        .ok_or_else(|| schema("value node must be object", path))?;
    if let Some(var) = obj.get("var") {
        let name = var
            .as_str()
            .ok_or_else(|| schema("var must be string", path))?;
        return match resolve_var(ctx, name, path) {
            Ok(value) => Ok(!value.is_null()),
            Err(ConditionError::VarUnresolved { .. }) => Ok(false),
            Err(err) => Err(err),
        };
    }
    let value = eval_value(node, ctx, path, depth + 1, limit)?;
    Ok(!value.is_null())
}

fn operand<'a>(cond: &'a Map<String, Value>, field: &str, path: &str) -> Result<&'a Value, ConditionError> {
    cond.get(field)
        .ok_or_else(|| schema(format!("missing required field: {field}"), path))
}

/// Evaluate a condition against a context object with the default depth limit.
pub fn eval_condition(cond: &Value, ctx: &Value) -> Result<bool, ConditionError> {
    eval_condition_limited(cond, ctx, DEFAULT_DEPTH_LIMIT)
}

/// Evaluate with an explicit depth budget (used when a caller has already
/// consumed part of its own budget).
pub fn eval_condition_limited(
    cond: &Value,
    ctx: &Value,
    depth_limit: usize,
) -> Result<bool, ConditionError> {
    let ctx = ctx
        .as_object()
        .ok_or_else(|| schema("ctx must be object", "$"))?;
    eval_node(cond, ctx, "$", 1, depth_limit)
}

fn eval_node(
    cond: &Value,
    ctx: &Map<String, Value>,
    path: &str,
    depth: usize,
    limit: usize,
) -> Result<bool, ConditionError> {
    check_depth(depth, limit, path)?;
    let obj = cond
        .as_object()
        .ok_or_else(|| schema("condition must be object", path))?;
    let op = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| schema("missing op", path))?;

    match op {
        "and" | "or" => {
            let children = operand(obj, "children", path)?
                .as_array()
                .ok_or_else(|| schema("children must be list", &format!("{path}.children")))?;
            for (idx, child) in children.iter().enumerate() {
                let hit = eval_node(child, ctx, &format!("{path}.children[{idx}]"), depth + 1, limit)?;
                if op == "and" && !hit {
                    return Ok(false);
                }
                if op == "or" && hit {
                    return Ok(true);
                }
            }
            Ok(op == "and")
        }
        "not" => {
            let children = operand(obj, "children", path)?
                .as_array()
                .filter(|c| c.len() == 1)
                .ok_or_else(|| schema("not requires single child", &format!("{path}.children")))?;
            Ok(!eval_node(&children[0], ctx, &format!("{path}.children[0]"), depth + 1, limit)?)
        }
        "eq" | "neq" => {
            let left = eval_value(operand(obj, "left", path)?, ctx, &format!("{path}.left"), depth + 1, limit)?;
            let right = eval_value(operand(obj, "right", path)?, ctx, &format!("{path}.right"), depth + 1, limit)?;
            Ok(if op == "eq" { left == right } else { left != right })
        }
        "gt" | "gte" | "lt" | "lte" => {
            let left = eval_value(operand(obj, "left", path)?, ctx, &format!("{path}.left"), depth + 1, limit)?;
            let right = eval_value(operand(obj, "right", path)?, ctx, &format!("{path}.right"), depth + 1, limit)?;
            if !is_number(&left) || !is_number(&right) {
                return Err(type_error("comparison requires numbers", path));
            }
            let l = numeric(&left, &format!("{path}.left"))?;
            let r = numeric(&right, &format!("{path}.right"))?;
            Ok(match op {
                "gt" => l > r,
                "gte" => l >= r,
                "lt" => l < r,
                _ => l <= r,
            })
        }
        "contains" => {
            let left = eval_value(operand(obj, "left", path)?, ctx, &format!("{path}.left"), depth + 1, limit)?;
            let right = eval_value(operand(obj, "right", path)?, ctx, &format!("{path}.right"), depth + 1, limit)?;
            match (&left, &right) {
                (Value::String(l), Value::String(r)) => Ok(l.contains(r.as_str())),
                (Value::Array(items), _) => Ok(items.contains(&right)),
                _ => Err(type_error("contains requires string or list left", path)),
            }
        }
        "in" | "not_in" => {
            let left = eval_value(operand(obj, "left", path)?, ctx, &format!("{path}.left"), depth + 1, limit)?;
            let right = eval_value(operand(obj, "right", path)?, ctx, &format!("{path}.right"), depth + 1, limit)?;
            let items = right
                .as_array()
                .ok_or_else(|| type_error("right must be list", &format!("{path}.right")))?;
            let found = items.contains(&left);
            Ok(if op == "in" { found } else { !found })
        }
        "exists" | "not_exists" => {
            let found = eval_exists(operand(obj, "left", path)?, ctx, &format!("{path}.left"), depth + 1, limit)?;
            Ok(if op == "exists" { found } else { !found })
        }
        "all" | "any" => {
            let over = eval_value(operand(obj, "over", path)?, ctx, &format!("{path}.over"), depth + 1, limit)?;
            let items = over
                .as_array()
                .ok_or_else(|| type_error("over must be list", &format!("{path}.over")))?;
            let where_node = operand(obj, "where", path)?;
            if !where_node.is_object() {
                return Err(schema("where must be condition", &format!("{path}.where")));
            }
            if items.is_empty() {
                // any([]) is false, all([]) is true.
                return Ok(op == "all");
            }
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                let mut child_ctx = ctx.clone();
                child_ctx.insert("item".to_string(), item.clone());
                results.push(eval_node(where_node, &child_ctx, &format!("{path}.where"), depth + 1, limit)?);
            }
            Ok(if op == "any" {
                results.iter().any(|r| *r)
            } else {
                results.iter().all(|r| *r)
            })
        }
        other => Err(ConditionError::UnknownOp {
            op: other.to_string(),
            path: path.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "job": {"id": "j1", "status": "open", "count": 3},
            "text": "hello world",
            "nums": [1, 2, 3],
            "items": [
                {"status": "ok"},
                {"status": "fail"},
            ],
        })
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        assert!(eval_condition(&json!({"op": "and", "children": []}), &ctx()).unwrap());
        assert!(!eval_condition(&json!({"op": "or", "children": []}), &ctx()).unwrap());
    }

    #[test]
    fn not_negates_single_child() {
        let cond = json!({"op": "not", "children": [
            {"op": "eq", "left": {"literal": 1}, "right": {"literal": 2}}
        ]});
        assert!(eval_condition(&cond, &ctx()).unwrap());
    }

    #[test]
    fn eq_neq_structural() {
        assert!(eval_condition(
            &json!({"op": "eq", "left": {"literal": {"a": [1]}}, "right": {"literal": {"a": [1]}}}),
            &ctx()
        )
        .unwrap());
        assert!(eval_condition(
            &json!({"op": "neq", "left": {"literal": 1}, "right": {"literal": 2}}),
            &ctx()
        )
        .unwrap());
    }

    #[test]
    fn numeric_comparisons() {
        for (op, l, r, expect) in [
            ("gt", 2, 1, true),
            ("gte", 2, 2, true),
            ("lt", 1, 2, true),
            ("lte", 2, 2, true),
            ("gt", 1, 2, false),
        ] {
            let cond = json!({"op": op, "left": {"literal": l}, "right": {"literal": r}});
            assert_eq!(eval_condition(&cond, &ctx()).unwrap(), expect, "{op}");
        }
    }

    #[test]
    fn comparison_requires_numbers() {
        let cond = json!({"op": "gt", "left": {"literal": "a"}, "right": {"literal": "b"}});
        let err = eval_condition(&cond, &ctx()).unwrap_err();
        assert_eq!(err.code(), "CONDITION_TYPE_ERROR");
    }

    #[test]
    fn contains_substring_and_membership() {
        assert!(eval_condition(
            &json!({"op": "contains", "left": {"var": "text"}, "right": {"literal": "world"}}),
            &ctx()
        )
        .unwrap());
        assert!(eval_condition(
            &json!({"op": "contains", "left": {"var": "nums"}, "right": {"literal": 2}}),
            &ctx()
        )
        .unwrap());
        let err = eval_condition(
            &json!({"op": "contains", "left": {"literal": 1}, "right": {"literal": 1}}),
            &ctx(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "CONDITION_TYPE_ERROR");
    }

    #[test]
    fn in_and_not_in() {
        assert!(eval_condition(
            &json!({"op": "in", "left": {"literal": 2}, "right": {"array": [{"literal": 1}, {"literal": 2}]}}),
            &ctx()
        )
        .unwrap());
        assert!(eval_condition(
            &json!({"op": "not_in", "left": {"literal": 3}, "right": {"array": [{"literal": 1}, {"literal": 2}]}}),
            &ctx()
        )
        .unwrap());
        let err = eval_condition(
            &json!({"op": "in", "left": {"literal": 1}, "right": {"literal": 2}}),
            &ctx(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "CONDITION_TYPE_ERROR");
    }

    #[test]
    fn exists_treats_unresolved_as_absent() {
        assert!(eval_condition(&json!({"op": "exists", "left": {"var": "job.id"}}), &ctx()).unwrap());
        assert!(
            eval_condition(&json!({"op": "not_exists", "left": {"var": "missing"}}), &ctx()).unwrap()
        );
    }

    #[test]
    fn all_any_iterate_with_item_binding() {
        let any = json!({
            "op": "any",
            "over": {"var": "items"},
            "where": {"op": "eq", "left": {"var": "item.status"}, "right": {"literal": "fail"}},
        });
        assert!(eval_condition(&any, &ctx()).unwrap());
        let all = json!({
            "op": "all",
            "over": {"var": "items"},
            "where": {"op": "eq", "left": {"var": "item.status"}, "right": {"literal": "ok"}},
        });
        assert!(!eval_condition(&all, &ctx()).unwrap());
    }

    #[test]
    fn empty_iteration_boundaries() {
        let ctx = json!({"items": []});
        let any = json!({"op": "any", "over": {"var": "items"}, "where": {"op": "eq", "left": {"literal": 1}, "right": {"literal": 1}}});
        let all = json!({"op": "all", "over": {"var": "items"}, "where": {"op": "eq", "left": {"literal": 1}, "right": {"literal": 1}}});
        assert!(!eval_condition(&any, &ctx).unwrap());
        assert!(eval_condition(&all, &ctx).unwrap());
    }

    #[test]
    fn depth_limit_is_enforced() {
        let cond = json!({"op": "not", "children": [
            {"op": "not", "children": [
                {"op": "not", "children": [
                    {"op": "eq", "left": {"literal": 1}, "right": {"literal": 1}}
                ]}
            ]}
        ]});
        let err = eval_condition_limited(&cond, &ctx(), 2).unwrap_err();
        assert_eq!(err.code(), "CONDITION_DEPTH_EXCEEDED");
    }

    #[test]
    fn var_resolution_errors_outside_exists() {
        let cond = json!({"op": "eq", "left": {"var": "missing"}, "right": {"literal": 1}});
        let err = eval_condition(&cond, &ctx()).unwrap_err();
        assert_eq!(err.code(), "CONDITION_VAR_UNRESOLVED");
    }

    #[test]
    fn schema_errors() {
        let err = eval_condition(&json!({"op": "and"}), &ctx()).unwrap_err();
        assert_eq!(err.code(), "CONDITION_SCHEMA_ERROR");
        let err = eval_condition(&json!({"op": "mystery"}), &ctx()).unwrap_err();
        assert_eq!(err.code(), "CONDITION_UNKNOWN_OP");
    }
}
