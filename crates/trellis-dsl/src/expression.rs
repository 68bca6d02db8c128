use serde_json::{Map, Value};
use thiserror::Error;

use crate::condition::{self, ConditionError, DEFAULT_DEPTH_LIMIT};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("{message} (path={path})")]
    Schema { message: String, path: String },
    #[error("depth limit exceeded (path={path})")]
    Depth { path: String },
    #[error("unresolved var: {name} (path={path})")]
    VarUnresolved { name: String, path: String },
    #[error("{message} (path={path})")]
    Type { message: String, path: String },
    #[error("unknown expr: {expr} (path={path})")]
    Unknown { expr: String, path: String },
    #[error("condition error: {condition_code} (path={path})")]
    Condition { condition_code: String, path: String },
}

impl ExpressionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExpressionError::Schema { .. } => "EXPR_SCHEMA_ERROR",
            ExpressionError::Depth { .. } => "EXPR_DEPTH_EXCEEDED",
            ExpressionError::VarUnresolved { .. } => "EXPR_VAR_UNRESOLVED",
            ExpressionError::Type { .. } => "EXPR_TYPE_ERROR",
            ExpressionError::Unknown { .. } => "EXPR_UNKNOWN",
            ExpressionError::Condition { .. } => "EXPR_CONDITION_ERROR",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ExpressionError::Schema { path, .. }
            | ExpressionError::Depth { path }
            | ExpressionError::VarUnresolved { path, .. }
            | ExpressionError::Type { path, .. }
            | ExpressionError::Unknown { path, .. }
            | ExpressionError::Condition { path, .. } => path,
        }
    }
}

fn schema(message: impl Into<String>, path: &str) -> ExpressionError {
    ExpressionError::Schema {
        message: message.into(),
        path: path.to_string(),
    }
}

fn check_depth(depth: usize, limit: usize, path: &str) -> Result<(), ExpressionError> {
    if depth > limit {
        Err(ExpressionError::Depth {
            path: path.to_string(),
        })
    } else {
        Ok(())
    }
}

fn resolve_var<'a>(
    ctx: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<&'a Value, ExpressionError> {
    let unresolved = || ExpressionError::VarUnresolved {
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

fn ensure_finite(value: &Value, path: &str) -> Result<(), ExpressionError> {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(ExpressionError::Type {
                        message: "non-finite number".to_string(),
                        path: path.to_string(),
                    });
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                ensure_finite(item, &format!("{path}[{idx}]"))?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                ensure_finite(item, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Evaluate an expression against a context object with the default depth
/// limit.
pub fn eval_expression(expr: &Value, ctx: &Value) -> Result<Value, ExpressionError> {
    eval_expression_limited(expr, ctx, DEFAULT_DEPTH_LIMIT)
}

pub fn eval_expression_limited(
    expr: &Value,
    ctx: &Value,
    depth_limit: usize,
) -> Result<Value, ExpressionError> {
    let ctx_obj = ctx
        .as_object()
        .ok_or_else(|| schema("ctx must be object", "$"))?;
    eval_node(expr, ctx_obj, ctx, "$", 1, depth_limit)
}

fn eval_node(
    expr: &Value,
    ctx: &Map<String, Value>,
    ctx_value: &Value,
    path: &str,
    depth: usize,
    limit: usize,
) -> Result<Value, ExpressionError> {
    check_depth(depth, limit, path)?;
    let obj = expr
        .as_object()
        .ok_or_else(|| schema("expression must be object", path))?;

    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();

    if keys == ["literal"] {
        let value = obj.get("literal").cloned().unwrap_or(Value::Null);
        ensure_finite(&value, path)?;
        return Ok(value);
    }

    if keys == ["var"] {
        let name = obj
            .get("var")
            .and_then(Value::as_str)
            .ok_or_else(|| schema("var must be string", path))?;
        let value = resolve_var(ctx, name, path)?.clone();
        ensure_finite(&value, path)?;
        return Ok(value);
    }

    if let Some(expr_type) = obj.get("expr") {
        let expr_type = expr_type.as_str().unwrap_or_default();
        match expr_type {
            "coalesce" => {
                let mut sorted = keys.clone();
                sorted.sort_unstable();
                if sorted != ["args", "expr"] {
                    return Err(schema("coalesce has invalid keys", path));
                }
                let args = obj
                    .get("args")
                    .and_then(Value::as_array)
                    .filter(|args| !args.is_empty())
                    .ok_or_else(|| schema("args must be non-empty list", &format!("{path}.args")))?;
                for (idx, arg) in args.iter().enumerate() {
                    let arg_path = format!("{path}.args[{idx}]");
                    let value = eval_node(arg, ctx, ctx_value, &arg_path, depth + 1, limit)?;
                    ensure_finite(&value, &arg_path)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            "case" => {
                if keys
                    .iter()
                    .any(|k| !matches!(*k, "expr" | "cases" | "else"))
                {
                    return Err(schema("case has invalid keys", path));
                }
                let cases = obj
                    .get("cases")
                    .and_then(Value::as_array)
                    .filter(|cases| !cases.is_empty())
                    .ok_or_else(|| schema("cases must be non-empty list", &format!("{path}.cases")))?;
                for (idx, case) in cases.iter().enumerate() {
                    let case_path = format!("{path}.cases[{idx}]");
                    let case_obj = case.as_object().filter(|c| {
                        let mut case_keys: Vec<&str> = c.keys().map(String::as_str).collect();
                        case_keys.sort_unstable();
                        case_keys == ["then", "when"]
                    });
                    let case_obj = case_obj.ok_or_else(|| {
                        schema("case items require when and then", &case_path)
                    })?;
                    let when = case_obj.get("when").unwrap_or(&Value::Null);
                    let when_path = format!("{case_path}.when");
                    // The condition evaluation inherits whatever depth budget
                    // remains at this node.
                    let remaining = (limit + 1).checked_sub(depth).unwrap_or(0);
                    if remaining < 1 {
                        return Err(ExpressionError::Depth { path: when_path });
                    }
                    let matched = condition::eval_condition_limited(when, ctx_value, remaining)
                        .map_err(|err: ConditionError| ExpressionError::Condition {
                            condition_code: err.code().to_string(),
                            path: when_path.clone(),
                        })?;
                    if matched {
                        let then_path = format!("{case_path}.then");
                        let value = eval_node(
                            case_obj.get("then").unwrap_or(&Value::Null),
                            ctx,
                            ctx_value,
                            &then_path,
                            depth + 1,
                            limit,
                        )?;
                        ensure_finite(&value, &then_path)?;
                        return Ok(value);
                    }
                }
                if let Some(else_branch) = obj.get("else") {
                    let else_path = format!("{path}.else");
                    let value = eval_node(else_branch, ctx, ctx_value, &else_path, depth + 1, limit)?;
                    ensure_finite(&value, &else_path)?;
                    return Ok(value);
                }
                Ok(Value::Null)
            }
            other => Err(ExpressionError::Unknown {
                expr: other.to_string(),
                path: path.to_string(),
            }),
        }
    } else {
        Err(schema("invalid expression shape", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({"job": {"id": "j1"}, "x": null})
    }

    #[test]
    fn literal_round_trips() {
        assert_eq!(
            eval_expression(&json!({"literal": {"a": 1}}), &ctx()).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn var_resolves_dotted_paths() {
        assert_eq!(eval_expression(&json!({"var": "job.id"}), &ctx()).unwrap(), json!("j1"));
        let err = eval_expression(&json!({"var": "job.missing"}), &ctx()).unwrap_err();
        assert_eq!(err.code(), "EXPR_VAR_UNRESOLVED");
    }

    #[test]
    fn coalesce_returns_first_non_null() {
        let expr = json!({"expr": "coalesce", "args": [{"var": "x"}, {"literal": 0}]});
        assert_eq!(eval_expression(&expr, &ctx()).unwrap(), json!(0));
    }

    #[test]
    fn coalesce_requires_args() {
        let err = eval_expression(&json!({"expr": "coalesce", "args": []}), &ctx()).unwrap_err();
        assert_eq!(err.code(), "EXPR_SCHEMA_ERROR");
    }

    #[test]
    fn case_returns_first_matching_then() {
        let expr = json!({
            "expr": "case",
            "cases": [
                {"when": {"op": "eq", "left": {"literal": 1}, "right": {"literal": 2}}, "then": {"literal": "no"}},
                {"when": {"op": "eq", "left": {"literal": 1}, "right": {"literal": 1}}, "then": {"literal": "yes"}},
            ],
            "else": {"literal": "fallback"},
        });
        assert_eq!(eval_expression(&expr, &ctx()).unwrap(), json!("yes"));
    }

    #[test]
    fn case_without_match_or_else_is_null() {
        let expr = json!({
            "expr": "case",
            "cases": [
                {"when": {"op": "eq", "left": {"literal": 1}, "right": {"literal": 2}}, "then": {"literal": "no"}},
            ],
        });
        assert_eq!(eval_expression(&expr, &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn condition_errors_are_wrapped() {
        let expr = json!({
            "expr": "case",
            "cases": [
                {"when": {"op": "eq", "left": {"var": "missing"}, "right": {"literal": 1}}, "then": {"literal": "no"}},
            ],
        });
        let err = eval_expression(&expr, &ctx()).unwrap_err();
        assert_eq!(err.code(), "EXPR_CONDITION_ERROR");
    }

    #[test]
    fn depth_limit_applies_to_nesting() {
        let expr = json!({"expr": "coalesce", "args": [{"expr": "coalesce", "args": [{"literal": 1}]}]});
        let err = eval_expression_limited(&expr, &ctx(), 1).unwrap_err();
        assert_eq!(err.code(), "EXPR_DEPTH_EXCEEDED");
    }

    #[test]
    fn extra_keys_are_rejected() {
        let err = eval_expression(&json!({"literal": 1, "extra": 2}), &ctx()).unwrap_err();
        assert_eq!(err.code(), "EXPR_SCHEMA_ERROR");
        let err = eval_expression(&json!({"expr": "coalesce", "args": [{"literal": 1}], "bonus": 1}), &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "EXPR_SCHEMA_ERROR");
    }

    #[test]
    fn unknown_expr_kind() {
        let err = eval_expression(&json!({"expr": "sum", "args": []}), &ctx()).unwrap_err();
        assert_eq!(err.code(), "EXPR_UNKNOWN");
    }
}
