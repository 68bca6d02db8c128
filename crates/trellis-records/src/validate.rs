use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use uuid::Uuid;

use trellis_core::Issue;
use trellis_dsl::eval_manifest_condition;
use trellis_registry::ModuleRegistry;
use trellis_store::{StoreBackend, StoreResult};

use crate::entities::find_entity_def;

fn field_list(entity: &Value) -> Vec<Value> {
    match entity.get("fields") {
        Some(Value::Array(fields)) => fields.clone(),
        Some(Value::Object(fields)) => fields
            .iter()
            .map(|(field_id, field_def)| {
                let mut item = Map::new();
                item.insert("id".to_string(), Value::String(field_id.clone()));
                if let Value::Object(def) = field_def {
                    for (key, value) in def {
                        item.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(item)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn enum_values(field: &Value) -> Vec<Value> {
    let options = field
        .get("options")
        .filter(|v| !v.is_null())
        .or_else(|| field.get("values"))
        .and_then(Value::as_array);
    options
        .map(|options| {
            options
                .iter()
                .map(|opt| opt.get("value").unwrap_or(opt).clone())
                .collect()
        })
        .unwrap_or_default()
}

fn is_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn apply_defaults(fields: &[Value], data: &mut Map<String, Value>) {
    for field in fields {
        let field_id = match field.get("id").and_then(Value::as_str) {
            Some(field_id) => field_id,
            None => continue,
        };
        let default = match field.get("default") {
            Some(default) => default,
            None => continue,
        };
        if !is_missing(data.get(field_id)) {
            continue;
        }
        data.insert(field_id.to_string(), default.clone());
    }
}

/// De-duplicated required fields for a workflow state: the state's own
/// `required_fields` plus the workflow-level `required_fields_by_state`
/// entry, in declaration order.
fn workflow_required_fields(workflow: &Value, status_value: Option<&str>) -> Vec<String> {
    let status_value = match status_value {
        Some(status_value) => status_value,
        None => return Vec::new(),
    };
    let mut required: Vec<String> = Vec::new();
    if let Some(states) = workflow.get("states").and_then(Value::as_array) {
        for state in states {
            if state.get("id").and_then(Value::as_str) != Some(status_value) {
                continue;
            }
            if let Some(fields) = state.get("required_fields").and_then(Value::as_array) {
                required.extend(fields.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }
    }
    if let Some(map) = workflow.get("required_fields_by_state").and_then(Value::as_object) {
        if let Some(fields) = map.get(status_value).and_then(Value::as_array) {
            required.extend(fields.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    let mut seen = std::collections::BTreeSet::new();
    required.retain(|field| seen.insert(field.clone()));
    required
}

fn required_when_applies(field: &Value, data: &Map<String, Value>) -> bool {
    match field.get("required_when").filter(|v| !v.is_null()) {
        Some(condition) => {
            let ctx = serde_json::json!({"record": Value::Object(data.clone())});
            eval_manifest_condition(condition, &ctx)
        }
        None => false,
    }
}

/// Validate a record payload against an entity definition. On create,
/// defaults are applied first and returned with the cleaned data.
pub fn validate_record_payload(
    entity: &Value,
    data: &Value,
    for_create: bool,
    workflow: Option<&Value>,
) -> (Vec<Issue>, Value) {
    let mut errors: Vec<Issue> = Vec::new();
    let mut data = match data.as_object() {
        Some(data) => data.clone(),
        None => {
            errors.push(Issue::new("INVALID_PAYLOAD", "record data must be an object"));
            return (errors, Value::Object(Map::new()));
        }
    };

    let fields = field_list(entity);
    let field_by_id: Map<String, Value> = fields
        .iter()
        .filter_map(|f| {
            f.get("id")
                .and_then(Value::as_str)
                .map(|id| (id.to_string(), f.clone()))
        })
        .collect();

    for key in data.keys() {
        if key == "id" {
            continue;
        }
        if !field_by_id.contains_key(key) {
            errors.push(Issue::at("UNKNOWN_FIELD", format!("unknown field: {key}"), key.clone()));
        }
    }

    if for_create {
        apply_defaults(&fields, &mut data);
        for (field_id, field) in &field_by_id {
            let required = field.get("required").map(truthy).unwrap_or(false);
            if required && is_missing(data.get(field_id)) {
                errors.push(Issue::at(
                    "REQUIRED_FIELD",
                    format!("missing required field: {field_id}"),
                    field_id.clone(),
                ));
            }
            if required_when_applies(field, &data) && is_missing(data.get(field_id)) {
                errors.push(Issue::at(
                    "REQUIRED_FIELD",
                    format!("missing required field: {field_id}"),
                    field_id.clone(),
                ));
            }
        }
    }

    if let Some(workflow) = workflow {
        let status_field = workflow.get("status_field").and_then(Value::as_str);
        let status_value = status_field.and_then(|sf| data.get(sf)).and_then(Value::as_str);
        if let (Some(status_field), Some(status_value)) = (status_field, status_value) {
            let states: Vec<&str> = workflow
                .get("states")
                .and_then(Value::as_array)
                .map(|states| {
                    states
                        .iter()
                        .filter_map(|s| s.get("id").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            if !states.contains(&status_value) {
                errors.push(Issue::at(
                    "INVALID_STATUS",
                    format!("{status_field} must be one of {states:?}"),
                    status_field,
                ));
            }
        }
        for field_id in workflow_required_fields(workflow, status_value) {
            if is_missing(data.get(&field_id)) {
                errors.push(Issue::at(
                    "REQUIRED_FIELD",
                    format!(
                        "missing required field for status {}: {field_id}",
                        status_value.unwrap_or_default()
                    ),
                    field_id.clone(),
                ));
            }
        }
    }

    if !for_create {
        for (field_id, field) in &field_by_id {
            if required_when_applies(field, &data) && is_missing(data.get(field_id)) {
                errors.push(Issue::at(
                    "REQUIRED_FIELD",
                    format!("missing required field: {field_id}"),
                    field_id.clone(),
                ));
            }
        }
    }

    for (field_id, value) in &data {
        if field_id == "id" || value.is_null() {
            continue;
        }
        let field = match field_by_id.get(field_id) {
            Some(field) => field,
            None => continue,
        };
        let ftype = field.get("type").and_then(Value::as_str).unwrap_or_default();
        check_field_type(&mut errors, field_id, ftype, value, field);
    }

    (errors, Value::Object(data))
}

fn check_field_type(errors: &mut Vec<Issue>, field_id: &str, ftype: &str, value: &Value, field: &Value) {
    let mismatch = |errors: &mut Vec<Issue>, expected: &str| {
        errors.push(Issue::at(
            "TYPE_MISMATCH",
            format!("{field_id} must be {expected}"),
            field_id,
        ));
    };
    match ftype {
        "string" | "text" => {
            if !value.is_string() {
                mismatch(errors, "a string");
            }
        }
        "number" => {
            if !value.is_number() {
                mismatch(errors, "a number");
            }
        }
        "bool" | "boolean" => {
            if !value.is_boolean() {
                mismatch(errors, "a boolean");
            }
        }
        "enum" => {
            let allowed = enum_values(field);
            if !allowed.contains(value) {
                errors.push(Issue::at(
                    "INVALID_ENUM",
                    format!("{field_id} must be one of {allowed:?}"),
                    field_id,
                ));
            }
        }
        "date" => match value.as_str() {
            None => mismatch(errors, "a date string"),
            Some(raw) => {
                if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
                    errors.push(Issue::at(
                        "INVALID_DATE",
                        format!("{field_id} must be YYYY-MM-DD"),
                        field_id,
                    ));
                }
            }
        },
        "datetime" => match value.as_str() {
            None => mismatch(errors, "a datetime string"),
            Some(raw) => {
                let parses = DateTime::parse_from_rfc3339(raw).is_ok()
                    || raw.parse::<NaiveDateTime>().is_ok();
                if !parses {
                    errors.push(Issue::at(
                        "INVALID_DATETIME",
                        format!("{field_id} must be ISO8601"),
                        field_id,
                    ));
                }
            }
        },
        "uuid" => {
            if !value.as_str().map(is_uuid).unwrap_or(false) {
                mismatch(errors, "a UUID");
            }
        }
        "lookup" => {
            if !value.is_string() {
                mismatch(errors, "a string");
            }
        }
        "tags" => {
            if !value.is_array() {
                mismatch(errors, "a list");
            }
        }
        // Unknown types are left to the manifest validator.
        _ => {}
    }
}

/// Cross-module lookup integrity: every lookup field must point at an
/// entity of an enabled module and name a real display field on it.
pub fn validate_lookup_fields<B: StoreBackend>(
    entity: &Value,
    registry: &ModuleRegistry<B>,
) -> StoreResult<Vec<Issue>> {
    let mut errors: Vec<Issue> = Vec::new();
    for field in field_list(entity) {
        if field.get("type").and_then(Value::as_str) != Some("lookup") {
            continue;
        }
        let field_id = field.get("id").and_then(Value::as_str).unwrap_or_default();
        let target = field.get("entity").and_then(Value::as_str).filter(|s| !s.is_empty());
        let display = field
            .get("display_field")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let target = match target {
            Some(target) => target,
            None => {
                errors.push(Issue::at(
                    "LOOKUP_TARGET_MISSING",
                    "lookup target entity is required",
                    field_id,
                ));
                continue;
            }
        };
        let display = match display {
            Some(display) => display,
            None => {
                errors.push(Issue::at(
                    "LOOKUP_DISPLAY_MISSING",
                    "lookup display_field is required",
                    field_id,
                ));
                continue;
            }
        };
        let found = find_entity_def(registry, target)?;
        let (_, target_entity, _) = match found {
            Some(found) => found,
            None => {
                errors.push(Issue::at(
                    "LOOKUP_TARGET_UNKNOWN",
                    "lookup target entity not found or disabled",
                    field_id,
                ));
                continue;
            }
        };
        let known = field_list(&target_entity)
            .iter()
            .any(|f| f.get("id").and_then(Value::as_str) == Some(display));
        if !known {
            errors.push(Issue::at(
                "LOOKUP_DISPLAY_UNKNOWN",
                "lookup display_field not found on target entity",
                field_id,
            ));
        }
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_entity() -> Value {
        json!({
            "id": "entity.job",
            "fields": [
                {"id": "job.status", "type": "enum", "options": ["lead", "install"]},
                {"id": "job.title", "type": "string"},
                {"id": "job.count", "type": "number"},
                {"id": "job.active", "type": "bool"},
                {"id": "job.install_date", "type": "date"},
                {"id": "job.updated", "type": "datetime"},
                {"id": "job.ref", "type": "uuid"},
                {"id": "job.tags", "type": "tags"},
            ],
        })
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let (errors, _) =
            validate_record_payload(&job_entity(), &json!({"job.other": 1}), false, None);
        assert_eq!(errors[0].code, "UNKNOWN_FIELD");
    }

    #[test]
    fn id_key_is_exempt() {
        let (errors, _) = validate_record_payload(&job_entity(), &json!({"id": "r1"}), false, None);
        assert_eq!(errors, vec![]);
    }

    #[test]
    fn defaults_apply_on_create() {
        let entity = json!({
            "id": "entity.item",
            "fields": [{"id": "item.name", "type": "string", "required": true, "default": "hello"}],
        });
        let (errors, clean) = validate_record_payload(&entity, &json!({}), true, None);
        assert_eq!(errors, vec![]);
        assert_eq!(clean["item.name"], json!("hello"));
    }

    #[test]
    fn required_fields_enforced_on_create() {
        let entity = json!({
            "id": "entity.item",
            "fields": [{"id": "item.name", "type": "string", "required": true}],
        });
        let (errors, _) = validate_record_payload(&entity, &json!({}), true, None);
        assert_eq!(errors[0].code, "REQUIRED_FIELD");
    }

    #[test]
    fn required_when_enforced_against_record_context() {
        let entity = json!({
            "id": "entity.test",
            "fields": [
                {"id": "test.status", "type": "enum", "options": [
                    {"label": "Open", "value": "open"}, {"label": "Done", "value": "done"},
                ]},
                {
                    "id": "test.conditional",
                    "type": "string",
                    "required_when": {"op": "eq", "field": "test.status", "value": "done"},
                },
            ],
        });
        let (errors, _) =
            validate_record_payload(&entity, &json!({"test.status": "done"}), true, None);
        assert!(errors.iter().any(|e| e.code == "REQUIRED_FIELD"));

        let (errors, _) =
            validate_record_payload(&entity, &json!({"test.status": "open"}), true, None);
        assert_eq!(errors, vec![]);
    }

    #[test]
    fn type_checks_cover_each_field_type() {
        let bad = json!({
            "job.title": 5,
            "job.count": "three",
            "job.active": "yes",
            "job.install_date": "01/02/2026",
            "job.updated": "not-a-time",
            "job.ref": "not-a-uuid",
            "job.tags": "a,b",
        });
        let (errors, _) = validate_record_payload(&job_entity(), &bad, false, None);
        let codes: Vec<&str> = errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes.iter().filter(|c| **c == "TYPE_MISMATCH").count(), 5);
        assert!(codes.contains(&"INVALID_DATE"));
        assert!(codes.contains(&"INVALID_DATETIME"));
    }

    #[test]
    fn valid_values_pass_type_checks() {
        let good = json!({
            "job.status": "lead",
            "job.title": "Install",
            "job.count": 3,
            "job.active": true,
            "job.install_date": "2026-02-01",
            "job.updated": "2026-02-01T10:00:00Z",
            "job.ref": "8f9c6f9e-54a4-4c6b-9c62-7992a1f1d3b1",
            "job.tags": ["roof"],
        });
        let (errors, _) = validate_record_payload(&job_entity(), &good, false, None);
        assert_eq!(errors, vec![]);
    }

    #[test]
    fn enum_values_accept_plain_and_object_options() {
        let (errors, _) = validate_record_payload(
            &job_entity(),
            &json!({"job.status": "unknown"}),
            false,
            None,
        );
        assert_eq!(errors[0].code, "INVALID_ENUM");
    }

    #[test]
    fn workflow_status_must_reference_a_state() {
        let workflow = json!({
            "id": "job_flow",
            "entity": "entity.job",
            "status_field": "job.status",
            "states": [{"id": "lead"}, {"id": "install"}],
        });
        let (errors, _) = validate_record_payload(
            &job_entity(),
            &json!({"job.status": "lead"}),
            false,
            Some(&workflow),
        );
        assert_eq!(errors, vec![]);

        let entity_loose = json!({
            "id": "entity.job",
            "fields": [{"id": "job.status", "type": "string"}],
        });
        let (errors, _) = validate_record_payload(
            &entity_loose,
            &json!({"job.status": "shipped"}),
            false,
            Some(&workflow),
        );
        assert_eq!(errors[0].code, "INVALID_STATUS");
    }

    #[test]
    fn workflow_state_required_fields_are_enforced() {
        let workflow = json!({
            "id": "job_flow",
            "entity": "entity.job",
            "status_field": "job.status",
            "states": [
                {"id": "lead"},
                {"id": "install", "required_fields": ["job.install_date"]},
            ],
        });
        let (errors, _) = validate_record_payload(
            &job_entity(),
            &json!({"job.status": "install", "job.title": "A"}),
            false,
            Some(&workflow),
        );
        assert!(errors.iter().any(|e| e.code == "REQUIRED_FIELD"));
    }

    #[test]
    fn required_fields_by_state_map_also_applies() {
        let workflow = json!({
            "id": "job_flow",
            "entity": "entity.job",
            "status_field": "job.status",
            "states": [{"id": "lead"}, {"id": "install"}],
            "required_fields_by_state": {"install": ["job.install_date"]},
        });
        let (errors, _) = validate_record_payload(
            &job_entity(),
            &json!({"job.status": "install"}),
            false,
            Some(&workflow),
        );
        assert!(errors.iter().any(|e| e.code == "REQUIRED_FIELD"));
    }
}
