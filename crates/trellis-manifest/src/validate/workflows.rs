//! Workflow definitions: state machines cross-checked against their entity.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    EntityMap, Vctx, entity_lookup, field_ids, find_field, get, get_str, nonempty_str,
    reject_unknown_keys,
};
use crate::catalog::{
    ALLOWED_WORKFLOW_KEYS, ALLOWED_WORKFLOW_STATE_KEYS, ALLOWED_WORKFLOW_TRANSITION_KEYS,
};

/// Index workflows by their declared entity id, used by the statusbar
/// cross-check in views.
pub(crate) fn workflows_by_entity(manifest: &Value) -> BTreeMap<String, &Value> {
    let mut map = BTreeMap::new();
    if let Some(Value::Array(workflows)) = get(manifest, "workflows") {
        for wf in workflows {
            if let Some(entity) = get_str(wf, "entity") {
                map.insert(entity.to_string(), wf);
            }
        }
    }
    map
}

pub(crate) fn check_workflows(cx: &mut Vctx, manifest: &Value, entities: &EntityMap<'_>) {
    let workflows = match get(manifest, "workflows") {
        Some(Value::Array(workflows)) => workflows.as_slice(),
        Some(other) if super::truthy(other) => {
            cx.error("MANIFEST_WORKFLOWS_INVALID", "workflows must be a list", "workflows");
            &[]
        }
        _ => &[],
    };

    for (widx, workflow) in workflows.iter().enumerate() {
        let wpath = format!("workflows[{widx}]");
        if !workflow.is_object() {
            cx.error("MANIFEST_WORKFLOW_INVALID", "workflow must be an object", wpath);
            continue;
        }
        reject_unknown_keys(cx, workflow, ALLOWED_WORKFLOW_KEYS, &wpath);
        if nonempty_str(workflow, "id").is_none() {
            cx.error("MANIFEST_WORKFLOW_ID_INVALID", "workflow.id is required", format!("{wpath}.id"));
        }
        let entity_id = match nonempty_str(workflow, "entity") {
            Some(entity_id) => entity_id,
            None => {
                cx.error(
                    "MANIFEST_WORKFLOW_ENTITY_INVALID",
                    "workflow.entity is required",
                    format!("{wpath}.entity"),
                );
                continue;
            }
        };
        let entity_obj = match entity_lookup(entities, entity_id) {
            Some(entity_obj) => entity_obj,
            None => {
                cx.error(
                    "MANIFEST_WORKFLOW_ENTITY_UNKNOWN",
                    "workflow entity not found",
                    format!("{wpath}.entity"),
                );
                continue;
            }
        };

        match nonempty_str(workflow, "status_field") {
            None => {
                cx.error(
                    "MANIFEST_WORKFLOW_STATUS_FIELD_INVALID",
                    "workflow.status_field is required",
                    format!("{wpath}.status_field"),
                );
            }
            Some(status_field) => {
                if !field_ids(entity_obj).contains(status_field) {
                    cx.error(
                        "MANIFEST_WORKFLOW_STATUS_FIELD_UNKNOWN",
                        "workflow.status_field not found on entity",
                        format!("{wpath}.status_field"),
                    );
                } else {
                    let ftype = find_field(entity_obj, status_field)
                        .and_then(|f| get_str(f, "type"))
                        .unwrap_or_default();
                    if !matches!(ftype, "enum" | "string") {
                        cx.warn(
                            "MANIFEST_WORKFLOW_STATUS_FIELD_TYPE",
                            "workflow status_field should be enum or string",
                            format!("{wpath}.status_field"),
                        );
                    }
                }
            }
        }

        let states = match get(workflow, "states").and_then(Value::as_array).filter(|s| !s.is_empty())
        {
            Some(states) => states.as_slice(),
            None => {
                cx.error(
                    "MANIFEST_WORKFLOW_STATES_INVALID",
                    "workflow.states must be a non-empty list",
                    format!("{wpath}.states"),
                );
                &[]
            }
        };
        let mut state_ids: Vec<&str> = Vec::new();
        for (sidx, state) in states.iter().enumerate() {
            let spath = format!("{wpath}.states[{sidx}]");
            if !state.is_object() {
                cx.error("MANIFEST_WORKFLOW_STATE_INVALID", "state must be an object", spath);
                continue;
            }
            reject_unknown_keys(cx, state, ALLOWED_WORKFLOW_STATE_KEYS, &spath);
            match nonempty_str(state, "id") {
                None => {
                    cx.error(
                        "MANIFEST_WORKFLOW_STATE_ID_INVALID",
                        "state.id is required",
                        format!("{spath}.id"),
                    );
                }
                Some(sid) => state_ids.push(sid),
            }
            if let Some(required_fields) = get(state, "required_fields").filter(|v| !v.is_null()) {
                match required_fields.as_array() {
                    None => {
                        cx.error(
                            "MANIFEST_WORKFLOW_REQUIRED_FIELDS_INVALID",
                            "state.required_fields must be a list",
                            format!("{spath}.required_fields"),
                        );
                    }
                    Some(fields) => {
                        for (fidx, fid) in fields.iter().enumerate() {
                            if let Some(fid) = fid.as_str() {
                                if !field_ids(entity_obj).contains(fid) {
                                    cx.error(
                                        "MANIFEST_WORKFLOW_REQUIRED_FIELD_UNKNOWN",
                                        "required field not found on entity",
                                        format!("{spath}.required_fields[{fidx}]"),
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }

        let unique: BTreeSet<&&str> = state_ids.iter().collect();
        if unique.len() != state_ids.len() {
            cx.error(
                "MANIFEST_WORKFLOW_STATE_DUPLICATE",
                "state.id values must be unique",
                format!("{wpath}.states"),
            );
        }

        let transitions = match get(workflow, "transitions") {
            None | Some(Value::Null) => &[] as &[Value],
            Some(Value::Array(transitions)) => transitions,
            Some(_) => {
                cx.error(
                    "MANIFEST_WORKFLOW_TRANSITIONS_INVALID",
                    "workflow.transitions must be a list",
                    format!("{wpath}.transitions"),
                );
                &[]
            }
        };
        for (tidx, transition) in transitions.iter().enumerate() {
            let tpath = format!("{wpath}.transitions[{tidx}]");
            if !transition.is_object() {
                cx.error(
                    "MANIFEST_WORKFLOW_TRANSITION_INVALID",
                    "transition must be an object",
                    tpath,
                );
                continue;
            }
            reject_unknown_keys(cx, transition, ALLOWED_WORKFLOW_TRANSITION_KEYS, &tpath);
            let from_state = get_str(transition, "from");
            let to_state = get_str(transition, "to");
            let (from_state, to_state) = match (from_state, to_state) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    cx.error(
                        "MANIFEST_WORKFLOW_TRANSITION_INVALID",
                        "transition from/to required",
                        tpath,
                    );
                    continue;
                }
            };
            if !state_ids.contains(&from_state) {
                cx.error(
                    "MANIFEST_WORKFLOW_TRANSITION_UNKNOWN",
                    "transition.from must reference a state",
                    format!("{tpath}.from"),
                );
            }
            if !state_ids.contains(&to_state) {
                cx.error(
                    "MANIFEST_WORKFLOW_TRANSITION_UNKNOWN",
                    "transition.to must reference a state",
                    format!("{tpath}.to"),
                );
            }
        }

        if let Some(required_map) = get(workflow, "required_fields_by_state").filter(|v| !v.is_null())
        {
            match required_map.as_object() {
                None => {
                    cx.error(
                        "MANIFEST_WORKFLOW_REQUIRED_MAP_INVALID",
                        "required_fields_by_state must be a map",
                        format!("{wpath}.required_fields_by_state"),
                    );
                }
                Some(required_map) => {
                    for (key, fields) in required_map {
                        if !state_ids.contains(&key.as_str()) {
                            cx.error(
                                "MANIFEST_WORKFLOW_REQUIRED_MAP_UNKNOWN",
                                "required_fields_by_state key must be a state id",
                                format!("{wpath}.required_fields_by_state.{key}"),
                            );
                        }
                        let fields = match fields.as_array() {
                            None => {
                                cx.error(
                                    "MANIFEST_WORKFLOW_REQUIRED_MAP_INVALID",
                                    "required_fields_by_state values must be lists",
                                    format!("{wpath}.required_fields_by_state.{key}"),
                                );
                                continue;
                            }
                            Some(fields) => fields,
                        };
                        for (fidx, fid) in fields.iter().enumerate() {
                            if let Some(fid) = fid.as_str() {
                                if !field_ids(entity_obj).contains(fid) {
                                    cx.error(
                                        "MANIFEST_WORKFLOW_REQUIRED_FIELD_UNKNOWN",
                                        "required field not found on entity",
                                        format!("{wpath}.required_fields_by_state.{key}[{fidx}]"),
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
