//! Actions, modals, and triggers.

use serde_json::Value;

use super::{
    ActionMap, EntityMap, Vctx, entity_known, get, get_str, nonempty_str, parse_target,
    reject_unknown_keys, validate_condition,
};
use crate::catalog::{
    ALLOWED_V1_ACTION_KEYS, ALLOWED_V1_ACTION_KINDS, ALLOWED_V1_MODAL_ACTION_KEYS,
    ALLOWED_V1_MODAL_KEYS, ALLOWED_V1_TRIGGER_EVENTS, ALLOWED_V1_TRIGGER_KEYS,
};

fn check_gated_condition(cx: &mut Vctx, holder: &Value, key: &str, code: &str, path: &str) {
    if let Some(cond) = get(holder, key).filter(|v| !v.is_null()) {
        if !cx.conditions_allowed() {
            cx.error(
                code,
                &format!("{key} requires manifest_version >= 1.2"),
                format!("{path}.{key}"),
            );
        } else {
            validate_condition(cx, cond, &format!("{path}.{key}"), 0);
        }
    }
}

pub(crate) fn check_actions<'a>(cx: &mut Vctx, manifest: &'a Value) -> ActionMap<'a> {
    let mut action_by_id = ActionMap::new();
    let actions = match get(manifest, "actions") {
        None | Some(Value::Null) => return action_by_id,
        Some(Value::Array(actions)) => actions,
        Some(_) => {
            cx.error("MANIFEST_ACTIONS_INVALID", "actions must be a list", "actions");
            return action_by_id;
        }
    };

    for (aidx, action) in actions.iter().enumerate() {
        let apath = format!("actions[{aidx}]");
        if !action.is_object() {
            cx.error("MANIFEST_ACTION_INVALID", "action must be an object", apath);
            continue;
        }
        reject_unknown_keys(cx, action, ALLOWED_V1_ACTION_KEYS, &apath);
        let action_id = match nonempty_str(action, "id") {
            Some(id) => id,
            None => {
                cx.error("MANIFEST_ACTION_ID_INVALID", "action.id is required", format!("{apath}.id"));
                continue;
            }
        };
        action_by_id.insert(action_id.to_string(), action);

        let kind = get_str(action, "kind").unwrap_or_default();
        if !ALLOWED_V1_ACTION_KINDS.contains(&kind) {
            cx.error(
                "MANIFEST_ACTION_KIND_INVALID",
                "action.kind must be allowlisted",
                format!("{apath}.kind"),
            );
        }
        if let Some(label) = get(action, "label") {
            if !label.is_null() && !label.is_string() {
                cx.error(
                    "MANIFEST_ACTION_LABEL_INVALID",
                    "action.label must be string",
                    format!("{apath}.label"),
                );
            }
        }

        match kind {
            "navigate" => {
                let ok = get_str(action, "target")
                    .map(|t| parse_target(t).is_some())
                    .unwrap_or(false);
                if !ok {
                    cx.error(
                        "MANIFEST_TARGET_INVALID",
                        "navigate target must be page:<id> or view:<id>",
                        format!("{apath}.target"),
                    );
                }
            }
            "open_form" => {
                let target = get_str(action, "target");
                let bare_view = target
                    .map(|t| !t.starts_with("page:") && !t.starts_with("view:"))
                    .unwrap_or(false);
                if !bare_view {
                    cx.error(
                        "MANIFEST_ACTION_INVALID",
                        "open_form target must be a view id",
                        format!("{apath}.target"),
                    );
                }
            }
            "refresh" => {
                if get(action, "target").filter(|v| !v.is_null()).is_some() {
                    cx.error(
                        "MANIFEST_ACTION_INVALID",
                        "refresh must not include target",
                        format!("{apath}.target"),
                    );
                }
            }
            _ => {}
        }
        if matches!(kind, "create_record" | "update_record" | "bulk_update")
            && nonempty_str(action, "entity_id").is_none()
        {
            cx.error(
                "MANIFEST_ACTION_INVALID",
                "action.entity_id is required",
                format!("{apath}.entity_id"),
            );
        }
        if kind == "create_record" {
            if let Some(defaults) = get(action, "defaults").filter(|v| !v.is_null()) {
                if !defaults.is_object() {
                    cx.error(
                        "MANIFEST_ACTION_INVALID",
                        "create_record defaults must be object",
                        format!("{apath}.defaults"),
                    );
                }
            }
        }
        if matches!(kind, "update_record" | "bulk_update") {
            if let Some(patch) = get(action, "patch").filter(|v| !v.is_null()) {
                if !patch.is_object() {
                    cx.error(
                        "MANIFEST_ACTION_INVALID",
                        "update patch must be object",
                        format!("{apath}.patch"),
                    );
                }
            }
        }

        check_gated_condition(cx, action, "visible_when", "MANIFEST_ACTION_CONDITION_INVALID", &apath);
        check_gated_condition(cx, action, "enabled_when", "MANIFEST_ACTION_CONDITION_INVALID", &apath);
        if let Some(confirm) = get(action, "confirm").filter(|v| !v.is_null()) {
            if !confirm.is_object() {
                cx.error(
                    "MANIFEST_ACTION_CONFIRM_INVALID",
                    "confirm must be object",
                    format!("{apath}.confirm"),
                );
            }
        }
    }

    action_by_id
}

pub(crate) fn check_modals(cx: &mut Vctx, manifest: &Value, action_by_id: &ActionMap<'_>) {
    let modals = match get(manifest, "modals") {
        None | Some(Value::Null) => return,
        Some(Value::Array(modals)) => modals,
        Some(_) => {
            cx.error("MANIFEST_MODALS_INVALID", "modals must be a list", "modals");
            return;
        }
    };

    for (midx, modal) in modals.iter().enumerate() {
        let mpath = format!("modals[{midx}]");
        if !modal.is_object() {
            cx.error("MANIFEST_MODAL_INVALID", "modal must be an object", mpath);
            continue;
        }
        reject_unknown_keys(cx, modal, ALLOWED_V1_MODAL_KEYS, &mpath);
        if nonempty_str(modal, "id").is_none() {
            cx.error("MANIFEST_MODAL_ID_INVALID", "modal.id is required", format!("{mpath}.id"));
            continue;
        }
        for key in ["title", "description"] {
            if let Some(value) = get(modal, key).filter(|v| !v.is_null()) {
                if !value.is_string() {
                    cx.error(
                        "MANIFEST_MODAL_INVALID",
                        &format!("modal.{key} must be string"),
                        format!("{mpath}.{key}"),
                    );
                }
            }
        }
        if let Some(fields) = get(modal, "fields").filter(|v| !v.is_null()) {
            match fields.as_array() {
                None => {
                    cx.error(
                        "MANIFEST_MODAL_INVALID",
                        "modal.fields must be a list",
                        format!("{mpath}.fields"),
                    );
                }
                Some(fields) => {
                    for (fidx, field_id) in fields.iter().enumerate() {
                        if field_id.as_str().map(str::is_empty).unwrap_or(true) {
                            cx.error(
                                "MANIFEST_MODAL_INVALID",
                                "modal.fields values must be field ids",
                                format!("{mpath}.fields[{fidx}]"),
                            );
                        }
                    }
                }
            }
        }
        if let Some(defaults) = get(modal, "defaults").filter(|v| !v.is_null()) {
            if !defaults.is_object() {
                cx.error(
                    "MANIFEST_MODAL_INVALID",
                    "modal.defaults must be object",
                    format!("{mpath}.defaults"),
                );
            }
        }
        let modal_actions = match get(modal, "actions").filter(|v| !v.is_null()) {
            None => continue,
            Some(Value::Array(actions)) => actions,
            Some(_) => {
                cx.error(
                    "MANIFEST_MODAL_INVALID",
                    "modal.actions must be a list",
                    format!("{mpath}.actions"),
                );
                continue;
            }
        };
        for (aidx, action) in modal_actions.iter().enumerate() {
            let apath = format!("{mpath}.actions[{aidx}]");
            if !action.is_object() {
                cx.error("MANIFEST_MODAL_ACTION_INVALID", "modal action must be an object", apath);
                continue;
            }
            reject_unknown_keys(cx, action, ALLOWED_V1_MODAL_ACTION_KEYS, &apath);
            let action_id = get(action, "action_id");
            let kind = get(action, "kind");
            if action_id.is_none() && kind.is_none() {
                cx.error(
                    "MANIFEST_MODAL_ACTION_INVALID",
                    "modal action requires action_id or kind",
                    apath.clone(),
                );
            }
            if let Some(action_id) = action_id {
                match action_id.as_str().filter(|s| !s.is_empty()) {
                    None => {
                        cx.error(
                            "MANIFEST_MODAL_ACTION_INVALID",
                            "modal action_id must be string",
                            format!("{apath}.action_id"),
                        );
                    }
                    Some(id) if !action_by_id.contains_key(id) => {
                        cx.error(
                            "MANIFEST_MODAL_ACTION_UNKNOWN",
                            "modal action_id not found",
                            format!("{apath}.action_id"),
                        );
                    }
                    _ => {}
                }
            }
            if let Some(kind) = kind.and_then(Value::as_str) {
                if !ALLOWED_V1_ACTION_KINDS.contains(&kind) && kind != "close_modal" {
                    cx.error(
                        "MANIFEST_MODAL_ACTION_INVALID",
                        "modal action kind must be allowlisted",
                        format!("{apath}.kind"),
                    );
                }
            }
            if let Some(close) = get(action, "close_on_success").filter(|v| !v.is_null()) {
                if !close.is_boolean() {
                    cx.error(
                        "MANIFEST_MODAL_ACTION_INVALID",
                        "close_on_success must be boolean",
                        format!("{apath}.close_on_success"),
                    );
                }
            }
        }
    }
}

pub(crate) fn check_triggers(
    cx: &mut Vctx,
    manifest: &Value,
    entities: &EntityMap<'_>,
    action_by_id: &ActionMap<'_>,
) {
    let triggers = match get(manifest, "triggers") {
        None | Some(Value::Null) => return,
        Some(Value::Array(triggers)) => triggers,
        Some(_) => {
            cx.error("MANIFEST_TRIGGERS_INVALID", "triggers must be a list", "triggers");
            return;
        }
    };

    for (tidx, trigger) in triggers.iter().enumerate() {
        let tpath = format!("triggers[{tidx}]");
        if !trigger.is_object() {
            cx.error("MANIFEST_TRIGGER_INVALID", "trigger must be an object", tpath);
            continue;
        }
        reject_unknown_keys(cx, trigger, ALLOWED_V1_TRIGGER_KEYS, &tpath);
        if nonempty_str(trigger, "id").is_none() {
            cx.error("MANIFEST_TRIGGER_ID_INVALID", "trigger.id is required", format!("{tpath}.id"));
        }
        let event = get_str(trigger, "event").unwrap_or_default();
        if !ALLOWED_V1_TRIGGER_EVENTS.contains(&event) {
            cx.error(
                "MANIFEST_TRIGGER_EVENT_INVALID",
                "trigger.event must be allowlisted",
                format!("{tpath}.event"),
            );
            continue;
        }
        if matches!(event, "record.created" | "record.updated" | "workflow.status_changed") {
            match nonempty_str(trigger, "entity_id") {
                None => {
                    cx.error(
                        "MANIFEST_TRIGGER_ENTITY_INVALID",
                        "trigger.entity_id is required",
                        format!("{tpath}.entity_id"),
                    );
                }
                Some(entity_id) => {
                    if !entity_known(entities, entity_id) {
                        cx.error(
                            "MANIFEST_TRIGGER_ENTITY_UNKNOWN",
                            "trigger.entity_id not found",
                            format!("{tpath}.entity_id"),
                        );
                    }
                }
            }
            if let Some(status_field) = get(trigger, "status_field").filter(|v| !v.is_null()) {
                if !status_field.is_string() {
                    cx.error(
                        "MANIFEST_TRIGGER_FIELD_INVALID",
                        "trigger.status_field must be string",
                        format!("{tpath}.status_field"),
                    );
                }
            }
        }
        if event == "action.clicked" {
            match nonempty_str(trigger, "action_id") {
                None => {
                    cx.error(
                        "MANIFEST_TRIGGER_ACTION_INVALID",
                        "trigger.action_id is required",
                        format!("{tpath}.action_id"),
                    );
                }
                Some(action_id) => {
                    if !action_by_id.contains_key(action_id) {
                        cx.error(
                            "MANIFEST_TRIGGER_ACTION_UNKNOWN",
                            "trigger.action_id not found",
                            format!("{tpath}.action_id"),
                        );
                    }
                }
            }
        }
    }
}
