//! View validation: entity resolution, per-kind shape checks, and the view
//! header surface.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    ActionMap, EntityMap, Vctx, entity_lookup, field_ids, find_field, get, get_str, nonempty_str,
    parse_target, reject_unknown_keys, truthy, validate_condition,
};
use crate::catalog::{
    ALLOWED_V1_GRAPH_DEFAULT_KEYS, ALLOWED_V1_VIEW_ACTIVITY_KEYS, ALLOWED_V1_VIEW_CARD_KEYS,
    ALLOWED_V1_VIEW_HEADER_ACTION_KEYS, ALLOWED_V1_VIEW_HEADER_FILTER_KEYS,
    ALLOWED_V1_VIEW_HEADER_KEYS, ALLOWED_V1_VIEW_HEADER_SEARCH_KEYS,
};

const VIEW_KINDS: &[&str] = &["list", "form", "kanban", "graph", "calendar"];

pub(crate) fn check_views(
    cx: &mut Vctx,
    manifest: &Value,
    entities: &EntityMap<'_>,
    action_by_id: &ActionMap<'_>,
    workflows_by_entity: &BTreeMap<String, &Value>,
) {
    let views = match get(manifest, "views") {
        Some(Value::Array(views)) => views.as_slice(),
        Some(_) => {
            cx.error("MANIFEST_VIEWS_INVALID", "views must be a list", "views");
            &[]
        }
        None => &[],
    };

    for (i, view) in views.iter().enumerate() {
        let vpath = format!("views[{i}]");
        if !view.is_object() {
            cx.error("MANIFEST_VIEW_INVALID", "view must be an object", vpath);
            continue;
        }
        if nonempty_str(view, "id").is_none() {
            cx.error("MANIFEST_VIEW_ID_INVALID", "view.id is required", format!("{vpath}.id"));
        }
        let entity_id = nonempty_str(view, "entity")
            .or_else(|| nonempty_str(view, "entity_id"))
            .or_else(|| nonempty_str(view, "entityId"));
        let entity_id = match entity_id {
            Some(entity_id) => entity_id,
            None => {
                cx.error(
                    "MANIFEST_VIEW_ENTITY_INVALID",
                    "view.entity is required",
                    format!("{vpath}.entity"),
                );
                continue;
            }
        };
        let entity_obj = entity_lookup(entities, entity_id);
        if entity_obj.is_none() {
            cx.error(
                "MANIFEST_VIEW_ENTITY_UNKNOWN",
                "view entity not found",
                format!("{vpath}.entity"),
            );
        }
        let vtype = get_str(view, "type").or_else(|| get_str(view, "kind"));
        if !vtype.map(|t| VIEW_KINDS.contains(&t)).unwrap_or(false) {
            cx.error(
                "MANIFEST_VIEW_TYPE_INVALID",
                "view.type must be list, form, kanban, graph, or calendar",
                format!("{vpath}.type"),
            );
        }
        let vtype = vtype.unwrap_or_default();

        check_open_record(cx, view, &vpath);

        if vtype == "list" {
            if let Some(create_behavior) = get(view, "create_behavior") {
                let ok = matches!(create_behavior.as_str(), Some("open_form") | Some("create_record"));
                if !ok {
                    cx.error(
                        "MANIFEST_VIEW_CREATE_BEHAVIOR_INVALID",
                        "create_behavior must be open_form or create_record",
                        format!("{vpath}.create_behavior"),
                    );
                }
            }
        }

        if let Some(header) = get(view, "header").filter(|v| !v.is_null()) {
            check_header(
                cx,
                view,
                header,
                &vpath,
                vtype,
                entity_id,
                entity_obj,
                action_by_id,
                workflows_by_entity,
            );
        }

        check_activity(cx, view, &vpath, vtype, entity_obj);

        match vtype {
            "list" => check_list_columns(cx, view, &vpath, entity_obj),
            "form" => check_form_sections(cx, view, &vpath, entity_obj),
            "kanban" => check_kanban_card(cx, view, &vpath, entity_obj),
            "graph" => check_graph_default(cx, view, &vpath, entity_obj),
            "calendar" => check_calendar(cx, view, &vpath, entity_obj),
            _ => {}
        }
    }
}

fn field_known(entity_obj: Option<&Value>, field_id: &str) -> bool {
    // Unresolved entities skip field membership checks entirely.
    entity_obj
        .map(|e| field_ids(e).contains(field_id))
        .unwrap_or(true)
}

fn check_open_record(cx: &mut Vctx, view: &Value, vpath: &str) {
    let open_record = match get(view, "open_record").filter(|v| !v.is_null()) {
        Some(open_record) => open_record,
        None => return,
    };
    if !open_record.is_object() {
        cx.error(
            "MANIFEST_VIEW_OPEN_RECORD_INVALID",
            "open_record must be an object",
            format!("{vpath}.open_record"),
        );
        return;
    }
    let ok = get_str(open_record, "to")
        .map(|t| parse_target(t).is_some())
        .unwrap_or(false);
    if !ok {
        cx.error(
            "MANIFEST_VIEW_OPEN_RECORD_INVALID",
            "open_record.to must be page:<id> or view:<id>",
            format!("{vpath}.open_record.to"),
        );
    }
    if let Some(param) = get(open_record, "param").filter(|v| !v.is_null()) {
        if !param.is_string() {
            cx.error(
                "MANIFEST_VIEW_OPEN_RECORD_INVALID",
                "open_record.param must be string",
                format!("{vpath}.open_record.param"),
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_header(
    cx: &mut Vctx,
    view: &Value,
    header: &Value,
    vpath: &str,
    vtype: &str,
    entity_id: &str,
    entity_obj: Option<&Value>,
    action_by_id: &ActionMap<'_>,
    workflows_by_entity: &BTreeMap<String, &Value>,
) {
    if !header.is_object() {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "view.header must be an object",
            format!("{vpath}.header"),
        );
        return;
    }
    reject_unknown_keys(cx, header, ALLOWED_V1_VIEW_HEADER_KEYS, &format!("{vpath}.header"));

    if let Some(title_field) = get(header, "title_field").filter(|v| !v.is_null()) {
        match title_field.as_str() {
            None => {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "title_field must be string",
                    format!("{vpath}.header.title_field"),
                );
            }
            Some(tf) if !field_known(entity_obj, tf) => {
                cx.error(
                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                    "title_field not found on entity",
                    format!("{vpath}.header.title_field"),
                );
            }
            _ => {}
        }
    }

    if let Some(save_mode) = get(header, "save_mode").filter(|v| !v.is_null()) {
        if vtype != "form" {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "save_mode only valid on form views",
                format!("{vpath}.header.save_mode"),
            );
        } else if !matches!(save_mode.as_str(), Some("top") | Some("bottom") | Some("both")) {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "save_mode must be top|bottom|both",
                format!("{vpath}.header.save_mode"),
            );
        }
    }
    if let Some(auto_save) = get(header, "auto_save").filter(|v| !v.is_null()) {
        if vtype != "form" {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "auto_save only valid on form views",
                format!("{vpath}.header.auto_save"),
            );
        } else if !auto_save.is_boolean() {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "auto_save must be boolean",
                format!("{vpath}.header.auto_save"),
            );
        }
    }
    if let Some(debounce) = get(header, "auto_save_debounce_ms").filter(|v| !v.is_null()) {
        if vtype != "form" {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "auto_save_debounce_ms only valid on form views",
                format!("{vpath}.header.auto_save_debounce_ms"),
            );
        } else {
            let positive = debounce.as_i64().map(|v| v > 0).unwrap_or(false);
            if !positive {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "auto_save_debounce_ms must be positive integer",
                    format!("{vpath}.header.auto_save_debounce_ms"),
                );
            }
        }
    }
    if let Some(open_record_target) = get(header, "open_record_target").filter(|v| !v.is_null()) {
        if vtype != "list" {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "open_record_target only valid on list views",
                format!("{vpath}.header.open_record_target"),
            );
        } else {
            let ok = open_record_target
                .as_str()
                .map(|t| parse_target(t).is_some())
                .unwrap_or(false);
            if !ok {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "open_record_target must be page:<id> or view:<id>",
                    format!("{vpath}.header.open_record_target"),
                );
            }
        }
    }

    if let Some(statusbar) = get(header, "statusbar").filter(|v| !v.is_null()) {
        check_header_statusbar(
            cx,
            statusbar,
            vpath,
            vtype,
            entity_id,
            entity_obj,
            workflows_by_entity,
        );
    }

    if let Some(tabs) = get(header, "tabs").filter(|v| !v.is_null()) {
        check_header_tabs(cx, view, tabs, vpath, vtype);
    }

    check_header_actions(
        cx,
        get(header, "primary_actions"),
        &format!("{vpath}.header.primary_actions"),
        action_by_id,
        true,
    );
    check_header_actions(
        cx,
        get(header, "secondary_actions"),
        &format!("{vpath}.header.secondary_actions"),
        action_by_id,
        true,
    );
    let bulk_actions = get(header, "bulk_actions");
    if bulk_actions.filter(|v| !v.is_null()).is_some() && vtype != "list" {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "bulk_actions only valid on list views",
            format!("{vpath}.header.bulk_actions"),
        );
    }
    check_header_actions(
        cx,
        bulk_actions,
        &format!("{vpath}.header.bulk_actions"),
        action_by_id,
        false,
    );

    if let Some(search) = get(header, "search").filter(|v| !v.is_null()) {
        check_header_search(cx, search, vpath, entity_obj);
    }
    if let Some(filters) = get(header, "filters").filter(|v| !v.is_null()) {
        check_header_filters(cx, filters, vpath);
    }
}

fn check_header_statusbar(
    cx: &mut Vctx,
    statusbar: &Value,
    vpath: &str,
    vtype: &str,
    entity_id: &str,
    entity_obj: Option<&Value>,
    workflows_by_entity: &BTreeMap<String, &Value>,
) {
    if vtype != "form" {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "statusbar only valid on form views",
            format!("{vpath}.header.statusbar"),
        );
        return;
    }
    if !statusbar.is_object() {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "statusbar must be object",
            format!("{vpath}.header.statusbar"),
        );
        return;
    }
    let field_id = match get_str(statusbar, "field_id") {
        None => {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "statusbar.field_id must be string",
                format!("{vpath}.header.statusbar.field_id"),
            );
            return;
        }
        Some(field_id) => field_id,
    };
    if !field_known(entity_obj, field_id) {
        cx.error(
            "MANIFEST_VIEW_FIELD_UNKNOWN",
            "statusbar.field_id not found on entity",
            format!("{vpath}.header.statusbar.field_id"),
        );
        return;
    }
    if let Some(entity_obj) = entity_obj {
        if let Some(field) = find_field(entity_obj, field_id) {
            if get_str(field, "type") != Some("enum") {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "statusbar field must be enum",
                    format!("{vpath}.header.statusbar.field_id"),
                );
            }
        }
    }
    let full_entity_id = if entity_id.starts_with("entity.") {
        entity_id.to_string()
    } else {
        format!("entity.{entity_id}")
    };
    let workflow = workflows_by_entity
        .get(&full_entity_id)
        .or_else(|| workflows_by_entity.get(entity_id));
    if let Some(workflow) = workflow {
        if let Some(wf_status) = get_str(workflow, "status_field") {
            if !field_id.is_empty() && wf_status != field_id {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "statusbar.field_id must match workflow status_field",
                    format!("{vpath}.header.statusbar.field_id"),
                );
            }
        }
    }
}

fn check_header_tabs(cx: &mut Vctx, view: &Value, tabs: &Value, vpath: &str, vtype: &str) {
    if vtype != "form" {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "tabs only valid on form views",
            format!("{vpath}.header.tabs"),
        );
        return;
    }
    if !tabs.is_object() {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "tabs must be object",
            format!("{vpath}.header.tabs"),
        );
        return;
    }
    if let Some(style) = get(tabs, "style").filter(|v| !v.is_null()) {
        if !matches!(style.as_str(), Some("boxed") | Some("lifted") | Some("bordered")) {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "tabs.style must be boxed|lifted|bordered",
                format!("{vpath}.header.tabs.style"),
            );
        }
    }
    let tabs_list = match get(tabs, "tabs").and_then(Value::as_array).filter(|t| !t.is_empty()) {
        None => {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "tabs.tabs must be a non-empty list",
                format!("{vpath}.header.tabs.tabs"),
            );
            return;
        }
        Some(tabs_list) => tabs_list,
    };

    let section_ids: BTreeSet<&str> = get(view, "sections")
        .and_then(Value::as_array)
        .map(|sections| {
            sections
                .iter()
                .filter_map(|s| get_str(s, "id"))
                .collect()
        })
        .unwrap_or_default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut referenced: BTreeSet<&str> = BTreeSet::new();

    for (tidx, tab) in tabs_list.iter().enumerate() {
        let tpath = format!("{vpath}.header.tabs.tabs[{tidx}]");
        if !tab.is_object() {
            cx.error("MANIFEST_VIEW_HEADER_INVALID", "tab must be object", tpath);
            continue;
        }
        match nonempty_str(tab, "id") {
            None => {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "tab.id is required",
                    format!("{tpath}.id"),
                );
            }
            Some(tab_id) => {
                if !seen.insert(tab_id) {
                    cx.error(
                        "MANIFEST_VIEW_HEADER_INVALID",
                        "tab.id must be unique",
                        format!("{tpath}.id"),
                    );
                }
            }
        }
        let sections_ref = get(tab, "sections").and_then(Value::as_array).filter(|s| !s.is_empty());
        match sections_ref {
            None => {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "tab.sections must be a non-empty list",
                    format!("{tpath}.sections"),
                );
            }
            Some(sections_ref) => {
                for (sidx, sid) in sections_ref.iter().enumerate() {
                    match sid.as_str() {
                        None => {
                            cx.error(
                                "MANIFEST_VIEW_HEADER_INVALID",
                                "tab.sections must be list of strings",
                                format!("{tpath}.sections[{sidx}]"),
                            );
                        }
                        Some(sid) if !section_ids.contains(sid) => {
                            cx.error(
                                "MANIFEST_VIEW_HEADER_INVALID",
                                "tab.section not found",
                                format!("{tpath}.sections[{sidx}]"),
                            );
                        }
                        Some(sid) => {
                            referenced.insert(sid);
                        }
                    }
                }
            }
        }
    }

    if let Some(default_tab) = get(tabs, "default_tab").filter(|v| !v.is_null()) {
        let known = default_tab.as_str().map(|t| seen.contains(t)).unwrap_or(false);
        if !known {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "tabs.default_tab not found",
                format!("{vpath}.header.tabs.default_tab"),
            );
        }
    }
    if !section_ids.is_empty()
        && !referenced.is_empty()
        && section_ids.difference(&referenced).next().is_some()
    {
        cx.warn(
            "MANIFEST_VIEW_HEADER_WARNING",
            "sections not referenced by any tab",
            format!("{vpath}.header.tabs"),
        );
    }
}

pub(crate) fn check_header_actions(
    cx: &mut Vctx,
    actions: Option<&Value>,
    path: &str,
    action_by_id: &ActionMap<'_>,
    allow_inline: bool,
) {
    let actions = match actions.filter(|v| !v.is_null()) {
        None => return,
        Some(Value::Array(actions)) => actions,
        Some(_) => {
            cx.error("MANIFEST_VIEW_HEADER_ACTIONS_INVALID", "actions must be a list", path);
            return;
        }
    };
    for (aidx, action) in actions.iter().enumerate() {
        let apath = format!("{path}[{aidx}]");
        if !action.is_object() {
            cx.error("MANIFEST_VIEW_HEADER_ACTION_INVALID", "action must be an object", apath);
            continue;
        }
        reject_unknown_keys(cx, action, ALLOWED_V1_VIEW_HEADER_ACTION_KEYS, &apath);
        let action_id = get(action, "action_id").filter(|v| truthy(v));
        let kind = get(action, "kind").filter(|v| truthy(v));
        if let Some(action_id) = action_id {
            match action_id.as_str() {
                None => {
                    cx.error(
                        "MANIFEST_VIEW_HEADER_ACTION_INVALID",
                        "action_id must be string",
                        format!("{apath}.action_id"),
                    );
                }
                Some(id) if !action_by_id.contains_key(id) => {
                    cx.error(
                        "MANIFEST_VIEW_HEADER_ACTION_UNKNOWN",
                        "action_id not found",
                        format!("{apath}.action_id"),
                    );
                }
                _ => {}
            }
        } else if let Some(kind) = kind {
            let kind = kind.as_str().unwrap_or_default();
            if !allow_inline || !matches!(kind, "navigate" | "open_form" | "refresh") {
                cx.error(
                    "MANIFEST_VIEW_HEADER_ACTION_INVALID",
                    "inline actions must be navigate/open_form/refresh",
                    format!("{apath}.kind"),
                );
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
                    let bare_view = get_str(action, "target")
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
        } else {
            cx.error(
                "MANIFEST_VIEW_HEADER_ACTION_INVALID",
                "action_id or kind required",
                apath.clone(),
            );
        }

        for key in ["visible_when", "enabled_when"] {
            if let Some(cond) = get(action, key).filter(|v| !v.is_null()) {
                if !cx.conditions_allowed() {
                    cx.error(
                        "MANIFEST_ACTION_CONDITION_INVALID",
                        &format!("{key} requires manifest_version >= 1.2"),
                        format!("{apath}.{key}"),
                    );
                } else {
                    validate_condition(cx, cond, &format!("{apath}.{key}"), 0);
                }
            }
        }
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
}

fn check_header_search(cx: &mut Vctx, search: &Value, vpath: &str, entity_obj: Option<&Value>) {
    if !search.is_object() {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "search must be object",
            format!("{vpath}.header.search"),
        );
        return;
    }
    reject_unknown_keys(
        cx,
        search,
        ALLOWED_V1_VIEW_HEADER_SEARCH_KEYS,
        &format!("{vpath}.header.search"),
    );
    let enabled = get(search, "enabled");
    if let Some(enabled) = enabled {
        if !enabled.is_null() && !enabled.is_boolean() {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "search.enabled must be boolean",
                format!("{vpath}.header.search.enabled"),
            );
        }
    }
    let fields = get(search, "fields");
    let enabled_truthy = enabled.map(truthy).unwrap_or(false);
    if enabled_truthy && !fields.map(Value::is_array).unwrap_or(false) {
        cx.error(
            "MANIFEST_VIEW_HEADER_INVALID",
            "search.fields must be list",
            format!("{vpath}.header.search.fields"),
        );
    }
    if let Some(fields) = fields.and_then(Value::as_array) {
        for (fidx, fid) in fields.iter().enumerate() {
            if let Some(fid) = fid.as_str() {
                if !field_known(entity_obj, fid) {
                    cx.error(
                        "MANIFEST_VIEW_FIELD_UNKNOWN",
                        "search field not found",
                        format!("{vpath}.header.search.fields[{fidx}]"),
                    );
                }
            }
        }
    }
}

fn check_header_filters(cx: &mut Vctx, filters: &Value, vpath: &str) {
    let filters = match filters.as_array() {
        None => {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "filters must be list",
                format!("{vpath}.header.filters"),
            );
            return;
        }
        Some(filters) => filters,
    };
    for (fidx, flt) in filters.iter().enumerate() {
        let fpath = format!("{vpath}.header.filters[{fidx}]");
        if !flt.is_object() {
            cx.error("MANIFEST_VIEW_HEADER_INVALID", "filter must be object", fpath);
            continue;
        }
        reject_unknown_keys(cx, flt, ALLOWED_V1_VIEW_HEADER_FILTER_KEYS, &fpath);
        if nonempty_str(flt, "id").is_none() {
            cx.error(
                "MANIFEST_VIEW_HEADER_INVALID",
                "filter.id is required",
                format!("{fpath}.id"),
            );
        }
        if let Some(label) = get(flt, "label").filter(|v| !v.is_null()) {
            if !label.is_string() {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "filter.label must be string",
                    format!("{fpath}.label"),
                );
            }
        }
        match get(flt, "domain") {
            None | Some(Value::Null) => {
                cx.error(
                    "MANIFEST_VIEW_HEADER_INVALID",
                    "filter.domain is required",
                    format!("{fpath}.domain"),
                );
            }
            Some(domain) => {
                if !cx.conditions_allowed() {
                    cx.error(
                        "MANIFEST_VIEW_HEADER_INVALID",
                        "filters require manifest_version >= 1.2",
                        format!("{fpath}.domain"),
                    );
                } else {
                    validate_condition(cx, domain, &format!("{fpath}.domain"), 0);
                }
            }
        }
    }
}

fn check_activity(cx: &mut Vctx, view: &Value, vpath: &str, vtype: &str, entity_obj: Option<&Value>) {
    let activity = match get(view, "activity").filter(|v| !v.is_null()) {
        None => return,
        Some(activity) => activity,
    };
    if vtype != "form" {
        cx.error(
            "MANIFEST_VIEW_ACTIVITY_INVALID",
            "activity only valid on form views",
            format!("{vpath}.activity"),
        );
        return;
    }
    if !activity.is_object() {
        cx.error(
            "MANIFEST_VIEW_ACTIVITY_INVALID",
            "activity must be an object",
            format!("{vpath}.activity"),
        );
        return;
    }
    reject_unknown_keys(cx, activity, ALLOWED_V1_VIEW_ACTIVITY_KEYS, &format!("{vpath}.activity"));
    for key in ["enabled", "allow_comments", "allow_attachments", "show_changes"] {
        if let Some(value) = get(activity, key).filter(|v| !v.is_null()) {
            if !value.is_boolean() {
                cx.error(
                    "MANIFEST_VIEW_ACTIVITY_INVALID",
                    &format!("activity.{key} must be boolean"),
                    format!("{vpath}.activity.{key}"),
                );
            }
        }
    }
    if let Some(mode) = get(activity, "mode").filter(|v| !v.is_null()) {
        if !matches!(mode.as_str(), Some("tab") | Some("panel")) {
            cx.error(
                "MANIFEST_VIEW_ACTIVITY_INVALID",
                "activity.mode must be tab|panel",
                format!("{vpath}.activity.mode"),
            );
        }
    }
    if let Some(tab_label) = get(activity, "tab_label").filter(|v| !v.is_null()) {
        match tab_label.as_str() {
            None => {
                cx.error(
                    "MANIFEST_VIEW_ACTIVITY_INVALID",
                    "activity.tab_label must be string",
                    format!("{vpath}.activity.tab_label"),
                );
            }
            Some(label) if label.trim().is_empty() => {
                cx.error(
                    "MANIFEST_VIEW_ACTIVITY_INVALID",
                    "activity.tab_label must not be empty",
                    format!("{vpath}.activity.tab_label"),
                );
            }
            _ => {}
        }
    }
    if let Some(tracked) = get(activity, "tracked_fields").filter(|v| !v.is_null()) {
        match tracked.as_array() {
            None => {
                cx.error(
                    "MANIFEST_VIEW_ACTIVITY_INVALID",
                    "activity.tracked_fields must be list",
                    format!("{vpath}.activity.tracked_fields"),
                );
            }
            Some(tracked) => {
                if let Some(entity_obj) = entity_obj {
                    let valid = field_ids(entity_obj);
                    for (fidx, fid) in tracked.iter().enumerate() {
                        match fid.as_str() {
                            None => {
                                cx.error(
                                    "MANIFEST_VIEW_ACTIVITY_INVALID",
                                    "tracked_fields items must be strings",
                                    format!("{vpath}.activity.tracked_fields[{fidx}]"),
                                );
                            }
                            Some(fid) if !valid.contains(fid) => {
                                cx.error(
                                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                                    "tracked_fields field not found on entity",
                                    format!("{vpath}.activity.tracked_fields[{fidx}]"),
                                );
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
    }
}

fn check_list_columns(cx: &mut Vctx, view: &Value, vpath: &str, entity_obj: Option<&Value>) {
    let columns = get(view, "columns");
    match columns {
        None => {}
        Some(Value::Array(columns)) => {
            for (cidx, col) in columns.iter().enumerate() {
                if !col.is_object() {
                    continue;
                }
                if let Some(field_id) = get_str(col, "field_id") {
                    if !field_known(entity_obj, field_id) {
                        cx.error(
                            "MANIFEST_VIEW_FIELD_UNKNOWN",
                            "list view field not found",
                            format!("{vpath}.columns[{cidx}].field_id"),
                        );
                    }
                }
            }
        }
        Some(_) => {
            cx.error(
                "MANIFEST_VIEW_COLUMNS_INVALID",
                "list view columns must be a list",
                format!("{vpath}.columns"),
            );
        }
    }
}

fn check_form_sections(cx: &mut Vctx, view: &Value, vpath: &str, entity_obj: Option<&Value>) {
    let sections = get(view, "sections");
    let sections = match sections {
        None => return,
        Some(Value::Array(sections)) => sections,
        Some(_) => {
            cx.error(
                "MANIFEST_VIEW_SECTIONS_INVALID",
                "form view sections must be a list",
                format!("{vpath}.sections"),
            );
            return;
        }
    };
    for (sidx, section) in sections.iter().enumerate() {
        if let Some(fields) = get(section, "fields").and_then(Value::as_array) {
            for (fidx, fid) in fields.iter().enumerate() {
                if let Some(fid) = fid.as_str() {
                    if !field_known(entity_obj, fid) {
                        cx.error(
                            "MANIFEST_VIEW_FIELD_UNKNOWN",
                            "form view field not found",
                            format!("{vpath}.sections[{sidx}].fields[{fidx}]"),
                        );
                    }
                }
            }
        }
        if let Some(layout) = get(section, "layout").filter(|v| !v.is_null()) {
            if !cx.at_least(crate::catalog::SECTION_LAYOUT_GATE) {
                cx.error(
                    "MANIFEST_VIEW_SECTION_LAYOUT_INVALID",
                    "section.layout requires manifest_version >= 1.3",
                    format!("{vpath}.sections[{sidx}].layout"),
                );
            } else if layout.as_str() != Some("columns") {
                cx.error(
                    "MANIFEST_VIEW_SECTION_LAYOUT_INVALID",
                    "section.layout must be 'columns'",
                    format!("{vpath}.sections[{sidx}].layout"),
                );
            }
            if layout.as_str() == Some("columns") {
                if let Some(columns) = get(section, "columns").filter(|v| !v.is_null()) {
                    if columns.as_i64() != Some(2) {
                        cx.error(
                            "MANIFEST_VIEW_SECTION_LAYOUT_INVALID",
                            "section.columns must be 2",
                            format!("{vpath}.sections[{sidx}].columns"),
                        );
                    }
                }
            }
        }
    }
}

fn check_kanban_card(cx: &mut Vctx, view: &Value, vpath: &str, entity_obj: Option<&Value>) {
    let card = match get(view, "card") {
        Some(card) if card.is_object() => card,
        _ => {
            cx.error(
                "MANIFEST_VIEW_KANBAN_INVALID",
                "kanban view requires card object",
                format!("{vpath}.card"),
            );
            return;
        }
    };
    reject_unknown_keys(cx, card, ALLOWED_V1_VIEW_CARD_KEYS, &format!("{vpath}.card"));
    match nonempty_str(card, "title_field") {
        None => {
            cx.error(
                "MANIFEST_VIEW_KANBAN_INVALID",
                "card.title_field is required",
                format!("{vpath}.card.title_field"),
            );
        }
        Some(title_field) => {
            if !field_known(entity_obj, title_field) {
                cx.error(
                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                    "card.title_field not found",
                    format!("{vpath}.card.title_field"),
                );
            }
        }
    }
    for (key, label) in [("subtitle_fields", "subtitle_fields"), ("badge_fields", "badge_fields")] {
        if let Some(fields) = get(card, key).filter(|v| !v.is_null()) {
            match fields.as_array() {
                None => {
                    cx.error(
                        "MANIFEST_VIEW_KANBAN_INVALID",
                        &format!("card.{label} must be list"),
                        format!("{vpath}.card.{key}"),
                    );
                }
                Some(fields) => {
                    for (fidx, fid) in fields.iter().enumerate() {
                        if let Some(fid) = fid.as_str() {
                            if !field_known(entity_obj, fid) {
                                cx.error(
                                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                                    &format!("card.{label} field not found"),
                                    format!("{vpath}.card.{key}[{fidx}]"),
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

fn check_graph_default(cx: &mut Vctx, view: &Value, vpath: &str, entity_obj: Option<&Value>) {
    let graph_def = match get(view, "default").filter(|v| !v.is_null()) {
        None => return,
        Some(graph_def) => graph_def,
    };
    if !graph_def.is_object() {
        cx.error(
            "MANIFEST_VIEW_GRAPH_INVALID",
            "graph.default must be object",
            format!("{vpath}.default"),
        );
        return;
    }
    reject_unknown_keys(cx, graph_def, ALLOWED_V1_GRAPH_DEFAULT_KEYS, &format!("{vpath}.default"));
    if let Some(gtype) = get(graph_def, "type").filter(|v| !v.is_null()) {
        if !matches!(gtype.as_str(), Some("bar") | Some("line") | Some("pie")) {
            cx.error(
                "MANIFEST_VIEW_GRAPH_INVALID",
                "graph.default.type must be bar|line|pie",
                format!("{vpath}.default.type"),
            );
        }
    }
    if let Some(group_by) = get_str(graph_def, "group_by") {
        if !field_known(entity_obj, group_by) {
            cx.error(
                "MANIFEST_VIEW_FIELD_UNKNOWN",
                "graph.default.group_by not found",
                format!("{vpath}.default.group_by"),
            );
        }
    }
    if let Some(measure) = get_str(graph_def, "measure") {
        if let Some(mfield) = measure.strip_prefix("sum:") {
            if !mfield.is_empty() && !field_known(entity_obj, mfield) {
                cx.error(
                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                    "graph.default.measure field not found",
                    format!("{vpath}.default.measure"),
                );
            }
        }
    }
}

fn check_calendar(cx: &mut Vctx, view: &Value, vpath: &str, entity_obj: Option<&Value>) {
    let calendar = get(view, "calendar").filter(|v| !v.is_null());
    let calendar = match calendar {
        Some(calendar) if !calendar.is_object() => {
            cx.error(
                "MANIFEST_VIEW_CALENDAR_INVALID",
                "calendar must be an object",
                format!("{vpath}.calendar"),
            );
            None
        }
        other => other,
    };
    // Calendar fields may live under `calendar` or legacy-flat on the view.
    let lookup = |key: &str| -> Option<&Value> {
        match calendar {
            Some(calendar) => get(calendar, key),
            None => get(view, key),
        }
    };

    let date_start = lookup("date_start");
    match date_start.and_then(Value::as_str).filter(|s| !s.is_empty()) {
        None => {
            cx.error(
                "MANIFEST_VIEW_CALENDAR_INVALID",
                "calendar.date_start is required",
                format!("{vpath}.calendar.date_start"),
            );
        }
        Some(field) => {
            if !field_known(entity_obj, field) {
                cx.error(
                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                    "calendar.date_start field not found",
                    format!("{vpath}.calendar.date_start"),
                );
            }
        }
    }
    if let Some(date_end) = lookup("date_end").filter(|v| !v.is_null()) {
        match date_end.as_str() {
            None => {
                cx.error(
                    "MANIFEST_VIEW_CALENDAR_INVALID",
                    "calendar.date_end must be string",
                    format!("{vpath}.calendar.date_end"),
                );
            }
            Some(field) if !field_known(entity_obj, field) => {
                cx.error(
                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                    "calendar.date_end field not found",
                    format!("{vpath}.calendar.date_end"),
                );
            }
            _ => {}
        }
    }
    match lookup("title_field").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        None => {
            cx.error(
                "MANIFEST_VIEW_CALENDAR_INVALID",
                "calendar.title_field is required",
                format!("{vpath}.calendar.title_field"),
            );
        }
        Some(field) => {
            if !field_known(entity_obj, field) {
                cx.error(
                    "MANIFEST_VIEW_FIELD_UNKNOWN",
                    "calendar.title_field field not found",
                    format!("{vpath}.calendar.title_field"),
                );
            }
        }
    }
    for key in ["all_day_field", "color_field"] {
        if let Some(value) = lookup(key).filter(|v| !v.is_null()) {
            match value.as_str() {
                None => {
                    cx.error(
                        "MANIFEST_VIEW_CALENDAR_INVALID",
                        &format!("calendar.{key} must be string"),
                        format!("{vpath}.calendar.{key}"),
                    );
                }
                Some(field) if !field_known(entity_obj, field) => {
                    cx.error(
                        "MANIFEST_VIEW_FIELD_UNKNOWN",
                        &format!("calendar.{key} field not found"),
                        format!("{vpath}.calendar.{key}"),
                    );
                }
                _ => {}
            }
        }
    }
    if let Some(scale) = lookup("default_scale").filter(|v| !v.is_null()) {
        if !matches!(scale.as_str(), Some("month") | Some("week") | Some("day") | Some("year")) {
            cx.error(
                "MANIFEST_VIEW_CALENDAR_INVALID",
                "calendar.default_scale must be month|week|day|year",
                format!("{vpath}.calendar.default_scale"),
            );
        }
    }
}
