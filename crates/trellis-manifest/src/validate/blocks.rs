//! Page content block trees. Kind availability is gated by
//! [`crate::catalog::BLOCK_KIND_GATES`]; nesting depth is capped.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    ActionMap, EntityMap, Vctx, entity_known, get, get_str, nonempty_str, parse_view_target,
    reject_unknown_keys, truthy, validate_condition,
};
use crate::catalog::{
    ALLOWED_V1_BLOCK_KEYS, ALLOWED_V1_CHATTER_KEYS, ALLOWED_V1_CONTAINER_KEYS,
    ALLOWED_V1_GRID_ITEM_KEYS, ALLOWED_V1_GRID_KEYS, ALLOWED_V1_RECORD_KEYS,
    ALLOWED_V1_RELATED_LIST_KEYS, ALLOWED_V1_STACK_KEYS, ALLOWED_V1_STATUSBAR_KEYS,
    ALLOWED_V1_TABS_KEYS, ALLOWED_V1_TAB_KEYS, ALLOWED_V1_TEXT_KEYS, ALLOWED_V1_TOOLBAR_KEYS,
    ALLOWED_V1_VIEW_MODES_KEYS, ALLOWED_V1_VIEW_MODE_ITEM_KEYS, ALLOWED_VIEW_MODE_IDS,
    MAX_BLOCK_DEPTH, block_kind_gate,
};

pub(crate) struct BlockCtx<'a> {
    pub view_ids: &'a BTreeSet<String>,
    pub entities: &'a EntityMap<'a>,
    pub actions: &'a ActionMap<'a>,
}

/// Returns `false` (and records the error) when the block's kind is gated
/// behind a later manifest version.
fn gate_allows(cx: &mut Vctx, kind: &str, bpath: &str) -> bool {
    match block_kind_gate(kind) {
        Some(gate) if !cx.at_least(gate) => {
            cx.error(
                "MANIFEST_BLOCK_KIND_INVALID",
                &format!("{kind} blocks require manifest_version >= {gate}"),
                format!("{bpath}.kind"),
            );
            false
        }
        _ => true,
    }
}

pub(crate) fn check_blocks(
    cx: &mut Vctx,
    blocks: &Value,
    path: &str,
    bx: &BlockCtx<'_>,
    record_entity: Option<&str>,
    depth: usize,
) {
    if depth > MAX_BLOCK_DEPTH {
        cx.error("MANIFEST_BLOCK_DEPTH", "content blocks are nested too deeply", path);
        return;
    }
    let blocks = match blocks.as_array() {
        Some(blocks) => blocks,
        None => {
            cx.error("MANIFEST_PAGE_CONTENT_INVALID", "page.content must be a list", path);
            return;
        }
    };

    for (bidx, block) in blocks.iter().enumerate() {
        let bpath = format!("{path}[{bidx}]");
        if !block.is_object() {
            cx.error("MANIFEST_BLOCK_INVALID", "page block must be an object", bpath);
            continue;
        }
        reject_unknown_keys(cx, block, ALLOWED_V1_BLOCK_KEYS, &bpath);
        let kind = get_str(block, "kind").unwrap_or_default();
        match kind {
            "view" => {
                let target = get_str(block, "target");
                let target_id = target.and_then(parse_view_target).filter(|t| !t.is_empty());
                match target_id {
                    None => {
                        cx.error(
                            "MANIFEST_TARGET_INVALID",
                            "block target must be a view id or view:<id>",
                            format!("{bpath}.target"),
                        );
                    }
                    Some(target_id) if !bx.view_ids.contains(target_id) => {
                        cx.error(
                            "MANIFEST_TARGET_UNKNOWN",
                            "page block view not found",
                            format!("{bpath}.target"),
                        );
                    }
                    _ => {}
                }
            }
            "stack" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_STACK_KEYS, &bpath);
                recurse_content(cx, block, &bpath, bx, record_entity, depth);
            }
            "grid" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_GRID_KEYS, &bpath);
                if get(block, "columns").and_then(Value::as_i64) != Some(12) {
                    cx.error(
                        "MANIFEST_GRID_COLUMNS_INVALID",
                        "grid.columns must be 12",
                        format!("{bpath}.columns"),
                    );
                }
                let items = get(block, "items").and_then(Value::as_array).filter(|i| !i.is_empty());
                let items = match items {
                    None => {
                        cx.error(
                            "MANIFEST_GRID_ITEMS_INVALID",
                            "grid.items must be a non-empty list",
                            format!("{bpath}.items"),
                        );
                        continue;
                    }
                    Some(items) => items,
                };
                for (iidx, item) in items.iter().enumerate() {
                    let ipath = format!("{bpath}.items[{iidx}]");
                    if !item.is_object() {
                        cx.error("MANIFEST_GRID_ITEM_INVALID", "grid item must be an object", ipath);
                        continue;
                    }
                    reject_unknown_keys(cx, item, ALLOWED_V1_GRID_ITEM_KEYS, &ipath);
                    let span = get(item, "span").and_then(Value::as_i64);
                    if !span.map(|s| (1..=12).contains(&s)).unwrap_or(false) {
                        cx.error(
                            "MANIFEST_GRID_SPAN_INVALID",
                            "grid item span must be 1..12",
                            format!("{ipath}.span"),
                        );
                    }
                    recurse_content(cx, item, &ipath, bx, record_entity, depth);
                }
            }
            "tabs" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_TABS_KEYS, &bpath);
                let tabs = get(block, "tabs").and_then(Value::as_array).filter(|t| !t.is_empty());
                let tabs = match tabs {
                    None => {
                        cx.error(
                            "MANIFEST_TABS_INVALID",
                            "tabs must be a non-empty list",
                            format!("{bpath}.tabs"),
                        );
                        continue;
                    }
                    Some(tabs) => tabs,
                };
                let mut tab_ids: Vec<&str> = Vec::new();
                for (tidx, tab) in tabs.iter().enumerate() {
                    let tpath = format!("{bpath}.tabs[{tidx}]");
                    if !tab.is_object() {
                        cx.error("MANIFEST_TAB_INVALID", "tab must be an object", tpath);
                        continue;
                    }
                    reject_unknown_keys(cx, tab, ALLOWED_V1_TAB_KEYS, &tpath);
                    match nonempty_str(tab, "id") {
                        None => {
                            cx.error(
                                "MANIFEST_TAB_ID_INVALID",
                                "tab.id is required",
                                format!("{tpath}.id"),
                            );
                        }
                        Some(tid) => tab_ids.push(tid),
                    }
                    recurse_content(cx, tab, &tpath, bx, record_entity, depth);
                }
                let unique: BTreeSet<&&str> = tab_ids.iter().collect();
                if unique.len() != tab_ids.len() {
                    cx.error(
                        "MANIFEST_TAB_ID_DUPLICATE",
                        "tab ids must be unique",
                        format!("{bpath}.tabs"),
                    );
                }
                if let Some(default_tab) = get(block, "default_tab").filter(|v| truthy(v)) {
                    let known = default_tab
                        .as_str()
                        .map(|t| tab_ids.contains(&t))
                        .unwrap_or(false);
                    if !known {
                        cx.error(
                            "MANIFEST_TAB_DEFAULT_INVALID",
                            "default_tab must match a tab id",
                            format!("{bpath}.default_tab"),
                        );
                    }
                }
            }
            "text" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_TEXT_KEYS, &bpath);
                if !get(block, "text").map(Value::is_string).unwrap_or(false) {
                    cx.error(
                        "MANIFEST_TEXT_INVALID",
                        "text block requires string text",
                        format!("{bpath}.text"),
                    );
                }
            }
            "container" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_CONTAINER_KEYS, &bpath);
                recurse_content(cx, block, &bpath, bx, record_entity, depth);
            }
            "toolbar" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_TOOLBAR_KEYS, &bpath);
                let actions = get(block, "actions").and_then(Value::as_array);
                match actions {
                    Some(actions) if !actions.is_empty() => {
                        for (aidx, action) in actions.iter().enumerate() {
                            let apath = format!("{bpath}.actions[{aidx}]");
                            if !action.is_object() {
                                cx.error(
                                    "MANIFEST_TOOLBAR_ACTION_INVALID",
                                    "action must be object",
                                    apath,
                                );
                                continue;
                            }
                            let known = get_str(action, "action_id")
                                .map(|id| bx.actions.contains_key(id))
                                .unwrap_or(false);
                            if !known {
                                cx.error(
                                    "MANIFEST_TOOLBAR_ACTION_INVALID",
                                    "action_id not found",
                                    format!("{apath}.action_id"),
                                );
                            }
                        }
                    }
                    _ => {
                        cx.error(
                            "MANIFEST_TOOLBAR_ACTIONS_INVALID",
                            "toolbar.actions must be a non-empty list",
                            format!("{bpath}.actions"),
                        );
                    }
                }
            }
            "statusbar" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_STATUSBAR_KEYS, &bpath);
                let entity_id = nonempty_str(block, "entity_id").or(record_entity);
                let has_record_ref =
                    nonempty_str(block, "record_ref").is_some() || record_entity.is_some();
                let field_id = nonempty_str(block, "field_id");
                if entity_id.is_none() {
                    cx.error(
                        "MANIFEST_STATUSBAR_ENTITY_INVALID",
                        "statusbar.entity_id is required",
                        format!("{bpath}.entity_id"),
                    );
                }
                if !has_record_ref {
                    cx.error(
                        "MANIFEST_STATUSBAR_RECORD_REF_INVALID",
                        "statusbar.record_ref is required",
                        format!("{bpath}.record_ref"),
                    );
                }
                match field_id {
                    None => {
                        cx.error(
                            "MANIFEST_STATUSBAR_FIELD_INVALID",
                            "statusbar.field_id is required",
                            format!("{bpath}.field_id"),
                        );
                    }
                    Some(field_id) => {
                        if let Some(entity_id) = entity_id {
                            if let Some(entity) = super::entity_lookup(bx.entities, entity_id) {
                                match super::find_field(entity, field_id) {
                                    None => {
                                        cx.error(
                                            "MANIFEST_STATUSBAR_FIELD_INVALID",
                                            "statusbar.field_id not found on entity",
                                            format!("{bpath}.field_id"),
                                        );
                                    }
                                    Some(field) => {
                                        if get_str(field, "type") != Some("enum") {
                                            cx.error(
                                                "MANIFEST_STATUSBAR_FIELD_INVALID",
                                                "statusbar.field_id must be enum field",
                                                format!("{bpath}.field_id"),
                                            );
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
            "record" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_RECORD_KEYS, &bpath);
                let entity_id = nonempty_str(block, "entity_id");
                if entity_id.is_none() {
                    cx.error(
                        "MANIFEST_RECORD_ENTITY_INVALID",
                        "record.entity_id is required",
                        format!("{bpath}.entity_id"),
                    );
                }
                if nonempty_str(block, "record_id_query").is_none() {
                    cx.error(
                        "MANIFEST_RECORD_QUERY_INVALID",
                        "record.record_id_query is required",
                        format!("{bpath}.record_id_query"),
                    );
                }
                // Children inherit the record's entity as their implicit
                // record context.
                if let Some(content) = get(block, "content") {
                    check_blocks(cx, content, &format!("{bpath}.content"), bx, entity_id, depth + 1);
                }
            }
            "view_modes" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_VIEW_MODES_KEYS, &bpath);
                match nonempty_str(block, "entity_id") {
                    None => {
                        cx.error(
                            "MANIFEST_VIEW_MODES_ENTITY_INVALID",
                            "view_modes.entity_id is required",
                            format!("{bpath}.entity_id"),
                        );
                    }
                    Some(entity_id) if !entity_known(bx.entities, entity_id) => {
                        cx.error(
                            "MANIFEST_VIEW_MODES_ENTITY_UNKNOWN",
                            "view_modes.entity_id not found",
                            format!("{bpath}.entity_id"),
                        );
                    }
                    _ => {}
                }
                let modes = get(block, "modes").and_then(Value::as_array).filter(|m| !m.is_empty());
                let modes = match modes {
                    None => {
                        cx.error(
                            "MANIFEST_VIEW_MODES_INVALID",
                            "view_modes.modes must be a non-empty list",
                            format!("{bpath}.modes"),
                        );
                        continue;
                    }
                    Some(modes) => modes,
                };
                let mut mode_ids: Vec<&str> = Vec::new();
                for (midx, mode) in modes.iter().enumerate() {
                    let mpath = format!("{bpath}.modes[{midx}]");
                    if !mode.is_object() {
                        cx.error("MANIFEST_VIEW_MODE_INVALID", "view mode must be object", mpath);
                        continue;
                    }
                    reject_unknown_keys(cx, mode, ALLOWED_V1_VIEW_MODE_ITEM_KEYS, &mpath);
                    match get_str(mode, "mode") {
                        Some(mode_id) if ALLOWED_VIEW_MODE_IDS.contains(&mode_id) => {
                            mode_ids.push(mode_id);
                        }
                        _ => {
                            cx.error(
                                "MANIFEST_VIEW_MODE_INVALID",
                                "mode must be list|kanban|graph|pivot|calendar",
                                format!("{mpath}.mode"),
                            );
                        }
                    }
                    let target_id = get_str(mode, "target")
                        .and_then(parse_view_target)
                        .filter(|t| !t.is_empty());
                    match target_id {
                        None => {
                            cx.error(
                                "MANIFEST_TARGET_INVALID",
                                "view_modes target must be a view id or view:<id>",
                                format!("{mpath}.target"),
                            );
                        }
                        Some(target_id) if !bx.view_ids.contains(target_id) => {
                            cx.error(
                                "MANIFEST_TARGET_UNKNOWN",
                                "view_modes target view not found",
                                format!("{mpath}.target"),
                            );
                        }
                        _ => {}
                    }
                }
                if let Some(default_mode) = get(block, "default_mode").filter(|v| truthy(v)) {
                    let known = default_mode
                        .as_str()
                        .map(|m| mode_ids.contains(&m))
                        .unwrap_or(false);
                    if !known {
                        cx.error(
                            "MANIFEST_VIEW_MODES_INVALID",
                            "default_mode must match modes[].mode",
                            format!("{bpath}.default_mode"),
                        );
                    }
                }
                if let Some(record_domain) = get(block, "record_domain").filter(|v| !v.is_null()) {
                    validate_condition(cx, record_domain, &format!("{bpath}.record_domain"), 0);
                }
            }
            "related_list" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_RELATED_LIST_KEYS, &bpath);
                match nonempty_str(block, "entity_id") {
                    None => {
                        cx.error(
                            "MANIFEST_RELATED_LIST_ENTITY_INVALID",
                            "related_list.entity_id is required",
                            format!("{bpath}.entity_id"),
                        );
                    }
                    Some(entity_id) if !entity_known(bx.entities, entity_id) => {
                        cx.error(
                            "MANIFEST_RELATED_LIST_ENTITY_UNKNOWN",
                            "related_list.entity_id not found",
                            format!("{bpath}.entity_id"),
                        );
                    }
                    _ => {}
                }
                let target = nonempty_str(block, "target").or_else(|| nonempty_str(block, "view"));
                let target_id = target.and_then(parse_view_target).filter(|t| !t.is_empty());
                match target_id {
                    None => {
                        cx.error(
                            "MANIFEST_TARGET_INVALID",
                            "related_list target must be a view id or view:<id>",
                            format!("{bpath}.target"),
                        );
                    }
                    Some(target_id) if !bx.view_ids.contains(target_id) => {
                        cx.error(
                            "MANIFEST_TARGET_UNKNOWN",
                            "related_list target view not found",
                            format!("{bpath}.target"),
                        );
                    }
                    _ => {}
                }
                if let Some(record_domain) = get(block, "record_domain").filter(|v| !v.is_null()) {
                    validate_condition(cx, record_domain, &format!("{bpath}.record_domain"), 0);
                }
            }
            "chatter" => {
                if !gate_allows(cx, kind, &bpath) {
                    continue;
                }
                reject_unknown_keys(cx, block, ALLOWED_V1_CHATTER_KEYS, &bpath);
                let entity_id = nonempty_str(block, "entity_id").or(record_entity);
                let has_record_ref =
                    nonempty_str(block, "record_ref").is_some() || record_entity.is_some();
                if entity_id.is_none() {
                    cx.error(
                        "MANIFEST_CHATTER_ENTITY_INVALID",
                        "chatter.entity_id is required",
                        format!("{bpath}.entity_id"),
                    );
                }
                if !has_record_ref {
                    cx.error(
                        "MANIFEST_CHATTER_RECORD_REF_INVALID",
                        "chatter.record_ref is required",
                        format!("{bpath}.record_ref"),
                    );
                }
            }
            _ => {
                cx.error(
                    "MANIFEST_BLOCK_KIND_INVALID",
                    "unsupported block kind",
                    format!("{bpath}.kind"),
                );
            }
        }
    }
}

fn recurse_content(
    cx: &mut Vctx,
    holder: &Value,
    hpath: &str,
    bx: &BlockCtx<'_>,
    record_entity: Option<&str>,
    depth: usize,
) {
    let empty = Value::Array(Vec::new());
    let content = get(holder, "content").unwrap_or(&empty);
    check_blocks(cx, content, &format!("{hpath}.content"), bx, record_entity, depth + 1);
}
