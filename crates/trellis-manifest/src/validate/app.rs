//! The v1 application surface: `app` (home, nav, defaults) and `pages`.
//! Structural checks run first; target resolution against the declared
//! page/view sets runs as a second pass once all ids are known.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::blocks::{BlockCtx, check_blocks};
use super::{
    ActionMap, EntityMap, Vctx, get, get_str, nonempty_str, parse_target, reject_unknown_keys,
    validate_condition,
};
use crate::catalog::{
    ALLOWED_V1_ACTION_KINDS, ALLOWED_V1_APP_KEYS, ALLOWED_V1_NAV_GROUP_KEYS,
    ALLOWED_V1_NAV_ITEM_KEYS, ALLOWED_V1_PAGE_ACTION_KEYS, ALLOWED_V1_PAGE_HEADER_KEYS,
    ALLOWED_V1_PAGE_KEYS,
};

pub(crate) fn check_app_and_pages(
    cx: &mut Vctx,
    manifest: &Value,
    entities: &EntityMap<'_>,
    action_by_id: &ActionMap<'_>,
    view_ids: &BTreeSet<String>,
) {
    let mut app_def = get(manifest, "app");
    if let Some(app) = app_def {
        if !app.is_object() {
            cx.error("MANIFEST_APP_INVALID", "app must be an object", "app");
            app_def = None;
        }
    }
    let pages = get(manifest, "pages");

    if let Some(app) = app_def {
        check_app_structure(cx, app, pages);
    }

    let pages = match pages {
        None | Some(Value::Null) => None,
        Some(Value::Array(pages)) => Some(pages.as_slice()),
        Some(_) => {
            cx.error("MANIFEST_PAGES_INVALID", "pages must be a list", "pages");
            None
        }
    };

    let mut page_by_id: BTreeMap<&str, &Value> = BTreeMap::new();
    if let Some(pages) = pages {
        for (pidx, page) in pages.iter().enumerate() {
            let ppath = format!("pages[{pidx}]");
            if !page.is_object() {
                cx.error("MANIFEST_PAGE_INVALID", "page must be an object", ppath);
                continue;
            }
            reject_unknown_keys(cx, page, ALLOWED_V1_PAGE_KEYS, &ppath);
            let page_id = match nonempty_str(page, "id") {
                Some(page_id) => page_id,
                None => {
                    cx.error("MANIFEST_PAGE_ID_INVALID", "page.id is required", format!("{ppath}.id"));
                    continue;
                }
            };
            page_by_id.insert(page_id, page);

            if let Some(layout) = get(page, "layout").filter(|v| !v.is_null()) {
                if layout.as_str() != Some("single") {
                    cx.error(
                        "MANIFEST_PAGE_LAYOUT_INVALID",
                        "page.layout must be 'single' when provided",
                        format!("{ppath}.layout"),
                    );
                }
            }
            if let Some(header) = get(page, "header").filter(|v| !v.is_null()) {
                check_page_header(cx, header, &ppath, action_by_id);
            }

            let empty = Value::Array(Vec::new());
            let content = get(page, "content").unwrap_or(&empty);
            let bx = BlockCtx {
                view_ids,
                entities,
                actions: action_by_id,
            };
            check_blocks(cx, content, &format!("{ppath}.content"), &bx, None, 0);
        }
    }

    if let Some(app) = app_def {
        resolve_app_targets(cx, app, &page_by_id, view_ids);
    }
    if let Some(pages) = pages {
        resolve_page_header_targets(cx, pages, action_by_id, &page_by_id, view_ids);
    }
}

fn check_app_structure(cx: &mut Vctx, app: &Value, pages: Option<&Value>) {
    reject_unknown_keys(cx, app, ALLOWED_V1_APP_KEYS, "app");
    let home_ok = get_str(app, "home")
        .map(|home| parse_target(home).is_some())
        .unwrap_or(false);
    if !home_ok {
        cx.error(
            "MANIFEST_APP_HOME_INVALID",
            "app.home must be page:<id> or view:<id>",
            "app.home",
        );
    }

    if let Some(defaults) = get(app, "defaults").filter(|v| !v.is_null()) {
        if !defaults.is_object() {
            cx.error(
                "MANIFEST_APP_DEFAULTS_INVALID",
                "app.defaults must be an object",
                "app.defaults",
            );
        } else {
            for key in ["entity_home_page", "entity_form_page"] {
                if let Some(value) = get(defaults, key).filter(|v| !v.is_null()) {
                    let ok = value.as_str().map(|t| parse_target(t).is_some()).unwrap_or(false);
                    if !ok {
                        cx.error(
                            "MANIFEST_APP_DEFAULTS_INVALID",
                            &format!("{key} must be page:<id> or view:<id>"),
                            format!("app.defaults.{key}"),
                        );
                    }
                }
            }
            if let Some(entities_defaults) = get(defaults, "entities").filter(|v| !v.is_null()) {
                match entities_defaults.as_object() {
                    None => {
                        cx.error(
                            "MANIFEST_APP_DEFAULTS_INVALID",
                            "defaults.entities must be an object",
                            "app.defaults.entities",
                        );
                    }
                    Some(entities_defaults) => {
                        let page_ids: BTreeSet<&str> = pages
                            .and_then(Value::as_array)
                            .map(|pages| {
                                pages.iter().filter_map(|p| get_str(p, "id")).collect()
                            })
                            .unwrap_or_default();
                        for (ent_key, ent_defaults) in entities_defaults {
                            let epath = format!("app.defaults.entities.{ent_key}");
                            if !ent_defaults.is_object() {
                                cx.error(
                                    "MANIFEST_APP_DEFAULTS_INVALID",
                                    "entity defaults must be object",
                                    epath,
                                );
                                continue;
                            }
                            for name in ["entity_home_page", "entity_form_page"] {
                                let value = match get(ent_defaults, name).filter(|v| !v.is_null()) {
                                    None => continue,
                                    Some(value) => value,
                                };
                                let parsed = value.as_str().and_then(parse_target);
                                match parsed {
                                    Some(("page", ident)) => {
                                        if !page_ids.contains(ident) {
                                            cx.error(
                                                "MANIFEST_TARGET_UNKNOWN",
                                                &format!("{name} page not found"),
                                                format!("{epath}.{name}"),
                                            );
                                        }
                                    }
                                    _ => {
                                        cx.error(
                                            "MANIFEST_APP_DEFAULTS_INVALID",
                                            &format!("{name} must be page:<id>"),
                                            format!("{epath}.{name}"),
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

    let nav = match get(app, "nav").filter(|v| !v.is_null()) {
        None => return,
        Some(Value::Array(nav)) => nav,
        Some(_) => {
            cx.error("MANIFEST_APP_NAV_INVALID", "app.nav must be a list", "app.nav");
            return;
        }
    };
    for (gidx, group) in nav.iter().enumerate() {
        let gpath = format!("app.nav[{gidx}]");
        if !group.is_object() {
            cx.error("MANIFEST_APP_NAV_INVALID", "nav group must be an object", gpath);
            continue;
        }
        reject_unknown_keys(cx, group, ALLOWED_V1_NAV_GROUP_KEYS, &gpath);
        let items = match get(group, "items").and_then(Value::as_array) {
            None => {
                cx.error(
                    "MANIFEST_APP_NAV_INVALID",
                    "nav group items must be a list",
                    format!("{gpath}.items"),
                );
                continue;
            }
            Some(items) => items,
        };
        for (iidx, item) in items.iter().enumerate() {
            let ipath = format!("{gpath}.items[{iidx}]");
            if !item.is_object() {
                cx.error("MANIFEST_APP_NAV_INVALID", "nav item must be an object", ipath);
                continue;
            }
            reject_unknown_keys(cx, item, ALLOWED_V1_NAV_ITEM_KEYS, &ipath);
            if nonempty_str(item, "label").is_none() {
                cx.error(
                    "MANIFEST_APP_NAV_INVALID",
                    "nav item label is required",
                    format!("{ipath}.label"),
                );
            }
            let ok = get_str(item, "to").map(|t| parse_target(t).is_some()).unwrap_or(false);
            if !ok {
                cx.error(
                    "MANIFEST_TARGET_INVALID",
                    "nav item target must be page:<id> or view:<id>",
                    format!("{ipath}.to"),
                );
            }
        }
    }
}

fn check_page_header(cx: &mut Vctx, header: &Value, ppath: &str, action_by_id: &ActionMap<'_>) {
    if !header.is_object() {
        cx.error(
            "MANIFEST_PAGE_HEADER_INVALID",
            "page.header must be an object",
            format!("{ppath}.header"),
        );
        return;
    }
    reject_unknown_keys(cx, header, ALLOWED_V1_PAGE_HEADER_KEYS, &format!("{ppath}.header"));
    if let Some(variant) = get(header, "variant").filter(|v| !v.is_null()) {
        if !matches!(variant.as_str(), Some("default") | Some("none")) {
            cx.error(
                "MANIFEST_PAGE_HEADER_INVALID",
                "page.header.variant must be default|none",
                format!("{ppath}.header.variant"),
            );
        }
    }
    let actions = match get(header, "actions").filter(|v| !v.is_null()) {
        None => return,
        Some(Value::Array(actions)) => actions,
        Some(_) => {
            cx.error(
                "MANIFEST_PAGE_ACTIONS_INVALID",
                "page.header.actions must be a list",
                format!("{ppath}.header.actions"),
            );
            return;
        }
    };
    for (aidx, action) in actions.iter().enumerate() {
        let apath = format!("{ppath}.header.actions[{aidx}]");
        if !action.is_object() {
            cx.error("MANIFEST_PAGE_ACTION_INVALID", "action must be an object", apath);
            continue;
        }
        reject_unknown_keys(cx, action, ALLOWED_V1_PAGE_ACTION_KEYS, &apath);
        if let Some(action_ref) = get(action, "action_id").filter(|v| !v.is_null()) {
            if !cx.conditions_allowed() {
                cx.error(
                    "MANIFEST_PAGE_ACTION_INVALID",
                    "action_id requires manifest_version >= 1.2",
                    format!("{apath}.action_id"),
                );
            } else {
                let known = action_ref
                    .as_str()
                    .map(|id| action_by_id.contains_key(id))
                    .unwrap_or(false);
                if !known {
                    cx.error(
                        "MANIFEST_PAGE_ACTION_INVALID",
                        "action_id not found",
                        format!("{apath}.action_id"),
                    );
                }
            }
        }
        if let Some(kind) = get(action, "kind").filter(|v| !v.is_null()) {
            let kind = kind.as_str().unwrap_or_default();
            if !cx.conditions_allowed() && !matches!(kind, "navigate" | "open_form" | "refresh") {
                cx.error(
                    "MANIFEST_PAGE_ACTION_INVALID",
                    "action.kind requires manifest_version >= 1.2",
                    format!("{apath}.kind"),
                );
            }
            if !ALLOWED_V1_ACTION_KINDS.contains(&kind) {
                cx.error(
                    "MANIFEST_PAGE_ACTION_INVALID",
                    "action.kind must be allowlisted",
                    format!("{apath}.kind"),
                );
            }
            let target = get(action, "target");
            match kind {
                "navigate" => {
                    let ok = target
                        .and_then(Value::as_str)
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
                    let bare_view = target
                        .and_then(Value::as_str)
                        .map(|t| !t.starts_with("page:") && !t.starts_with("view:"))
                        .unwrap_or(false);
                    if !bare_view {
                        cx.error(
                            "MANIFEST_PAGE_ACTION_INVALID",
                            "open_form target must be a view id",
                            format!("{apath}.target"),
                        );
                    }
                }
                "refresh" => {
                    if target.filter(|v| !v.is_null()).is_some() {
                        cx.error(
                            "MANIFEST_PAGE_ACTION_INVALID",
                            "refresh must not include target",
                            format!("{apath}.target"),
                        );
                    }
                }
                _ => {}
            }
        }
        for key in ["visible_when", "enabled_when"] {
            if let Some(cond) = get(action, key).filter(|v| !v.is_null()) {
                if !cx.conditions_allowed() {
                    cx.error(
                        "MANIFEST_PAGE_ACTION_INVALID",
                        &format!("{key} requires manifest_version >= 1.2"),
                        format!("{apath}.{key}"),
                    );
                } else {
                    validate_condition(cx, cond, &format!("{apath}.{key}"), 0);
                }
            }
        }
    }
}

fn resolve_app_targets(
    cx: &mut Vctx,
    app: &Value,
    page_by_id: &BTreeMap<&str, &Value>,
    view_ids: &BTreeSet<String>,
) {
    if let Some(home) = get_str(app, "home") {
        if let Some((kind, ident)) = parse_target(home) {
            if kind == "page" && !page_by_id.contains_key(ident) {
                cx.error("MANIFEST_TARGET_UNKNOWN", "app.home page not found", "app.home");
            }
            if kind == "view" && !view_ids.contains(ident) {
                cx.error("MANIFEST_TARGET_UNKNOWN", "app.home view not found", "app.home");
            }
        }
    }
    if let Some(nav) = get(app, "nav").and_then(Value::as_array) {
        for (gidx, group) in nav.iter().enumerate() {
            let items = match get(group, "items").and_then(Value::as_array) {
                None => continue,
                Some(items) => items,
            };
            for (iidx, item) in items.iter().enumerate() {
                let parsed = get_str(item, "to").and_then(parse_target);
                if let Some((kind, ident)) = parsed {
                    if kind == "page" && !page_by_id.contains_key(ident) {
                        cx.error(
                            "MANIFEST_TARGET_UNKNOWN",
                            "nav target page not found",
                            format!("app.nav[{gidx}].items[{iidx}].to"),
                        );
                    }
                    if kind == "view" && !view_ids.contains(ident) {
                        cx.error(
                            "MANIFEST_TARGET_UNKNOWN",
                            "nav target view not found",
                            format!("app.nav[{gidx}].items[{iidx}].to"),
                        );
                    }
                }
            }
        }
    }
}

/// Page header actions resolve through their referenced action (if any); the
/// action's own target wins over an inline one.
fn resolve_page_header_targets(
    cx: &mut Vctx,
    pages: &[Value],
    action_by_id: &ActionMap<'_>,
    page_by_id: &BTreeMap<&str, &Value>,
    view_ids: &BTreeSet<String>,
) {
    for (pidx, page) in pages.iter().enumerate() {
        let actions = match get(page, "header").and_then(|h| get(h, "actions")).and_then(Value::as_array)
        {
            None => continue,
            Some(actions) => actions,
        };
        for (aidx, action) in actions.iter().enumerate() {
            if !action.is_object() {
                continue;
            }
            let resolved = get_str(action, "action_id").and_then(|id| action_by_id.get(id)).copied();
            let kind = resolved
                .and_then(|r| get_str(r, "kind"))
                .or_else(|| get_str(action, "kind"));
            let target = resolved
                .and_then(|r| get(r, "target"))
                .filter(|v| !v.is_null())
                .or_else(|| get(action, "target"));
            let target = target.and_then(Value::as_str);
            match kind {
                Some("navigate") => {
                    if let Some((kind_name, ident)) = target.and_then(parse_target) {
                        if kind_name == "page" && !page_by_id.contains_key(ident) {
                            cx.error(
                                "MANIFEST_TARGET_UNKNOWN",
                                "navigate target page not found",
                                format!("pages[{pidx}].header.actions[{aidx}].target"),
                            );
                        }
                        if kind_name == "view" && !view_ids.contains(ident) {
                            cx.error(
                                "MANIFEST_TARGET_UNKNOWN",
                                "navigate target view not found",
                                format!("pages[{pidx}].header.actions[{aidx}].target"),
                            );
                        }
                    }
                }
                Some("open_form") => {
                    if let Some(target) = target {
                        if !view_ids.contains(target) {
                            cx.error(
                                "MANIFEST_TARGET_UNKNOWN",
                                "open_form target view not found",
                                format!("pages[{pidx}].header.actions[{aidx}].target"),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
