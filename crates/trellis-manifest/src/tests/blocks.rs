use serde_json::{Value, json};

use super::has_code;
use crate::validate_manifest_raw;

fn base_manifest() -> Value {
    json!({
        "manifest_version": "1.1",
        "module": {"id": "m1", "name": "M1"},
        "entities": [
            {"id": "entity.item", "fields": [{"id": "item.name", "type": "string"}]},
        ],
        "views": [
            {"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.name"}]},
            {"id": "item.form", "entity": "item", "kind": "form", "sections": [{"id": "main", "fields": ["item.name"]}]},
        ],
    })
}

#[test]
fn grids_and_tabs_validate_clean() {
    let mut manifest = base_manifest();
    manifest["pages"] = json!([
        {
            "id": "home",
            "content": [
                {
                    "kind": "grid",
                    "columns": 12,
                    "items": [
                        {"span": 4, "content": [{"kind": "view", "target": "item.list"}]},
                        {
                            "span": 8,
                            "content": [
                                {
                                    "kind": "tabs",
                                    "tabs": [
                                        {"id": "details", "label": "Details", "content": [{"kind": "view", "target": "item.form"}]},
                                        {"id": "history", "label": "History", "content": [{"kind": "text", "text": "Hi"}]},
                                    ],
                                    "default_tab": "details",
                                }
                            ],
                        },
                    ],
                }
            ],
        }
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert_eq!(errors, vec![], "{errors:?}");
}

#[test]
fn grid_span_must_be_within_columns() {
    let mut manifest = base_manifest();
    manifest["pages"] = json!([
        {"id": "home", "content": [{"kind": "grid", "columns": 12, "items": [{"span": 20, "content": []}]}]}
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_GRID_SPAN_INVALID"));
}

#[test]
fn grid_columns_are_fixed_at_twelve() {
    let mut manifest = base_manifest();
    manifest["pages"] = json!([
        {"id": "home", "content": [{"kind": "grid", "columns": 6, "items": [{"span": 3, "content": []}]}]}
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_GRID_COLUMNS_INVALID"));
}

#[test]
fn duplicate_tab_ids_are_rejected() {
    let mut manifest = base_manifest();
    manifest["pages"] = json!([
        {
            "id": "home",
            "content": [
                {
                    "kind": "tabs",
                    "tabs": [
                        {"id": "dup", "label": "A", "content": []},
                        {"id": "dup", "label": "B", "content": []},
                    ],
                }
            ],
        }
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_TAB_ID_DUPLICATE"));
}

#[test]
fn default_tab_must_exist() {
    let mut manifest = base_manifest();
    manifest["pages"] = json!([
        {
            "id": "home",
            "content": [
                {"kind": "tabs", "tabs": [{"id": "one", "content": []}], "default_tab": "two"}
            ],
        }
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_TAB_DEFAULT_INVALID"));
}

#[test]
fn block_nesting_depth_is_limited() {
    let mut block = json!({"kind": "stack", "content": []});
    for _ in 0..8 {
        block = json!({"kind": "stack", "content": [block]});
    }
    let mut manifest = base_manifest();
    manifest["pages"] = json!([{"id": "home", "content": [block]}]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_BLOCK_DEPTH"));
}

#[test]
fn layout_blocks_are_gated_below_v11() {
    let mut manifest = base_manifest();
    manifest["manifest_version"] = json!("1.0");
    manifest["pages"] = json!([
        {"id": "home", "content": [{"kind": "stack", "content": []}]}
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_BLOCK_KIND_INVALID"));
}

#[test]
fn view_modes_block_validates_clean() {
    let mut manifest = base_manifest();
    manifest["manifest_version"] = json!("1.3");
    manifest["entities"] = json!([
        {
            "id": "entity.item",
            "fields": [
                {"id": "item.name", "type": "string"},
                {"id": "item.status", "type": "enum", "options": [{"value": "new", "label": "New"}]},
            ],
        }
    ]);
    manifest["views"] = json!([
        {"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.name"}]},
        {
            "id": "item.kanban",
            "entity": "item",
            "kind": "kanban",
            "card": {"title_field": "item.name", "subtitle_fields": ["item.status"]},
        },
        {
            "id": "item.graph",
            "entity": "item",
            "kind": "graph",
            "default": {"type": "bar", "group_by": "item.status", "measure": "count"},
        },
    ]);
    manifest["pages"] = json!([
        {
            "id": "home",
            "content": [
                {
                    "kind": "view_modes",
                    "entity_id": "entity.item",
                    "default_mode": "list",
                    "modes": [
                        {"mode": "list", "target": "view:item.list"},
                        {"mode": "kanban", "target": "view:item.kanban"},
                        {"mode": "graph", "target": "view:item.graph"},
                    ],
                }
            ],
        }
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert_eq!(errors, vec![], "{errors:?}");
}

#[test]
fn unknown_block_kind_is_rejected() {
    let mut manifest = base_manifest();
    manifest["pages"] = json!([
        {"id": "home", "content": [{"kind": "carousel"}]}
    ]);
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_BLOCK_KIND_INVALID"));
}
