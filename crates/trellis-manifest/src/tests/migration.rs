use serde_json::json;

use crate::normalize_manifest;

#[test]
fn legacy_fields_migrate_to_columns_and_sections() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module_id": "legacy",
        "name": "Legacy",
        "entities": [{"id": "item", "fields": [{"id": "item.name", "type": "string"}]}],
        "views": [
            {"id": "item.list", "type": "list", "entity": "item", "fields": ["item.name"]},
            {"id": "item.form", "type": "form", "entity": "item", "fields": ["item.name"]},
        ],
        "pages": [],
    });
    let normalized = normalize_manifest(&manifest);
    assert_eq!(normalized["module"]["id"], json!("legacy"));
    let list_view = &normalized["views"][0];
    let form_view = &normalized["views"][1];
    assert_eq!(list_view["kind"], json!("list"));
    assert_eq!(list_view["columns"], json!([{"field_id": "item.name"}]));
    assert_eq!(form_view["kind"], json!("form"));
    assert_eq!(form_view["sections"][0]["fields"], json!(["item.name"]));
    assert_eq!(list_view["entity"], json!("item"));
    assert_eq!(form_view["entity"], json!("item"));
}

#[test]
fn module_name_derived_from_legacy_id() {
    let normalized = normalize_manifest(&json!({"module_id": "job_management"}));
    assert_eq!(normalized["module"]["name"], json!("Job Management"));
    assert_eq!(normalized["manifest_version"], json!("0.x"));
}

#[test]
fn entity_maps_become_lists() {
    let manifest = json!({
        "entities": {
            "entity.item": {
                "fields": {
                    "item.kind": {"type": "enum", "values": ["small", "big_one"]},
                }
            }
        }
    });
    let normalized = normalize_manifest(&manifest);
    let entity = &normalized["entities"][0];
    assert_eq!(entity["id"], json!("entity.item"));
    let field = &entity["fields"][0];
    assert_eq!(field["id"], json!("item.kind"));
    assert_eq!(
        field["options"],
        json!([
            {"value": "small", "label": "Small"},
            {"value": "big_one", "label": "Big One"},
        ])
    );
}

#[test]
fn workflow_maps_become_lists() {
    let manifest = json!({
        "workflows": {"flow": {"id": "flow", "entity": "entity.item"}}
    });
    let normalized = normalize_manifest(&manifest);
    assert_eq!(normalized["workflows"][0]["id"], json!("flow"));
}

#[test]
fn view_block_targets_gain_prefix() {
    let manifest = json!({
        "manifest_version": "1.1",
        "module": {"id": "m1"},
        "pages": [{"id": "home", "content": [{"kind": "view", "target": "item.list"}]}],
    });
    let normalized = normalize_manifest(&manifest);
    assert_eq!(
        normalized["pages"][0]["content"][0]["target"],
        json!("view:item.list")
    );
}

#[test]
fn unknown_top_level_keys_are_preserved() {
    let normalized = normalize_manifest(&json!({"module": {"id": "m1"}, "queries": [1, 2]}));
    assert_eq!(normalized["queries"], json!([1, 2]));
}

#[test]
fn normalization_is_idempotent() {
    let manifest = json!({
        "manifest_version": "1.3",
        "module_id": "m1",
        "entities": {
            "entity.item": {
                "fields": [{"id": "item.kind", "type": "enum", "options": ["a", "b"]}],
            }
        },
        "views": [
            {"id": "item.list", "type": "list", "entityId": "item", "fields": ["item.kind"]},
        ],
        "pages": [{"id": "home", "content": [{"kind": "view", "target": "item.list"}]}],
        "workflows": {},
    });
    let once = normalize_manifest(&manifest);
    let twice = normalize_manifest(&once);
    assert_eq!(once, twice);
}
