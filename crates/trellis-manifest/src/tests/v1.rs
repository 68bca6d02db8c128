use serde_json::json;

use super::has_code;
use crate::validate_manifest_raw;

#[test]
fn valid_v1_targets() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1", "name": "M1"},
        "entities": [
            {
                "id": "entity.item",
                "fields": [
                    {"id": "item.id", "type": "uuid"},
                    {"id": "item.name", "type": "string", "required": true},
                ],
            }
        ],
        "views": [
            {"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.name"}]},
            {"id": "item.form", "entity": "item", "kind": "form", "sections": [{"id": "main", "fields": ["item.name"]}]},
        ],
        "app": {
            "home": "page:home",
            "nav": [
                {"group": "Main", "items": [
                    {"label": "Home", "to": "page:home"},
                    {"label": "Items", "to": "view:item.list"},
                ]}
            ],
        },
        "pages": [
            {
                "id": "home",
                "layout": "single",
                "header": {
                    "actions": [
                        {"kind": "refresh", "label": "Refresh"},
                        {"kind": "open_form", "label": "New", "target": "item.form"},
                        {"kind": "navigate", "label": "All", "target": "view:item.list"},
                    ]
                },
                "content": [{"kind": "view", "target": "item.list"}],
            }
        ],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert_eq!(errors, vec![], "expected clean manifest, got {errors:?}");
}

#[test]
fn unknown_targets_are_reported() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1", "name": "M1"},
        "entities": [{"id": "entity.item", "fields": [{"id": "item.name", "type": "string"}]}],
        "views": [{"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.name"}]}],
        "app": {"home": "page:missing", "nav": [{"group": "Main", "items": [{"label": "Bad", "to": "view:missing"}]}]},
        "pages": [{"id": "home", "content": [{"kind": "view", "target": "missing.view"}]}],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_TARGET_UNKNOWN"));
}

#[test]
fn unknown_top_level_keys_rejected_for_v1() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1", "name": "M1"},
        "entities": [],
        "views": [],
        "app": {"home": "page:home"},
        "pages": [],
        "extra": "nope",
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_UNKNOWN_KEY"));
}

#[test]
fn app_and_pages_require_manifest_version() {
    let manifest = json!({
        "module": {"id": "m1", "name": "M1"},
        "entities": [],
        "views": [],
        "app": {"home": "page:home"},
        "pages": [],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_VERSION_REQUIRED"));
}

#[test]
fn module_id_mismatch_is_reported() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [],
        "views": [],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("other"));
    assert!(has_code(&errors, "MANIFEST_MODULE_ID_MISMATCH"));
}

#[test]
fn field_default_must_match_type() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.item", "fields": [{"id": "item.name", "type": "string", "default": 123}]}
        ],
        "views": [
            {"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.name"}]}
        ],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_FIELD_DEFAULT_INVALID"));
}

#[test]
fn required_readonly_fields_need_defaults() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.item", "fields": [
                {"id": "item.status", "type": "string", "required": true, "readonly": true}
            ]}
        ],
        "views": [
            {"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.status"}]}
        ],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_FIELD_REQUIRED_READONLY_INVALID"));
}

#[test]
fn lookup_without_target_and_display_is_reported() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.child", "fields": [{"id": "child.parent_id", "type": "lookup"}]},
            {"id": "entity.parent", "fields": [{"id": "parent.name", "type": "string"}]},
        ],
        "views": [
            {"id": "child.list", "entity": "child", "kind": "list", "columns": [{"field_id": "child.parent_id"}]}
        ],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(errors.iter().any(|e| e.code.starts_with("MANIFEST_LOOKUP")));
}

#[test]
fn lookup_display_field_checked_against_target_entity() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.child", "fields": [
                {"id": "child.parent_id", "type": "lookup", "entity": "entity.parent", "display_field": "parent.missing"}
            ]},
            {"id": "entity.parent", "fields": [{"id": "parent.name", "type": "string"}]},
        ],
        "views": [],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_LOOKUP_DISPLAY_UNKNOWN"));
}

#[test]
fn external_lookup_target_is_only_a_warning() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.child", "fields": [
                {"id": "child.parent_id", "type": "lookup", "entity": "entity.elsewhere", "display_field": "name"}
            ]},
        ],
        "views": [],
    });
    let (_, errors, warnings) = validate_manifest_raw(&manifest, Some("m1"));
    assert_eq!(errors, vec![]);
    assert!(has_code(&warnings, "MANIFEST_LOOKUP_TARGET_EXTERNAL"));
}

#[test]
fn workflow_cross_checks_pass_for_valid_manifest() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.job", "fields": [
                {"id": "job.status", "type": "enum", "options": ["lead", "install"]},
                {"id": "job.title", "type": "string"},
            ]}
        ],
        "views": [
            {"id": "job.list", "entity": "job", "kind": "list", "columns": [{"field_id": "job.title"}]},
        ],
        "workflows": [
            {
                "id": "job_flow",
                "entity": "entity.job",
                "status_field": "job.status",
                "states": [
                    {"id": "lead", "label": "Lead"},
                    {"id": "install", "label": "Install"},
                ],
                "transitions": [{"from": "lead", "to": "install", "label": "Approve"}],
            }
        ],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert_eq!(errors, vec![]);
}

#[test]
fn workflow_transition_must_reference_states() {
    let manifest = json!({
        "manifest_version": "1.0",
        "module": {"id": "m1"},
        "entities": [
            {"id": "entity.job", "fields": [{"id": "job.status", "type": "string"}]}
        ],
        "views": [],
        "workflows": [
            {
                "id": "job_flow",
                "entity": "entity.job",
                "status_field": "job.status",
                "states": [{"id": "lead"}],
                "transitions": [{"from": "lead", "to": "done"}],
            }
        ],
    });
    let (_, errors, _) = validate_manifest_raw(&manifest, Some("m1"));
    assert!(has_code(&errors, "MANIFEST_WORKFLOW_TRANSITION_UNKNOWN"));
}
