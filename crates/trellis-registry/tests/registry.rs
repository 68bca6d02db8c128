use std::sync::Arc;

use serde_json::{Value, json};

use trellis_registry::{ModuleRegistry, RollbackTarget, build_diagnostics};
use trellis_store::{AuditAction, MemBackend, ModuleStatus};

fn registry() -> ModuleRegistry<MemBackend> {
    ModuleRegistry::new(Arc::new(MemBackend::new()), "default".into())
}

fn init_m1(registry: &ModuleRegistry<MemBackend>) -> String {
    let manifest = json!({"module": {"id": "m1", "name": "Module One"}, "entities": []});
    registry
        .store()
        .init_module("m1", &manifest, Some(&json!({"id": "u1"})), "init")
        .unwrap()
}

fn approved(from_hash: &str, ops: Value) -> Value {
    json!({
        "patch": {
            "patch_id": "p1",
            "target_module_id": "m1",
            "target_manifest_hash": from_hash,
            "mode": "preview",
            "reason": "install",
            "metadata": null,
        },
        "preview": {
            "ok": true,
            "resolved_ops": ops,
        },
        "approved_by": {"id": "u1", "roles": ["admin"]},
        "approved_at": "2026-01-29T01:23:45Z",
    })
}

fn add_job_entity(from_hash: &str) -> Value {
    approved(
        from_hash,
        json!([{"op": "add", "path": "/entities/0", "value": {"id": "entity.job"}}]),
    )
}

#[test]
fn register_requires_manifest_head() {
    let registry = registry();
    let result = registry.register("m1", Some("M1"), None, "register").unwrap();
    assert!(!result.ok);
    assert_eq!(result.errors[0].code, "MODULE_NO_MANIFEST_HEAD");
}

#[test]
fn register_creates_disabled_record() {
    let registry = registry();
    let head = init_m1(&registry);
    let result = registry.register("m1", None, None, "register").unwrap();
    assert!(result.ok, "{:?}", result.errors);
    let module = result.module.unwrap();
    assert!(!module.enabled);
    assert_eq!(module.current_hash, head);
    assert_eq!(module.status, ModuleStatus::Installed);
    assert_eq!(module.active_version, None);
    // Name falls back to the manifest's module.name.
    assert_eq!(module.name.as_deref(), Some("Module One"));

    let dup = registry.register("m1", None, None, "register").unwrap();
    assert_eq!(dup.errors[0].code, "MODULE_ALREADY_REGISTERED");
}

#[test]
fn install_auto_registers_and_enables() {
    let registry = registry();
    let head = init_m1(&registry);
    let result = registry.install(&add_job_entity(&head)).unwrap();
    assert!(result.ok, "{:?}", result.errors);
    let module = result.module.unwrap();
    assert!(module.enabled);
    assert_eq!(module.module_id, "m1");
    assert_eq!(module.status, ModuleStatus::Installed);
    assert!(module.active_version.is_some());

    let versions = registry.list_versions("m1").unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_num, 1);
}

#[test]
fn upgrade_requires_existing_module() {
    let registry = registry();
    let head = init_m1(&registry);
    let result = registry.upgrade(&add_job_entity(&head)).unwrap();
    assert!(!result.ok);
    assert_eq!(result.errors[0].code, "MODULE_NOT_FOUND");
}

#[test]
fn upgrade_advances_hash_and_version() {
    let registry = registry();
    let head = init_m1(&registry);
    let install = registry.install(&add_job_entity(&head)).unwrap();
    let first = install.module.unwrap();

    let next = approved(
        &first.current_hash,
        json!([{"op": "add", "path": "/entities/1", "value": {"id": "entity.note"}}]),
    );
    let result = registry.upgrade(&next).unwrap();
    assert!(result.ok, "{:?}", result.errors);
    let module = result.module.unwrap();
    assert_ne!(module.current_hash, first.current_hash);
    assert_ne!(module.active_version, first.active_version);

    let versions = registry.list_versions("m1").unwrap();
    assert_eq!(
        versions.iter().map(|v| v.version_num).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn failed_upgrade_marks_module_failed() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();

    let stale = approved(
        "sha256:0000000000000000000000000000000000000000000000000000000000000000",
        json!([]),
    );
    let result = registry.upgrade(&stale).unwrap();
    assert!(!result.ok);
    assert_eq!(result.errors[0].code, "APPLY_HASH_MISMATCH");

    let module = registry.get("m1").unwrap().unwrap();
    assert_eq!(module.status, ModuleStatus::Failed);
    assert!(module.last_error.is_some());
}

#[test]
fn install_failure_leaves_no_record() {
    let registry = registry();
    init_m1(&registry);
    let result = registry.install(&approved("sha256:bad", json!([]))).unwrap();
    assert!(!result.ok);
    assert!(registry.get("m1").unwrap().is_none());
}

#[test]
fn rollback_by_version_id_restores_hash() {
    let registry = registry();
    let head = init_m1(&registry);
    let install = registry.install(&add_job_entity(&head)).unwrap();
    let installed = install.module.unwrap();

    let next = approved(
        &installed.current_hash,
        json!([{"op": "add", "path": "/entities/1", "value": {"id": "entity.note"}}]),
    );
    registry.upgrade(&next).unwrap();

    let versions = registry.list_versions("m1").unwrap();
    let first_version = &versions[0];
    let result = registry
        .rollback(
            "m1",
            RollbackTarget::version_id(first_version.version_id.clone()),
            Some(&json!({"id": "u1"})),
            "rollback",
        )
        .unwrap();
    assert!(result.ok, "{:?}", result.errors);

    let module = registry.get("m1").unwrap().unwrap();
    assert_eq!(module.current_hash, first_version.manifest_hash);
    assert_eq!(module.active_version.as_deref(), Some(first_version.version_id.as_str()));

    let history = registry.history("m1").unwrap();
    assert_eq!(history[0].action, AuditAction::Rollback);
}

#[test]
fn rollback_to_unversioned_snapshot_creates_version() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();

    // The init snapshot predates versioning; rolling back to it mints one.
    let result = registry
        .rollback("m1", RollbackTarget::hash(head.clone()), None, "rollback")
        .unwrap();
    assert!(result.ok, "{:?}", result.errors);
    assert!(result.warnings.iter().any(|w| w.code == "MODULE_VERSION_CREATED"));

    let versions = registry.list_versions("m1").unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].manifest_hash, head);
}

#[test]
fn rollback_to_current_snapshot_warns() {
    let registry = registry();
    let head = init_m1(&registry);
    let install = registry.install(&add_job_entity(&head)).unwrap();
    let current = install.module.unwrap().current_hash;

    let result = registry
        .rollback("m1", RollbackTarget::hash(current), None, "noop")
        .unwrap();
    assert!(result.ok);
    assert!(result.warnings.iter().any(|w| w.code == "MODULE_ALREADY_AT_SNAPSHOT"));
}

#[test]
fn rollback_unknown_version_fails() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();
    let result = registry
        .rollback("m1", RollbackTarget::version_num(99), None, "rollback")
        .unwrap();
    assert!(!result.ok);
    assert_eq!(result.errors[0].code, "ROLLBACK_UNKNOWN_VERSION");
}

#[test]
fn enable_disable_round_trip() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();

    let result = registry.set_enabled("m1", false, None, "disable").unwrap();
    assert!(result.ok);
    assert!(!result.module.unwrap().enabled);

    let result = registry.set_enabled("m1", true, None, "enable").unwrap();
    assert!(result.ok);
    assert!(result.module.unwrap().enabled);

    let again = registry.set_enabled("m1", true, None, "enable").unwrap();
    assert!(again.warnings.iter().any(|w| w.code == "MODULE_ENABLED_NOOP"));
}

#[test]
fn history_is_newest_first() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();
    registry.set_enabled("m1", false, None, "disable").unwrap();
    let history = registry.history("m1").unwrap();
    assert_eq!(history[0].action, AuditAction::Disable);
    assert_eq!(history[1].action, AuditAction::Install);
}

#[test]
fn archived_modules_are_hidden_from_list() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();
    assert_eq!(registry.list().unwrap().len(), 1);
    registry.set_archived("m1", true).unwrap();
    assert!(registry.list().unwrap().is_empty());
    assert!(registry.get("m1").unwrap().is_some());
}

#[test]
fn icon_and_display_order_metadata() {
    let registry = registry();
    let head = init_m1(&registry);
    registry.install(&add_job_entity(&head)).unwrap();
    registry.set_icon("m1", "briefcase").unwrap();
    registry.set_display_order("m1", Some(3)).unwrap();
    let module = registry.get("m1").unwrap().unwrap();
    assert_eq!(module.icon_key.as_deref(), Some("briefcase"));
    assert_eq!(module.display_order, Some(3));
    registry.clear_icon("m1").unwrap();
    assert_eq!(registry.get("m1").unwrap().unwrap().icon_key, None);
}

#[test]
fn diagnostics_summarize_enabled_modules() {
    let registry = registry();
    let manifest = json!({
        "manifest_version": "1.3",
        "module": {"id": "m1", "name": "Module One", "version": "2.0.0"},
        "entities": [{"id": "entity.item", "fields": [{"id": "item.name", "type": "string"}]}],
        "views": [{"id": "item.list", "entity": "item", "kind": "list", "columns": [{"field_id": "item.name"}]}],
        "app": {"home": "page:home"},
        "pages": [{"id": "home", "content": [{"kind": "view", "target": "item.list"}]}],
    });
    let head = registry.store().init_module("m1", &manifest, None, "init").unwrap();
    registry.install(&approved(&head, json!([]))).unwrap();

    let diagnostics = build_diagnostics(&registry).unwrap();
    assert_eq!(diagnostics.len(), 1);
    let diag = &diagnostics[0];
    assert_eq!(diag.module_id, "m1");
    assert!(diag.has_app_home);
    assert_eq!(diag.home_type.as_deref(), Some("page"));
    assert_eq!(diag.home_id.as_deref(), Some("home"));
    assert_eq!(diag.counts.entities, 1);
    assert_eq!(diag.counts.views, 1);
    assert_eq!(diag.counts.pages, 1);
    assert_eq!(diag.module_version.as_deref(), Some("2.0.0"));
}
