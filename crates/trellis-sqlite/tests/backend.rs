use std::sync::Arc;

use serde_json::{Value, json};

use trellis_registry::{ModuleRegistry, RollbackTarget};
use trellis_sqlite::SqliteBackend;
use trellis_store::{AuditAction, ManifestStore, ModuleStatus};

fn backend() -> Arc<SqliteBackend> {
    Arc::new(SqliteBackend::open_in_memory().unwrap())
}

fn base_manifest() -> Value {
    json!({"module": {"id": "m1", "name": "Module One"}, "entities": []})
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
        "preview": {"ok": true, "resolved_ops": ops},
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
fn store_lifecycle_matches_memory_semantics() {
    let store = ManifestStore::new(backend(), "default".into());
    let head = store.init_module("m1", &base_manifest(), None, "init").unwrap();
    assert_eq!(store.get_head("m1").unwrap(), Some(head.clone()));

    let result = store.apply_approved_preview(&add_job_entity(&head)).unwrap();
    assert!(result.ok, "{:?}", result.errors);
    let to_hash = result.to_hash.unwrap();
    assert_eq!(store.get_head("m1").unwrap(), Some(to_hash.clone()));

    let snapshot = store.get_snapshot("m1", &to_hash).unwrap().unwrap();
    assert_eq!(snapshot["entities"][0]["id"], json!("entity.job"));

    let rb = store.rollback("m1", &head, None, "rollback").unwrap();
    assert!(rb.ok);
    assert_eq!(store.get_head("m1").unwrap(), Some(head));

    let history = store.list_history("m1").unwrap();
    assert_eq!(history[0].action, AuditAction::Rollback);
    assert_eq!(history[1].action, AuditAction::Apply);
    assert_eq!(history[2].action, AuditAction::Init);
    assert_eq!(store.list_snapshots("m1").unwrap().len(), 2);
}

#[test]
fn stale_apply_is_rejected() {
    let store = ManifestStore::new(backend(), "default".into());
    let head = store.init_module("m1", &base_manifest(), None, "init").unwrap();
    store.apply_approved_preview(&add_job_entity(&head)).unwrap();

    let stale = store.apply_approved_preview(&add_job_entity(&head)).unwrap();
    assert!(!stale.ok);
    assert_eq!(stale.errors[0].code, "APPLY_HASH_MISMATCH");
}

#[test]
fn registry_lifecycle_over_sqlite() {
    let registry = ModuleRegistry::new(backend(), "default".into());
    let head = registry
        .store()
        .init_module("m1", &base_manifest(), None, "init")
        .unwrap();

    let install = registry.install(&add_job_entity(&head)).unwrap();
    assert!(install.ok, "{:?}", install.errors);
    let module = install.module.unwrap();
    assert!(module.enabled);
    assert_eq!(module.status, ModuleStatus::Installed);
    assert_eq!(module.name.as_deref(), Some("Module One"));

    let next = approved(
        &module.current_hash,
        json!([{"op": "add", "path": "/entities/1", "value": {"id": "entity.note"}}]),
    );
    let upgrade = registry.upgrade(&next).unwrap();
    assert!(upgrade.ok, "{:?}", upgrade.errors);

    let versions = registry.list_versions("m1").unwrap();
    assert_eq!(
        versions.iter().map(|v| v.version_num).collect::<Vec<_>>(),
        vec![1, 2]
    );

    let rollback = registry
        .rollback(
            "m1",
            RollbackTarget::version_num(1),
            Some(&json!({"id": "u1"})),
            "rollback",
        )
        .unwrap();
    assert!(rollback.ok, "{:?}", rollback.errors);
    let module = registry.get("m1").unwrap().unwrap();
    assert_eq!(module.current_hash, versions[0].manifest_hash);
    assert_eq!(module.active_version.as_deref(), Some(versions[0].version_id.as_str()));
}

#[test]
fn tenants_are_isolated() {
    let backend = backend();
    let store_a = ManifestStore::new(Arc::clone(&backend), "org-a".into());
    let store_b = ManifestStore::new(backend, "org-b".into());

    store_a.init_module("m1", &base_manifest(), None, "init").unwrap();
    assert!(store_b.get_head("m1").unwrap().is_none());
    assert!(store_b.list_history("m1").unwrap().is_empty());
}

#[test]
fn state_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trellis.db");

    let head = {
        let store = ManifestStore::new(Arc::new(SqliteBackend::open(&path).unwrap()), "default".into());
        store.init_module("m1", &base_manifest(), None, "init").unwrap()
    };

    let store = ManifestStore::new(Arc::new(SqliteBackend::open(&path).unwrap()), "default".into());
    assert_eq!(store.get_head("m1").unwrap(), Some(head.clone()));
    let snapshot = store.get_snapshot("m1", &head).unwrap().unwrap();
    assert_eq!(snapshot["module"]["id"], json!("m1"));
}

#[test]
fn module_metadata_round_trips_through_columns() {
    let registry = ModuleRegistry::new(backend(), "default".into());
    let head = registry
        .store()
        .init_module("m1", &base_manifest(), None, "init")
        .unwrap();
    registry.install(&add_job_entity(&head)).unwrap();
    registry.set_icon("m1", "briefcase").unwrap();
    registry.set_display_order("m1", Some(7)).unwrap();

    let module = registry.get("m1").unwrap().unwrap();
    assert_eq!(module.icon_key.as_deref(), Some("briefcase"));
    assert_eq!(module.display_order, Some(7));

    registry.set_archived("m1", true).unwrap();
    assert!(registry.list().unwrap().is_empty());
}
