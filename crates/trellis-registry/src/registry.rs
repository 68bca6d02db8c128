use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use trellis_core::{Issue, OrgId, now_utc};
use trellis_store::{
    AuditAction, AuditEntry, ManifestStore, ModuleRecord, ModuleStatus, StoreBackend, StoreResult,
    VersionRow, VersionSeed,
};

/// Result of a registry mutation.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryOutcome {
    pub ok: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub module: Option<ModuleRecord>,
    pub audit_id: Option<String>,
}

impl RegistryOutcome {
    fn failure(error: Issue) -> Self {
        RegistryOutcome {
            ok: false,
            errors: vec![error],
            warnings: Vec::new(),
            module: None,
            audit_id: None,
        }
    }

    fn failure_all(errors: Vec<Issue>) -> Self {
        RegistryOutcome {
            ok: false,
            errors,
            warnings: Vec::new(),
            module: None,
            audit_id: None,
        }
    }
}

/// Where a rollback should land. Resolution prefers an explicit version id,
/// then a version number, then a raw snapshot hash.
#[derive(Debug, Clone, Default)]
pub struct RollbackTarget {
    pub to_hash: Option<String>,
    pub to_version_id: Option<String>,
    pub to_version_num: Option<i64>,
}

impl RollbackTarget {
    pub fn hash(value: impl Into<String>) -> Self {
        RollbackTarget {
            to_hash: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn version_id(value: impl Into<String>) -> Self {
        RollbackTarget {
            to_version_id: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn version_num(value: i64) -> Self {
        RollbackTarget {
            to_version_num: Some(value),
            ..Default::default()
        }
    }
}

/// Per-tenant module registry, sharing its backend with the manifest store.
pub struct ModuleRegistry<B> {
    backend: Arc<B>,
    store: ManifestStore<B>,
    org: OrgId,
}

impl<B> Clone for ModuleRegistry<B> {
    fn clone(&self) -> Self {
        ModuleRegistry {
            backend: Arc::clone(&self.backend),
            store: self.store.clone(),
            org: self.org.clone(),
        }
    }
}

fn module_name_from_manifest(manifest: &Value) -> Option<String> {
    manifest
        .get("module")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn is_hash(value: &str) -> bool {
    value.starts_with("sha256:")
}

impl<B: StoreBackend> ModuleRegistry<B> {
    pub fn new(backend: Arc<B>, org: OrgId) -> Self {
        let store = ManifestStore::new(Arc::clone(&backend), org.clone());
        ModuleRegistry { backend, store, org }
    }

    /// The manifest store this registry mutates through.
    pub fn store(&self) -> &ManifestStore<B> {
        &self.store
    }

    pub fn get(&self, module_id: &str) -> StoreResult<Option<ModuleRecord>> {
        self.backend.get_module(&self.org, module_id)
    }

    /// Active (non-archived) modules, ordered by id.
    pub fn list(&self) -> StoreResult<Vec<ModuleRecord>> {
        Ok(self
            .backend
            .list_modules(&self.org)?
            .into_iter()
            .filter(|record| !record.archived)
            .collect())
    }

    /// Audit trail, newest first. Shared with the manifest store.
    pub fn history(&self, module_id: &str) -> StoreResult<Vec<AuditEntry>> {
        self.backend.list_audit(&self.org, module_id)
    }

    pub fn list_versions(&self, module_id: &str) -> StoreResult<Vec<VersionRow>> {
        self.backend.list_versions(&self.org, module_id)
    }

    pub fn register(
        &self,
        module_id: &str,
        name: Option<&str>,
        actor: Option<&Value>,
        reason: &str,
    ) -> StoreResult<RegistryOutcome> {
        if self.get(module_id)?.is_some() {
            return Ok(RegistryOutcome::failure(Issue::at(
                "MODULE_ALREADY_REGISTERED",
                "module already registered",
                "module_id",
            )));
        }
        let head = match self.store.get_head(module_id)? {
            Some(head) => head,
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "MODULE_NO_MANIFEST_HEAD",
                    "module has no manifest head",
                    "module_id",
                )));
            }
        };

        let manifest = self.store.get_snapshot(module_id, &head)?;
        let module_name = name
            .map(str::to_string)
            .or_else(|| manifest.as_ref().and_then(module_name_from_manifest));

        let record = ModuleRecord {
            module_id: module_id.to_string(),
            name: module_name,
            enabled: false,
            current_hash: head.clone(),
            installed_at: now_utc(),
            updated_at: now_utc(),
            status: ModuleStatus::Installed,
            active_version: None,
            last_error: None,
            archived: false,
            icon_key: None,
            display_order: None,
        };
        self.backend.put_module(&self.org, &record)?;

        let audit_id = self.append_audit(
            module_id,
            AuditAction::Register,
            None,
            Some(&head),
            actor,
            reason,
            None,
        )?;
        info!("module register module={module_id} head={head}");
        Ok(RegistryOutcome {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            module: Some(record),
            audit_id: Some(audit_id),
        })
    }

    pub fn install(&self, approved: &Value) -> StoreResult<RegistryOutcome> {
        self.apply(approved, AuditAction::Install, true)
    }

    pub fn upgrade(&self, approved: &Value) -> StoreResult<RegistryOutcome> {
        self.apply(approved, AuditAction::Upgrade, false)
    }

    fn apply(
        &self,
        approved: &Value,
        action: AuditAction,
        auto_register: bool,
    ) -> StoreResult<RegistryOutcome> {
        let patch = approved.get("patch").filter(|p| p.is_object());
        let patch = match patch {
            Some(patch) => patch,
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "MODULE_INVALID",
                    "approved preview invalid",
                    "approved",
                )));
            }
        };
        let module_id = match patch.get("target_module_id").and_then(Value::as_str) {
            Some(module_id) => module_id,
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "MODULE_INVALID",
                    "target_module_id required",
                    "patch.target_module_id",
                )));
            }
        };
        if patch.get("mode").and_then(Value::as_str) != Some("preview") {
            return Ok(RegistryOutcome::failure(Issue::at(
                "MODULE_INVALID",
                "patch.mode must be preview",
                "patch.mode",
            )));
        }

        let existing = self.get(module_id)?;
        if existing.is_none() && !auto_register {
            return Ok(RegistryOutcome::failure(Issue::at(
                "MODULE_NOT_FOUND",
                "module not found",
                "module_id",
            )));
        }

        if let Some(record) = &existing {
            if action == AuditAction::Upgrade {
                let mut upgrading = record.clone();
                upgrading.status = ModuleStatus::Upgrading;
                upgrading.last_error = None;
                upgrading.updated_at = now_utc();
                self.backend.put_module(&self.org, &upgrading)?;
            }
        }

        let store_result = self.store.apply_approved_preview(approved)?;
        if !store_result.ok {
            if let Some(record) = &existing {
                let mut failed = record.clone();
                failed.status = ModuleStatus::Failed;
                failed.last_error = store_result.errors.first().map(|e| e.message.clone());
                failed.updated_at = now_utc();
                self.backend.put_module(&self.org, &failed)?;
                warn!(
                    "module {action:?} failed module={module_id}: {}",
                    failed.last_error.as_deref().unwrap_or("apply failed")
                );
            }
            return Ok(RegistryOutcome::failure_all(store_result.errors));
        }

        let to_hash = match store_result.to_hash.as_deref().filter(|h| is_hash(h)) {
            Some(to_hash) => to_hash.to_string(),
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "MODULE_INVALID",
                    "invalid to_hash",
                    "to_hash",
                )));
            }
        };
        let manifest = self.store.get_snapshot(module_id, &to_hash)?.unwrap_or(Value::Null);
        let module_name = module_name_from_manifest(&manifest);

        let version = self.backend.insert_version(
            &self.org,
            module_id,
            VersionSeed {
                version_id: Uuid::new_v4().to_string(),
                manifest_hash: to_hash.clone(),
                manifest,
                created_at: now_utc(),
                created_by: approved.get("approved_by").cloned(),
                notes: patch.get("reason").and_then(Value::as_str).map(str::to_string),
            },
        )?;

        let record = match existing {
            None => ModuleRecord {
                module_id: module_id.to_string(),
                name: module_name,
                enabled: true,
                current_hash: to_hash.clone(),
                installed_at: now_utc(),
                updated_at: now_utc(),
                status: ModuleStatus::Installed,
                active_version: Some(version.version_id.clone()),
                last_error: None,
                archived: false,
                icon_key: None,
                display_order: None,
            },
            Some(mut record) => {
                record.current_hash = to_hash.clone();
                record.updated_at = now_utc();
                record.status = ModuleStatus::Installed;
                record.active_version = Some(version.version_id.clone());
                record.last_error = None;
                if module_name.is_some() {
                    record.name = module_name;
                }
                if action == AuditAction::Install {
                    record.enabled = true;
                }
                record
            }
        };
        self.backend.put_module(&self.org, &record)?;

        let audit_id = Uuid::new_v4().to_string();
        let audit = AuditEntry {
            audit_id: audit_id.clone(),
            module_id: module_id.to_string(),
            action,
            patch_id: patch.get("patch_id").and_then(Value::as_str).map(str::to_string),
            transaction_group_id: patch
                .get("transaction_group_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            from_hash: store_result.from_hash.clone(),
            to_hash: Some(to_hash.clone()),
            actor: approved.get("approved_by").cloned(),
            reason: patch.get("reason").and_then(Value::as_str).map(str::to_string),
            at: now_utc(),
        };
        self.backend.append_audit(&self.org, module_id, audit)?;
        info!("module {action:?} module={module_id} to={to_hash} version={}", version.version_num);
        Ok(RegistryOutcome {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            module: Some(record),
            audit_id: Some(audit_id),
        })
    }

    pub fn set_enabled(
        &self,
        module_id: &str,
        enabled: bool,
        actor: Option<&Value>,
        reason: &str,
    ) -> StoreResult<RegistryOutcome> {
        let record = match self.get(module_id)? {
            Some(record) => record,
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "MODULE_NOT_FOUND",
                    "module not found",
                    "module_id",
                )));
            }
        };

        let mut warnings = Vec::new();
        if record.enabled == enabled {
            warnings.push(Issue::at("MODULE_ENABLED_NOOP", "no change", "enabled"));
        }

        let mut updated = record.clone();
        updated.enabled = enabled;
        updated.updated_at = now_utc();
        self.backend.put_module(&self.org, &updated)?;

        let action = if enabled { AuditAction::Enable } else { AuditAction::Disable };
        let audit_id = self.append_audit(
            module_id,
            action,
            Some(&record.current_hash),
            Some(&record.current_hash),
            actor,
            reason,
            None,
        )?;
        Ok(RegistryOutcome {
            ok: true,
            errors: Vec::new(),
            warnings,
            module: Some(updated),
            audit_id: Some(audit_id),
        })
    }

    pub fn rollback(
        &self,
        module_id: &str,
        target: RollbackTarget,
        actor: Option<&Value>,
        reason: &str,
    ) -> StoreResult<RegistryOutcome> {
        let record = match self.get(module_id)? {
            Some(record) => record,
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "MODULE_NOT_FOUND",
                    "module not found",
                    "module_id",
                )));
            }
        };

        let mut warnings = Vec::new();
        let versions = self.backend.list_versions(&self.org, module_id)?;
        let mut target_version: Option<VersionRow> = None;
        if let Some(version_id) = &target.to_version_id {
            target_version = versions.iter().find(|v| &v.version_id == version_id).cloned();
            if target_version.is_none() {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "ROLLBACK_UNKNOWN_VERSION",
                    "version_id not found",
                    "to_version_id",
                )));
            }
        } else if let Some(version_num) = target.to_version_num {
            target_version = versions.iter().find(|v| v.version_num == version_num).cloned();
            if target_version.is_none() {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "ROLLBACK_UNKNOWN_VERSION",
                    "version_num not found",
                    "to_version_num",
                )));
            }
        } else if let Some(hash) = target.to_hash.as_deref().filter(|h| !h.is_empty()) {
            target_version = versions.iter().find(|v| v.manifest_hash == hash).cloned();
        }

        let to_hash = target_version
            .as_ref()
            .map(|v| v.manifest_hash.clone())
            .or(target.to_hash);
        let to_hash = match to_hash.filter(|h| is_hash(h)) {
            Some(to_hash) => to_hash,
            None => {
                return Ok(RegistryOutcome::failure(Issue::at(
                    "ROLLBACK_INVALID_HASH",
                    "to_hash must be a manifest hash",
                    "to_hash",
                )));
            }
        };

        let store_result = self.store.rollback(module_id, &to_hash, actor, reason)?;
        if !store_result.ok {
            return Ok(RegistryOutcome::failure_all(store_result.errors));
        }

        let from_hash = record.current_hash.clone();
        if from_hash == to_hash {
            warnings.push(Issue::at(
                "MODULE_ALREADY_AT_SNAPSHOT",
                "module already at requested snapshot",
                "to_hash",
            ));
        }

        // A rollback to a snapshot that never got a version row mints one so
        // active_version stays meaningful.
        if target_version.is_none() {
            let manifest = self.store.get_snapshot(module_id, &to_hash)?.unwrap_or(Value::Null);
            let version = self.backend.insert_version(
                &self.org,
                module_id,
                VersionSeed {
                    version_id: Uuid::new_v4().to_string(),
                    manifest_hash: to_hash.clone(),
                    manifest,
                    created_at: now_utc(),
                    created_by: actor.cloned(),
                    notes: Some("rollback_snapshot".to_string()),
                },
            )?;
            warnings.push(Issue::at(
                "MODULE_VERSION_CREATED",
                "version created from snapshot for rollback",
                "to_hash",
            ));
            target_version = Some(version);
        }

        let mut updated = record;
        updated.current_hash = to_hash.clone();
        updated.updated_at = now_utc();
        updated.status = ModuleStatus::Installed;
        updated.last_error = None;
        updated.active_version = target_version.map(|v| v.version_id);
        self.backend.put_module(&self.org, &updated)?;

        info!("module rollback module={module_id} to={to_hash}");
        Ok(RegistryOutcome {
            ok: true,
            errors: Vec::new(),
            warnings,
            module: Some(updated),
            audit_id: store_result.audit_id,
        })
    }

    pub fn set_icon(&self, module_id: &str, icon_key: &str) -> StoreResult<()> {
        if let Some(mut record) = self.get(module_id)? {
            record.icon_key = Some(icon_key.to_string());
            record.updated_at = now_utc();
            self.backend.put_module(&self.org, &record)?;
        }
        Ok(())
    }

    pub fn clear_icon(&self, module_id: &str) -> StoreResult<()> {
        if let Some(mut record) = self.get(module_id)? {
            record.icon_key = None;
            record.updated_at = now_utc();
            self.backend.put_module(&self.org, &record)?;
        }
        Ok(())
    }

    pub fn set_display_order(&self, module_id: &str, display_order: Option<i64>) -> StoreResult<()> {
        if let Some(mut record) = self.get(module_id)? {
            record.display_order = display_order;
            record.updated_at = now_utc();
            self.backend.put_module(&self.org, &record)?;
        }
        Ok(())
    }

    pub fn set_archived(&self, module_id: &str, archived: bool) -> StoreResult<()> {
        if let Some(mut record) = self.get(module_id)? {
            record.archived = archived;
            record.updated_at = now_utc();
            self.backend.put_module(&self.org, &record)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn append_audit(
        &self,
        module_id: &str,
        action: AuditAction,
        from_hash: Option<&str>,
        to_hash: Option<&str>,
        actor: Option<&Value>,
        reason: &str,
        patch_id: Option<&str>,
    ) -> StoreResult<String> {
        let audit_id = Uuid::new_v4().to_string();
        let audit = AuditEntry {
            audit_id: audit_id.clone(),
            module_id: module_id.to_string(),
            action,
            patch_id: patch_id.map(str::to_string),
            transaction_group_id: None,
            from_hash: from_hash.map(str::to_string),
            to_hash: to_hash.map(str::to_string),
            actor: actor.cloned(),
            reason: Some(reason.to_string()),
            at: now_utc(),
        };
        self.backend.append_audit(&self.org, module_id, audit)?;
        Ok(audit_id)
    }
}
