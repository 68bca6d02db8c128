use std::sync::Arc;

use log::info;
use serde_json::Value;
use uuid::Uuid;

use trellis_core::{Issue, OrgId, now_utc};
use trellis_hash::ContentHash;
use trellis_pointer::{ResolvedOp, apply_ops};

use crate::backend::StoreBackend;
use crate::types::{ApplyOutcome, AuditAction, AuditEntry, SnapshotMeta, SnapshotRow};
use crate::{StoreError, StoreResult};

/// Snapshot and head tracking for one tenant. All mutations route through
/// the backend's transactional commits; previews never reach this type.
pub struct ManifestStore<B> {
    backend: Arc<B>,
    org: OrgId,
}

impl<B> Clone for ManifestStore<B> {
    fn clone(&self) -> Self {
        ManifestStore {
            backend: Arc::clone(&self.backend),
            org: self.org.clone(),
        }
    }
}

impl<B: StoreBackend> ManifestStore<B> {
    pub fn new(backend: Arc<B>, org: OrgId) -> Self {
        ManifestStore { backend, org }
    }

    pub fn org(&self) -> &OrgId {
        &self.org
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Canonicalize, hash, snapshot, and point head at the manifest.
    /// Re-initializing with an identical manifest is a no-op apart from the
    /// audit entry.
    pub fn init_module(
        &self,
        module_id: &str,
        manifest: &Value,
        actor: Option<&Value>,
        reason: &str,
    ) -> StoreResult<String> {
        let hash = ContentHash::of_value(manifest)
            .map_err(|err| StoreError::Backend(format!("canonicalize manifest: {err}")))?
            .to_hex();
        let snapshot = SnapshotRow {
            module_id: module_id.to_string(),
            manifest_hash: hash.clone(),
            manifest: manifest.clone(),
            created_at: now_utc(),
            created_by: actor.cloned(),
            reason: Some(reason.to_string()),
        };
        let audit = AuditEntry {
            audit_id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            action: AuditAction::Init,
            patch_id: None,
            transaction_group_id: None,
            from_hash: None,
            to_hash: Some(hash.clone()),
            actor: actor.cloned(),
            reason: Some(reason.to_string()),
            at: now_utc(),
        };
        self.backend.init_commit(&self.org, snapshot, audit)?;
        info!("manifest init module={module_id} hash={hash}");
        Ok(hash)
    }

    pub fn get_head(&self, module_id: &str) -> StoreResult<Option<String>> {
        self.backend.head(&self.org, module_id)
    }

    /// The snapshot payload, as an owned copy the caller may freely mutate.
    pub fn get_snapshot(&self, module_id: &str, hash: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .backend
            .get_snapshot(&self.org, module_id, hash)?
            .map(|row| row.manifest))
    }

    pub fn list_snapshots(&self, module_id: &str) -> StoreResult<Vec<SnapshotMeta>> {
        self.backend.list_snapshots(&self.org, module_id)
    }

    /// Audit trail, newest first.
    pub fn list_history(&self, module_id: &str) -> StoreResult<Vec<AuditEntry>> {
        self.backend.list_audit(&self.org, module_id)
    }

    /// Apply an approved preview: verify the preview is intact and targeted
    /// at the current head, replay its resolved ops on a copy, and advance
    /// head under compare-and-swap.
    pub fn apply_approved_preview(&self, approved: &Value) -> StoreResult<ApplyOutcome> {
        let approved_obj = match approved.as_object() {
            Some(approved_obj) => approved_obj,
            None => {
                return Ok(ApplyOutcome::failure(Issue::at(
                    "APPLY_INVALID",
                    "approved must be object",
                    "$",
                )));
            }
        };
        let patch = approved_obj.get("patch").filter(|p| p.is_object());
        let preview = approved_obj.get("preview").filter(|p| p.is_object());
        let (patch, preview) = match (patch, preview) {
            (Some(patch), Some(preview)) => (patch, preview),
            _ => {
                return Ok(ApplyOutcome::failure(Issue::at(
                    "APPLY_INVALID",
                    "patch and preview required",
                    "$",
                )));
            }
        };

        if preview.get("ok").and_then(Value::as_bool) != Some(true) {
            return Ok(ApplyOutcome::failure(Issue::at(
                "APPLY_PREVIEW_NOT_OK",
                "preview.ok must be true",
                "preview.ok",
            )));
        }
        if patch.get("mode").and_then(Value::as_str) != Some("preview") {
            return Ok(ApplyOutcome::failure(Issue::at(
                "APPLY_INVALID",
                "patch.mode must be preview",
                "patch.mode",
            )));
        }

        let module_id = patch.get("target_module_id").and_then(Value::as_str);
        let from_hash = patch.get("target_manifest_hash").and_then(Value::as_str);
        let (module_id, from_hash) = match (module_id, from_hash) {
            (Some(module_id), Some(from_hash)) => (module_id, from_hash),
            _ => {
                return Ok(ApplyOutcome::failure(Issue::at(
                    "APPLY_INVALID",
                    "module_id and from_hash required",
                    "patch",
                )));
            }
        };

        let head = self.backend.head(&self.org, module_id)?;
        if head.as_deref() != Some(from_hash) {
            return Ok(ApplyOutcome::failure_from(
                Issue::at(
                    "APPLY_HASH_MISMATCH",
                    "from_hash does not match head",
                    "patch.target_manifest_hash",
                ),
                from_hash,
            ));
        }

        let current = match self.backend.get_snapshot(&self.org, module_id, from_hash)? {
            Some(row) => row,
            None => {
                return Ok(ApplyOutcome::failure_from(
                    Issue::at(
                        "APPLY_UNKNOWN_HASH",
                        "from_hash not found",
                        "patch.target_manifest_hash",
                    ),
                    from_hash,
                ));
            }
        };

        let resolved_ops_raw = match preview.get("resolved_ops").and_then(Value::as_array) {
            Some(resolved_ops) => resolved_ops,
            None => {
                return Ok(ApplyOutcome::failure_from(
                    Issue::at(
                        "APPLY_INVALID",
                        "resolved_ops must be list",
                        "preview.resolved_ops",
                    ),
                    from_hash,
                ));
            }
        };

        for (idx, op) in resolved_ops_raw.iter().enumerate() {
            if !op.is_object() {
                return Ok(ApplyOutcome::failure_from(
                    Issue::at(
                        "APPLY_INVALID",
                        "op must be object",
                        format!("preview.resolved_ops[{idx}]"),
                    ),
                    from_hash,
                ));
            }
            for key in ["path", "from"] {
                if let Some(path) = op.get(key).and_then(Value::as_str) {
                    if path.contains("@[id=") {
                        return Ok(ApplyOutcome::failure_from(
                            Issue::at(
                                "APPLY_UNRESOLVED_SELECTOR",
                                "selector segment found",
                                format!("preview.resolved_ops[{idx}].{key}"),
                            ),
                            from_hash,
                        ));
                    }
                }
            }
        }

        let resolved_ops: Vec<ResolvedOp> =
            match serde_json::from_value(Value::Array(resolved_ops_raw.clone())) {
                Ok(ops) => ops,
                Err(err) => {
                    return Ok(ApplyOutcome::failure_from(
                        Issue::at(
                            "APPLY_FAILED",
                            format!("malformed resolved op: {err}"),
                            "preview.resolved_ops",
                        ),
                        from_hash,
                    ));
                }
            };

        let mut new_manifest = current.manifest.clone();
        if let Err((idx, err)) = apply_ops(&mut new_manifest, &resolved_ops) {
            return Ok(ApplyOutcome::failure_from(
                Issue::at(
                    "APPLY_FAILED",
                    format!("op {idx} failed: {err}"),
                    "preview.resolved_ops",
                ),
                from_hash,
            ));
        }

        let to_hash = match ContentHash::of_value(&new_manifest) {
            Ok(hash) => hash.to_hex(),
            Err(err) => {
                return Ok(ApplyOutcome::failure_from(
                    Issue::at("APPLY_MANIFEST_INVALID", err.to_string(), "manifest"),
                    from_hash,
                ));
            }
        };

        let approved_by = approved_obj.get("approved_by").cloned();
        let reason = patch.get("reason").and_then(Value::as_str).map(str::to_string);
        let snapshot = SnapshotRow {
            module_id: module_id.to_string(),
            manifest_hash: to_hash.clone(),
            manifest: new_manifest,
            created_at: now_utc(),
            created_by: approved_by.clone(),
            reason: reason.clone(),
        };
        let audit_id = Uuid::new_v4().to_string();
        let audit = AuditEntry {
            audit_id: audit_id.clone(),
            module_id: module_id.to_string(),
            action: AuditAction::Apply,
            patch_id: patch.get("patch_id").and_then(Value::as_str).map(str::to_string),
            transaction_group_id: None,
            from_hash: Some(from_hash.to_string()),
            to_hash: Some(to_hash.clone()),
            actor: approved_by,
            reason,
            at: approved_obj
                .get("approved_at")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(now_utc),
        };

        // The head may have moved since the read above; the commit re-checks
        // it so exactly one of two racing applies wins.
        if !self
            .backend
            .apply_commit(&self.org, module_id, from_hash, snapshot, audit)?
        {
            return Ok(ApplyOutcome::failure_from(
                Issue::at(
                    "APPLY_HASH_MISMATCH",
                    "from_hash does not match head",
                    "patch.target_manifest_hash",
                ),
                from_hash,
            ));
        }

        info!("manifest apply module={module_id} from={from_hash} to={to_hash}");
        Ok(ApplyOutcome {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            from_hash: Some(from_hash.to_string()),
            to_hash: Some(to_hash),
            audit_id: Some(audit_id),
        })
    }

    /// Point head back at an existing snapshot. No snapshot is written;
    /// only an audit entry records the move.
    pub fn rollback(
        &self,
        module_id: &str,
        to_hash: &str,
        actor: Option<&Value>,
        reason: &str,
    ) -> StoreResult<ApplyOutcome> {
        if !self.backend.module_known(&self.org, module_id)? {
            return Ok(ApplyOutcome::failure(Issue::at(
                "ROLLBACK_UNKNOWN_MODULE",
                "module not found",
                "module_id",
            )));
        }
        if self.backend.get_snapshot(&self.org, module_id, to_hash)?.is_none() {
            return Ok(ApplyOutcome::failure(Issue::at(
                "ROLLBACK_UNKNOWN_HASH",
                "hash not found",
                "to_hash",
            )));
        }

        let from_hash = self.backend.head(&self.org, module_id)?;
        let audit_id = Uuid::new_v4().to_string();
        let audit = AuditEntry {
            audit_id: audit_id.clone(),
            module_id: module_id.to_string(),
            action: AuditAction::Rollback,
            patch_id: None,
            transaction_group_id: None,
            from_hash: from_hash.clone(),
            to_hash: Some(to_hash.to_string()),
            actor: actor.cloned(),
            reason: Some(reason.to_string()),
            at: now_utc(),
        };
        self.backend.rollback_commit(&self.org, module_id, to_hash, audit)?;

        info!("manifest rollback module={module_id} to={to_hash}");
        Ok(ApplyOutcome {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            from_hash,
            to_hash: Some(to_hash.to_string()),
            audit_id: Some(audit_id),
        })
    }
}
