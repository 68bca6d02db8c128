use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use trellis_core::OrgId;

use crate::backend::{StoreBackend, VersionSeed};
use crate::types::{AuditEntry, ModuleRecord, SnapshotMeta, SnapshotRow, VersionRow};
use crate::StoreResult;

type Key = (OrgId, String);

#[derive(Default)]
struct State {
    snapshots: HashMap<Key, Vec<SnapshotRow>>,
    heads: HashMap<Key, String>,
    audit: HashMap<Key, Vec<AuditEntry>>,
    modules: HashMap<Key, ModuleRecord>,
    versions: HashMap<Key, Vec<VersionRow>>,
}

/// In-memory backend. A single `RwLock` over all tables doubles as the
/// transaction boundary for the `*_commit` methods.
#[derive(Clone, Default)]
pub struct MemBackend {
    inner: Arc<RwLock<State>>,
}

impl std::fmt::Debug for MemBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().unwrap();
        f.debug_struct("MemBackend")
            .field("modules", &state.modules.len())
            .field("snapshots", &state.snapshots.len())
            .finish()
    }
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(org: &OrgId, module_id: &str) -> Key {
    (org.clone(), module_id.to_string())
}

fn insert_snapshot(rows: &mut Vec<SnapshotRow>, snapshot: SnapshotRow) {
    if !rows.iter().any(|r| r.manifest_hash == snapshot.manifest_hash) {
        rows.push(snapshot);
    }
}

impl StoreBackend for MemBackend {
    fn head(&self, org: &OrgId, module_id: &str) -> StoreResult<Option<String>> {
        let state = self.inner.read().unwrap();
        Ok(state.heads.get(&key(org, module_id)).cloned())
    }

    fn get_snapshot(
        &self,
        org: &OrgId,
        module_id: &str,
        hash: &str,
    ) -> StoreResult<Option<SnapshotRow>> {
        let state = self.inner.read().unwrap();
        Ok(state
            .snapshots
            .get(&key(org, module_id))
            .and_then(|rows| rows.iter().find(|r| r.manifest_hash == hash))
            .cloned())
    }

    fn module_known(&self, org: &OrgId, module_id: &str) -> StoreResult<bool> {
        let state = self.inner.read().unwrap();
        Ok(state
            .snapshots
            .get(&key(org, module_id))
            .map(|rows| !rows.is_empty())
            .unwrap_or(false))
    }

    fn list_snapshots(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<SnapshotMeta>> {
        let state = self.inner.read().unwrap();
        let mut items: Vec<SnapshotMeta> = state
            .snapshots
            .get(&key(org, module_id))
            .map(|rows| {
                rows.iter()
                    .map(|r| SnapshotMeta {
                        manifest_hash: r.manifest_hash.clone(),
                        created_at: r.created_at.clone(),
                        created_by: r.created_by.clone(),
                        reason: r.reason.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    fn init_commit(&self, org: &OrgId, snapshot: SnapshotRow, audit: AuditEntry) -> StoreResult<()> {
        let mut state = self.inner.write().unwrap();
        let k = key(org, &snapshot.module_id);
        state.heads.insert(k.clone(), snapshot.manifest_hash.clone());
        insert_snapshot(state.snapshots.entry(k.clone()).or_default(), snapshot);
        state.audit.entry(k).or_default().push(audit);
        Ok(())
    }

    fn apply_commit(
        &self,
        org: &OrgId,
        module_id: &str,
        expected_head: &str,
        snapshot: SnapshotRow,
        audit: AuditEntry,
    ) -> StoreResult<bool> {
        let mut state = self.inner.write().unwrap();
        let k = key(org, module_id);
        if state.heads.get(&k).map(String::as_str) != Some(expected_head) {
            return Ok(false);
        }
        state.heads.insert(k.clone(), snapshot.manifest_hash.clone());
        insert_snapshot(state.snapshots.entry(k.clone()).or_default(), snapshot);
        state.audit.entry(k).or_default().push(audit);
        Ok(true)
    }

    fn rollback_commit(
        &self,
        org: &OrgId,
        module_id: &str,
        to_hash: &str,
        audit: AuditEntry,
    ) -> StoreResult<()> {
        let mut state = self.inner.write().unwrap();
        let k = key(org, module_id);
        state.heads.insert(k.clone(), to_hash.to_string());
        state.audit.entry(k).or_default().push(audit);
        Ok(())
    }

    fn append_audit(&self, org: &OrgId, module_id: &str, audit: AuditEntry) -> StoreResult<()> {
        let mut state = self.inner.write().unwrap();
        state.audit.entry(key(org, module_id)).or_default().push(audit);
        Ok(())
    }

    fn list_audit(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<AuditEntry>> {
        let state = self.inner.read().unwrap();
        let mut items = state
            .audit
            .get(&key(org, module_id))
            .cloned()
            .unwrap_or_default();
        items.reverse();
        Ok(items)
    }

    fn get_module(&self, org: &OrgId, module_id: &str) -> StoreResult<Option<ModuleRecord>> {
        let state = self.inner.read().unwrap();
        Ok(state.modules.get(&key(org, module_id)).cloned())
    }

    fn put_module(&self, org: &OrgId, record: &ModuleRecord) -> StoreResult<()> {
        let mut state = self.inner.write().unwrap();
        state.modules.insert(key(org, &record.module_id), record.clone());
        Ok(())
    }

    fn list_modules(&self, org: &OrgId) -> StoreResult<Vec<ModuleRecord>> {
        let state = self.inner.read().unwrap();
        let mut records: Vec<ModuleRecord> = state
            .modules
            .iter()
            .filter(|((record_org, _), _)| record_org == org)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        Ok(records)
    }

    fn insert_version(
        &self,
        org: &OrgId,
        module_id: &str,
        seed: VersionSeed,
    ) -> StoreResult<VersionRow> {
        let mut state = self.inner.write().unwrap();
        let rows = state.versions.entry(key(org, module_id)).or_default();
        let next_num = rows.iter().map(|v| v.version_num).max().unwrap_or(0) + 1;
        let row = VersionRow {
            version_id: seed.version_id,
            version_num: next_num,
            manifest_hash: seed.manifest_hash,
            manifest: seed.manifest,
            created_at: seed.created_at,
            created_by: seed.created_by,
            notes: seed.notes,
        };
        rows.push(row.clone());
        Ok(row)
    }

    fn list_versions(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<VersionRow>> {
        let state = self.inner.read().unwrap();
        let mut rows = state
            .versions
            .get(&key(org, module_id))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|v| v.version_num);
        Ok(rows)
    }
}
