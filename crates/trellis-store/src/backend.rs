use serde_json::Value;

use trellis_core::OrgId;

use crate::types::{AuditEntry, ModuleRecord, SnapshotMeta, SnapshotRow, VersionRow};
use crate::StoreResult;

/// Everything needed to mint a new version row. The backend assigns the
/// monotonic `version_num` atomically with the insert.
#[derive(Debug, Clone)]
pub struct VersionSeed {
    pub version_id: String,
    pub manifest_hash: String,
    pub manifest: Value,
    pub created_at: String,
    pub created_by: Option<Value>,
    pub notes: Option<String>,
}

/// Row storage for the manifest store and module registry.
///
/// Every call is scoped by an explicit [`OrgId`]. The three `*_commit`
/// methods are transactional units: either every write inside them lands or
/// none does. Head movement is a compare-and-swap; concurrent applies on one
/// module serialize such that at most one wins.
pub trait StoreBackend: Send + Sync {
    // -- snapshots & head ---------------------------------------------------

    fn head(&self, org: &OrgId, module_id: &str) -> StoreResult<Option<String>>;
    fn get_snapshot(&self, org: &OrgId, module_id: &str, hash: &str)
    -> StoreResult<Option<SnapshotRow>>;
    /// Whether any snapshot exists for the module.
    fn module_known(&self, org: &OrgId, module_id: &str) -> StoreResult<bool>;
    /// Newest first.
    fn list_snapshots(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<SnapshotMeta>>;

    /// Write the initial snapshot (idempotent by hash), point head at it,
    /// and append the audit entry.
    fn init_commit(&self, org: &OrgId, snapshot: SnapshotRow, audit: AuditEntry) -> StoreResult<()>;

    /// Advance head from `expected_head` to the snapshot's hash, writing
    /// the snapshot (idempotent by hash) and audit entry in the same
    /// transaction. Returns `false` without writing anything when the head
    /// no longer matches.
    fn apply_commit(
        &self,
        org: &OrgId,
        module_id: &str,
        expected_head: &str,
        snapshot: SnapshotRow,
        audit: AuditEntry,
    ) -> StoreResult<bool>;

    /// Point head at an existing snapshot and append the audit entry. No
    /// snapshot row is written.
    fn rollback_commit(
        &self,
        org: &OrgId,
        module_id: &str,
        to_hash: &str,
        audit: AuditEntry,
    ) -> StoreResult<()>;

    // -- audit --------------------------------------------------------------

    fn append_audit(&self, org: &OrgId, module_id: &str, audit: AuditEntry) -> StoreResult<()>;
    /// Newest first.
    fn list_audit(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<AuditEntry>>;

    // -- registry rows ------------------------------------------------------

    fn get_module(&self, org: &OrgId, module_id: &str) -> StoreResult<Option<ModuleRecord>>;
    fn put_module(&self, org: &OrgId, record: &ModuleRecord) -> StoreResult<()>;
    /// Sorted by module id; includes archived records (callers filter).
    fn list_modules(&self, org: &OrgId) -> StoreResult<Vec<ModuleRecord>>;

    /// Insert a version row, assigning the next `version_num` for the
    /// module atomically.
    fn insert_version(
        &self,
        org: &OrgId,
        module_id: &str,
        seed: VersionSeed,
    ) -> StoreResult<VersionRow>;
    /// In ascending `version_num` order.
    fn list_versions(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<VersionRow>>;
}
