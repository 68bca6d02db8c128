use serde::{Deserialize, Serialize};
use serde_json::Value;

use trellis_core::Issue;

/// An immutable manifest snapshot, addressed by its canonical hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub module_id: String,
    pub manifest_hash: String,
    pub manifest: Value,
    pub created_at: String,
    pub created_by: Option<Value>,
    pub reason: Option<String>,
}

/// Snapshot listing entry (no manifest payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub manifest_hash: String,
    pub created_at: String,
    pub created_by: Option<Value>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Init,
    Register,
    Apply,
    Rollback,
    Install,
    Upgrade,
    Enable,
    Disable,
}

/// Append-only audit record. History listings return these newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,
    pub module_id: String,
    pub action: AuditAction,
    pub patch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_group_id: Option<String>,
    pub from_hash: Option<String>,
    pub to_hash: Option<String>,
    pub actor: Option<Value>,
    pub reason: Option<String>,
    pub at: String,
}

/// A numbered reference to a snapshot; `version_num` is monotonic per
/// module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow {
    pub version_id: String,
    pub version_num: i64,
    pub manifest_hash: String,
    pub manifest: Value,
    pub created_at: String,
    pub created_by: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Installed,
    Upgrading,
    Failed,
}

/// Registry record for an installed module. Archived records stay on disk
/// but are hidden from listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module_id: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub current_hash: String,
    pub installed_at: String,
    pub updated_at: String,
    pub status: ModuleStatus,
    pub active_version: Option<String>,
    pub last_error: Option<String>,
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i64>,
}

/// Result of a store mutation. `ok == false` carries coded issues; the
/// store never raises for domain-level failures.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub ok: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub from_hash: Option<String>,
    pub to_hash: Option<String>,
    pub audit_id: Option<String>,
}

impl ApplyOutcome {
    pub(crate) fn failure(error: Issue) -> Self {
        ApplyOutcome {
            ok: false,
            errors: vec![error],
            warnings: Vec::new(),
            from_hash: None,
            to_hash: None,
            audit_id: None,
        }
    }

    pub(crate) fn failure_from(error: Issue, from_hash: &str) -> Self {
        ApplyOutcome {
            from_hash: Some(from_hash.to_string()),
            ..Self::failure(error)
        }
    }
}
