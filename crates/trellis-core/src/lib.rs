//! Shared wire types for the trellis platform core.

mod issue;
mod version;

pub use issue::Issue;
pub use version::ManifestVersion;

use serde::{Deserialize, Serialize};

/// Identity attached to audits, approvals, and version rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(id: impl Into<String>, roles: &[&str]) -> Self {
        Actor {
            id: id.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Tenant isolation boundary. Every store call is scoped by one of these;
/// the core never reads ambient tenant state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Self {
        OrgId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrgId {
    fn default() -> Self {
        OrgId("default".to_string())
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrgId {
    fn from(value: &str) -> Self {
        OrgId(value.to_string())
    }
}

/// Current UTC time in the wire format used by audits, snapshots, and records.
pub fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
