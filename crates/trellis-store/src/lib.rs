//! Content-addressed manifest storage: snapshots keyed by canonical hash,
//! one head pointer per `(org, module)`, an append-only audit log, and the
//! version/module rows the registry builds on. Business logic lives in
//! [`ManifestStore`]; row storage is behind the [`StoreBackend`] trait with
//! an in-memory implementation here and a SQLite one in `trellis-sqlite`.

mod backend;
mod mem;
mod store;
mod types;

pub use backend::{StoreBackend, VersionSeed};
pub use mem::MemBackend;
pub use store::ManifestStore;
pub use types::{
    ApplyOutcome, AuditAction, AuditEntry, ModuleRecord, ModuleStatus, SnapshotMeta, SnapshotRow,
    VersionRow,
};

use thiserror::Error;

/// Infrastructure failure in a backend. Domain-level problems (hash
/// mismatches, unknown modules) are reported through outcome structs, never
/// through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
