//! SQLite-backed [`StoreBackend`]. One connection behind a mutex; apply,
//! rollback, and version-insert run inside explicit transactions so head
//! movement, snapshot writes, version rows, and audit entries land
//! together or not at all.

mod migrations;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use trellis_core::OrgId;
use trellis_store::{
    AuditEntry, ModuleRecord, SnapshotMeta, SnapshotRow, StoreBackend, StoreError, StoreResult,
    VersionRow, VersionSeed,
};

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

fn backend_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn to_json_text(value: &Value) -> String {
    value.to_string()
}

fn opt_json_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(to_json_text)
}

fn parse_json(raw: String) -> StoreResult<Value> {
    serde_json::from_str(&raw).map_err(backend_err)
}

fn parse_opt_json(raw: Option<String>) -> StoreResult<Option<Value>> {
    raw.map(|raw| serde_json::from_str(&raw).map_err(backend_err))
        .transpose()
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(backend_err)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(backend_err)?;
        migrations::run(&conn)?;
        Ok(SqliteBackend {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("connection poisoned".to_string()))?;
        f(&mut conn)
    }
}

fn head_in(conn: &Connection, org: &OrgId, module_id: &str) -> StoreResult<Option<String>> {
    conn.query_row(
        "select manifest_hash from module_heads where org_id = ?1 and module_id = ?2",
        params![org.as_str(), module_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(backend_err)
}

fn put_head(conn: &Connection, org: &OrgId, module_id: &str, hash: &str) -> StoreResult<()> {
    conn.execute(
        "insert into module_heads (org_id, module_id, manifest_hash, updated_at)
         values (?1, ?2, ?3, datetime('now'))
         on conflict (org_id, module_id) do update
         set manifest_hash = excluded.manifest_hash, updated_at = excluded.updated_at",
        params![org.as_str(), module_id, hash],
    )
    .map_err(backend_err)?;
    Ok(())
}

fn insert_snapshot(conn: &Connection, org: &OrgId, snapshot: &SnapshotRow) -> StoreResult<()> {
    conn.execute(
        "insert into manifest_snapshots
           (org_id, module_id, manifest_hash, manifest, created_at, actor, reason)
         values (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         on conflict (org_id, module_id, manifest_hash) do nothing",
        params![
            org.as_str(),
            snapshot.module_id,
            snapshot.manifest_hash,
            to_json_text(&snapshot.manifest),
            snapshot.created_at,
            opt_json_text(&snapshot.created_by),
            snapshot.reason,
        ],
    )
    .map_err(backend_err)?;
    Ok(())
}

fn insert_audit(conn: &Connection, org: &OrgId, module_id: &str, audit: &AuditEntry) -> StoreResult<()> {
    let payload = serde_json::to_string(audit).map_err(backend_err)?;
    conn.execute(
        "insert into module_audit (org_id, module_id, audit_id, audit, created_at)
         values (?1, ?2, ?3, ?4, ?5)",
        params![org.as_str(), module_id, audit.audit_id, payload, audit.at],
    )
    .map_err(backend_err)?;
    Ok(())
}

const MODULE_COLUMNS: &str = "module_id, enabled, current_hash, name, installed_at, updated_at, \
     status, active_version, last_error, archived, icon_key, display_order";

fn status_to_str(status: trellis_store::ModuleStatus) -> &'static str {
    match status {
        trellis_store::ModuleStatus::Installed => "installed",
        trellis_store::ModuleStatus::Upgrading => "upgrading",
        trellis_store::ModuleStatus::Failed => "failed",
    }
}

fn status_from_str(raw: &str) -> trellis_store::ModuleStatus {
    match raw {
        "upgrading" => trellis_store::ModuleStatus::Upgrading,
        "failed" => trellis_store::ModuleStatus::Failed,
        _ => trellis_store::ModuleStatus::Installed,
    }
}

fn module_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModuleRecord> {
    let status: String = row.get(6)?;
    Ok(ModuleRecord {
        module_id: row.get(0)?,
        enabled: row.get(1)?,
        current_hash: row.get(2)?,
        name: row.get(3)?,
        installed_at: row.get(4)?,
        updated_at: row.get(5)?,
        status: status_from_str(&status),
        active_version: row.get(7)?,
        last_error: row.get(8)?,
        archived: row.get(9)?,
        icon_key: row.get(10)?,
        display_order: row.get(11)?,
    })
}

impl StoreBackend for SqliteBackend {
    fn head(&self, org: &OrgId, module_id: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| head_in(conn, org, module_id))
    }

    fn get_snapshot(
        &self,
        org: &OrgId,
        module_id: &str,
        hash: &str,
    ) -> StoreResult<Option<SnapshotRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "select manifest, created_at, actor, reason
                     from manifest_snapshots
                     where org_id = ?1 and module_id = ?2 and manifest_hash = ?3",
                    params![org.as_str(), module_id, hash],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(backend_err)?;
            row.map(|(manifest, created_at, actor, reason)| {
                Ok(SnapshotRow {
                    module_id: module_id.to_string(),
                    manifest_hash: hash.to_string(),
                    manifest: parse_json(manifest)?,
                    created_at,
                    created_by: parse_opt_json(actor)?,
                    reason,
                })
            })
            .transpose()
        })
    }

    fn module_known(&self, org: &OrgId, module_id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "select count(*) from manifest_snapshots where org_id = ?1 and module_id = ?2",
                    params![org.as_str(), module_id],
                    |row| row.get(0),
                )
                .map_err(backend_err)?;
            Ok(count > 0)
        })
    }

    fn list_snapshots(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<SnapshotMeta>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "select manifest_hash, created_at, actor, reason
                     from manifest_snapshots
                     where org_id = ?1 and module_id = ?2
                     order by created_at desc, manifest_hash desc",
                )
                .map_err(backend_err)?;
            let rows = stmt
                .query_map(params![org.as_str(), module_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })
                .map_err(backend_err)?;
            let mut items = Vec::new();
            for row in rows {
                let (manifest_hash, created_at, actor, reason) = row.map_err(backend_err)?;
                items.push(SnapshotMeta {
                    manifest_hash,
                    created_at,
                    created_by: parse_opt_json(actor)?,
                    reason,
                });
            }
            Ok(items)
        })
    }

    fn init_commit(&self, org: &OrgId, snapshot: SnapshotRow, audit: AuditEntry) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(backend_err)?;
            insert_snapshot(&tx, org, &snapshot)?;
            put_head(&tx, org, &snapshot.module_id, &snapshot.manifest_hash)?;
            insert_audit(&tx, org, &snapshot.module_id, &audit)?;
            tx.commit().map_err(backend_err)
        })
    }

    fn apply_commit(
        &self,
        org: &OrgId,
        module_id: &str,
        expected_head: &str,
        snapshot: SnapshotRow,
        audit: AuditEntry,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(backend_err)?;
            // CAS: the head is re-read inside the transaction.
            if head_in(&tx, org, module_id)?.as_deref() != Some(expected_head) {
                return Ok(false);
            }
            insert_snapshot(&tx, org, &snapshot)?;
            put_head(&tx, org, module_id, &snapshot.manifest_hash)?;
            insert_audit(&tx, org, module_id, &audit)?;
            tx.commit().map_err(backend_err)?;
            Ok(true)
        })
    }

    fn rollback_commit(
        &self,
        org: &OrgId,
        module_id: &str,
        to_hash: &str,
        audit: AuditEntry,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(backend_err)?;
            put_head(&tx, org, module_id, to_hash)?;
            insert_audit(&tx, org, module_id, &audit)?;
            tx.commit().map_err(backend_err)
        })
    }

    fn append_audit(&self, org: &OrgId, module_id: &str, audit: AuditEntry) -> StoreResult<()> {
        self.with_conn(|conn| insert_audit(conn, org, module_id, &audit))
    }

    fn list_audit(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "select audit from module_audit
                     where org_id = ?1 and module_id = ?2
                     order by seq desc",
                )
                .map_err(backend_err)?;
            let rows = stmt
                .query_map(params![org.as_str(), module_id], |row| row.get::<_, String>(0))
                .map_err(backend_err)?;
            let mut items = Vec::new();
            for row in rows {
                let payload = row.map_err(backend_err)?;
                items.push(serde_json::from_str(&payload).map_err(backend_err)?);
            }
            Ok(items)
        })
    }

    fn get_module(&self, org: &OrgId, module_id: &str) -> StoreResult<Option<ModuleRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "select {MODULE_COLUMNS} from modules_installed
                     where org_id = ?1 and module_id = ?2"
                ),
                params![org.as_str(), module_id],
                module_from_row,
            )
            .optional()
            .map_err(backend_err)
        })
    }

    fn put_module(&self, org: &OrgId, record: &ModuleRecord) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "insert into modules_installed
                   (org_id, module_id, enabled, current_hash, name, installed_at, updated_at,
                    status, active_version, last_error, archived, icon_key, display_order)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 on conflict (org_id, module_id) do update set
                   enabled = excluded.enabled,
                   current_hash = excluded.current_hash,
                   name = excluded.name,
                   updated_at = excluded.updated_at,
                   status = excluded.status,
                   active_version = excluded.active_version,
                   last_error = excluded.last_error,
                   archived = excluded.archived,
                   icon_key = excluded.icon_key,
                   display_order = excluded.display_order",
                params![
                    org.as_str(),
                    record.module_id,
                    record.enabled,
                    record.current_hash,
                    record.name,
                    record.installed_at,
                    record.updated_at,
                    status_to_str(record.status),
                    record.active_version,
                    record.last_error,
                    record.archived,
                    record.icon_key,
                    record.display_order,
                ],
            )
            .map_err(backend_err)?;
            Ok(())
        })
    }

    fn list_modules(&self, org: &OrgId) -> StoreResult<Vec<ModuleRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "select {MODULE_COLUMNS} from modules_installed
                     where org_id = ?1 order by module_id"
                ))
                .map_err(backend_err)?;
            let rows = stmt
                .query_map(params![org.as_str()], module_from_row)
                .map_err(backend_err)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(backend_err)?);
            }
            Ok(records)
        })
    }

    fn insert_version(
        &self,
        org: &OrgId,
        module_id: &str,
        seed: VersionSeed,
    ) -> StoreResult<VersionRow> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(backend_err)?;
            let next_num: i64 = tx
                .query_row(
                    "select coalesce(max(version_num), 0) + 1 from module_versions
                     where org_id = ?1 and module_id = ?2",
                    params![org.as_str(), module_id],
                    |row| row.get(0),
                )
                .map_err(backend_err)?;
            tx.execute(
                "insert into module_versions
                   (org_id, module_id, version_id, version_num, manifest_hash, manifest,
                    created_at, created_by, notes)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    org.as_str(),
                    module_id,
                    seed.version_id,
                    next_num,
                    seed.manifest_hash,
                    to_json_text(&seed.manifest),
                    seed.created_at,
                    opt_json_text(&seed.created_by),
                    seed.notes,
                ],
            )
            .map_err(backend_err)?;
            tx.commit().map_err(backend_err)?;
            Ok(VersionRow {
                version_id: seed.version_id,
                version_num: next_num,
                manifest_hash: seed.manifest_hash,
                manifest: seed.manifest,
                created_at: seed.created_at,
                created_by: seed.created_by,
                notes: seed.notes,
            })
        })
    }

    fn list_versions(&self, org: &OrgId, module_id: &str) -> StoreResult<Vec<VersionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "select version_id, version_num, manifest_hash, manifest, created_at, created_by, notes
                     from module_versions
                     where org_id = ?1 and module_id = ?2
                     order by version_num asc",
                )
                .map_err(backend_err)?;
            let rows = stmt
                .query_map(params![org.as_str(), module_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                })
                .map_err(backend_err)?;
            let mut versions = Vec::new();
            for row in rows {
                let (version_id, version_num, manifest_hash, manifest, created_at, created_by, notes) =
                    row.map_err(backend_err)?;
                versions.push(VersionRow {
                    version_id,
                    version_num,
                    manifest_hash,
                    manifest: parse_json(manifest)?,
                    created_at,
                    created_by: parse_opt_json(created_by)?,
                    notes,
                });
            }
            Ok(versions)
        })
    }
}
