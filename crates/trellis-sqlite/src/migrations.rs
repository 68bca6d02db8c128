//! Explicit, numbered schema migrations, applied at open. The legacy
//! behavior of lazily adding columns on missing-column errors is not
//! carried over.

use log::info;
use rusqlite::Connection;

use trellis_store::{StoreError, StoreResult};

const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "
    create table if not exists manifest_snapshots (
        org_id        text not null,
        module_id     text not null,
        manifest_hash text not null,
        manifest      text not null,
        created_at    text not null,
        actor         text,
        reason        text,
        primary key (org_id, module_id, manifest_hash)
    );

    create table if not exists module_heads (
        org_id        text not null,
        module_id     text not null,
        manifest_hash text not null,
        updated_at    text not null,
        primary key (org_id, module_id)
    );

    create table if not exists module_audit (
        seq        integer primary key autoincrement,
        org_id     text not null,
        module_id  text not null,
        audit_id   text not null,
        audit      text not null,
        created_at text not null
    );
    create index if not exists module_audit_by_module
        on module_audit (org_id, module_id, seq desc);

    create table if not exists module_versions (
        org_id        text not null,
        module_id     text not null,
        version_id    text not null,
        version_num   integer not null,
        manifest_hash text not null,
        manifest      text not null,
        created_at    text not null,
        created_by    text,
        notes         text,
        primary key (org_id, module_id, version_id),
        unique (org_id, module_id, version_num)
    );

    create table if not exists modules_installed (
        org_id         text not null,
        module_id      text not null,
        enabled        integer not null default 0,
        current_hash   text not null,
        name           text,
        installed_at   text not null,
        updated_at     text not null,
        status         text not null,
        active_version text,
        last_error     text,
        archived       integer not null default 0,
        icon_key       text,
        display_order  integer,
        primary key (org_id, module_id)
    );
    ",
)];

fn backend_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

pub(crate) fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "create table if not exists schema_migrations (
            version    integer primary key,
            applied_at text not null
        );",
    )
    .map_err(backend_err)?;

    for (version, sql) in MIGRATIONS {
        let applied: bool = conn
            .query_row(
                "select count(*) from schema_migrations where version = ?1",
                [version],
                |row| row.get::<_, i64>(0).map(|count| count > 0),
            )
            .map_err(backend_err)?;
        if applied {
            continue;
        }
        conn.execute_batch(sql).map_err(backend_err)?;
        conn.execute(
            "insert into schema_migrations (version, applied_at) values (?1, datetime('now'))",
            [version],
        )
        .map_err(backend_err)?;
        info!("applied schema migration {version}");
    }
    Ok(())
}
