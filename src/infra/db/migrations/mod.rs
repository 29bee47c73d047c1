//! Usage: SQLite schema migrations (user_version + incremental upgrades).

use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use rusqlite::Connection;

const LATEST_SCHEMA_VERSION: i64 = 1;

pub(super) fn apply_migrations(conn: &mut Connection) -> AppResult<()> {
    let mut user_version = read_user_version(conn)?;

    if !(0..=LATEST_SCHEMA_VERSION).contains(&user_version) {
        return Err(format!(
            "DB_ERROR: unsupported sqlite schema version: user_version={user_version} (expected 0..={LATEST_SCHEMA_VERSION})"
        )
        .into());
    }

    while user_version < LATEST_SCHEMA_VERSION {
        let from_version = user_version;
        match user_version {
            0 => create_baseline_v1(conn)?,
            v => {
                return Err(format!(
                    "DB_ERROR: no migration step from sqlite user_version={v}"
                )
                .into());
            }
        }
        user_version = read_user_version(conn)?;
        tracing::info!(
            from_version = from_version,
            to_version = user_version,
            "sqlite migration step completed"
        );
    }

    Ok(())
}

fn create_baseline_v1(conn: &mut Connection) -> AppResult<()> {
    let tx = conn
        .transaction()
        .map_err(|e| format!("DB_ERROR: failed to start sqlite transaction: {e}"))?;

    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_store (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    )
    .map_err(|e| format!("DB_ERROR: failed to create baseline schema: {e}"))?;

    tx.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![1_i64, now_unix_seconds()],
    )
    .map_err(|e| format!("DB_ERROR: failed to record schema migration: {e}"))?;

    set_user_version(&tx, 1)?;
    tx.commit()
        .map_err(|e| format!("DB_ERROR: failed to commit sqlite transaction: {e}"))?;
    Ok(())
}

fn read_user_version(conn: &Connection) -> AppResult<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| format!("DB_ERROR: failed to read sqlite user_version: {e}").into())
}

fn set_user_version(tx: &rusqlite::Transaction<'_>, version: i64) -> AppResult<()> {
    tx.pragma_update(None, "user_version", version)
        .map_err(|e| format!("DB_ERROR: failed to update sqlite user_version: {e}"))?;
    Ok(())
}
