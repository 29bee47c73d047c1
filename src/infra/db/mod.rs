//! Usage: SQLite connection setup and schema migrations for the durable key/value store.

mod migrations;

use crate::shared::error::db_err;
use crate::shared::error::AppResult;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::env;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_DEFAULT: Duration = Duration::from_millis(2000);
const POOL_MAX_SIZE_DEFAULT: u32 = 4;
const POOL_CONNECTION_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);
const PRAGMA_SYNCHRONOUS_DEFAULT: &str = "NORMAL";

#[derive(Debug, Clone)]
struct DbRuntimeConfig {
    busy_timeout: Duration,
    pool_max_size: u32,
    pool_connection_timeout: Duration,
    pragma_synchronous: String,
}

impl DbRuntimeConfig {
    fn from_env() -> Self {
        Self::from_env_get(|key| env::var(key).ok())
    }

    fn from_env_get(mut get: impl FnMut(&str) -> Option<String>) -> Self {
        let busy_timeout = get("GH_PKCE_DB_BUSY_TIMEOUT_MS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(BUSY_TIMEOUT_DEFAULT);

        let pool_max_size = get("GH_PKCE_DB_POOL_MAX_SIZE")
            .as_deref()
            .and_then(parse_u32_trimmed)
            .filter(|v| *v > 0)
            .unwrap_or(POOL_MAX_SIZE_DEFAULT);

        let pool_connection_timeout = get("GH_PKCE_DB_POOL_CONNECTION_TIMEOUT_MS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(POOL_CONNECTION_TIMEOUT_DEFAULT);

        let pragma_synchronous = get("GH_PKCE_DB_PRAGMA_SYNCHRONOUS")
            .as_deref()
            .and_then(parse_pragma_synchronous)
            .unwrap_or_else(|| PRAGMA_SYNCHRONOUS_DEFAULT.to_string());

        Self {
            busy_timeout,
            pool_max_size,
            pool_connection_timeout,
            pragma_synchronous,
        }
    }
}

fn parse_u32_trimmed(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u32>().ok()
}

fn parse_u64_trimmed(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

fn parse_pragma_synchronous(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "OFF" | "NORMAL" | "FULL" | "EXTRA" => Some(normalized),
        _ => None,
    }
}

#[derive(Clone)]
pub(crate) struct Db {
    pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub(crate) fn open_connection(
        &self,
    ) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| db_err!("failed to get connection from pool: {e}"))
    }
}

pub(crate) fn open(path: &Path) -> AppResult<Db> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| db_err!("failed to create db dir {}: {e}", parent.display()))?;
    }

    let config = DbRuntimeConfig::from_env();
    tracing::debug!(
        path = %path.display(),
        busy_timeout_ms = config.busy_timeout.as_millis(),
        pool_max_size = config.pool_max_size,
        pool_connection_timeout_ms = config.pool_connection_timeout.as_millis(),
        pragma_synchronous = %config.pragma_synchronous,
        "sqlite runtime config"
    );

    let manager = SqliteConnectionManager::file(path).with_init({
        let config = config.clone();
        move |conn| {
            conn.busy_timeout(config.busy_timeout)?;
            configure_connection(conn, &config)
        }
    });
    build(pool_builder(&config), manager, &path.to_string_lossy())
}

/// In-memory databases are per-connection, so the pool is pinned to one connection that is never recycled.
pub(crate) fn open_in_memory() -> AppResult<Db> {
    let config = DbRuntimeConfig {
        pool_max_size: 1,
        ..DbRuntimeConfig::from_env_get(|_| None)
    };
    let builder = pool_builder(&config).idle_timeout(None).max_lifetime(None);
    build(builder, SqliteConnectionManager::memory(), ":memory:")
}

fn pool_builder(config: &DbRuntimeConfig) -> r2d2::Builder<SqliteConnectionManager> {
    Pool::builder()
        .max_size(config.pool_max_size)
        .connection_timeout(config.pool_connection_timeout)
}

fn build(
    builder: r2d2::Builder<SqliteConnectionManager>,
    manager: SqliteConnectionManager,
    path_hint: &str,
) -> AppResult<Db> {
    let pool = builder
        .build(manager)
        .map_err(|e| db_err!("failed to create db pool: {e}"))?;
    let mut conn = pool
        .get()
        .map_err(|e| db_err!("failed to get startup connection: {e}"))?;

    migrations::apply_migrations(&mut conn)
        .map_err(|e| db_err!("sqlite migration failed at {path_hint}: {e}"))?;

    Ok(Db { pool })
}

fn configure_connection(conn: &Connection, config: &DbRuntimeConfig) -> rusqlite::Result<()> {
    let sql = format!(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = {synchronous};
PRAGMA temp_store = MEMORY;
"#,
        synchronous = config.pragma_synchronous.as_str(),
    );

    conn.execute_batch(&sql)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn db_runtime_config_defaults_match_constants() {
        let cfg = DbRuntimeConfig::from_env_get(|_| None);
        assert_eq!(cfg.busy_timeout, BUSY_TIMEOUT_DEFAULT);
        assert_eq!(cfg.pool_max_size, POOL_MAX_SIZE_DEFAULT);
        assert_eq!(cfg.pool_connection_timeout, POOL_CONNECTION_TIMEOUT_DEFAULT);
        assert_eq!(cfg.pragma_synchronous, PRAGMA_SYNCHRONOUS_DEFAULT);
    }

    #[test]
    fn db_runtime_config_parses_env_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GH_PKCE_DB_BUSY_TIMEOUT_MS", "1500"),
            ("GH_PKCE_DB_POOL_MAX_SIZE", "2"),
            ("GH_PKCE_DB_POOL_CONNECTION_TIMEOUT_MS", "2500"),
            ("GH_PKCE_DB_PRAGMA_SYNCHRONOUS", "full"),
        ]);
        let cfg = DbRuntimeConfig::from_env_get(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(cfg.busy_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.pool_max_size, 2);
        assert_eq!(cfg.pool_connection_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.pragma_synchronous, "FULL");
    }

    #[test]
    fn db_runtime_config_ignores_invalid_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GH_PKCE_DB_BUSY_TIMEOUT_MS", "0"),
            ("GH_PKCE_DB_POOL_MAX_SIZE", "0"),
            ("GH_PKCE_DB_POOL_CONNECTION_TIMEOUT_MS", "nope"),
            ("GH_PKCE_DB_PRAGMA_SYNCHRONOUS", "invalid"),
        ]);
        let cfg = DbRuntimeConfig::from_env_get(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(cfg.busy_timeout, BUSY_TIMEOUT_DEFAULT);
        assert_eq!(cfg.pool_max_size, POOL_MAX_SIZE_DEFAULT);
        assert_eq!(cfg.pool_connection_timeout, POOL_CONNECTION_TIMEOUT_DEFAULT);
        assert_eq!(cfg.pragma_synchronous, PRAGMA_SYNCHRONOUS_DEFAULT);
    }

    #[test]
    fn open_in_memory_creates_kv_table() {
        let db = open_in_memory().expect("open");
        let conn = db.open_connection().expect("conn");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'kv_store'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(count, 1);
    }
}
