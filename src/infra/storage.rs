//! Usage: Persistent key/value storage used for the pending PKCE verifier and the session snapshot.
//!
//! The pending verifier must survive a full navigation to the provider and back, so the
//! production backend is a SQLite file. `MemoryStorage` is for tests and short-lived clients.

use crate::infra::db::{self, Db};
use crate::shared::error::{db_err, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::now_unix_seconds;
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Overwrites any existing value under `key`.
    fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock_or_recover().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock_or_recover()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.lock_or_recover().remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteStorage {
    db: Db,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            db: db::open(path.as_ref())?,
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            db: db::open_in_memory()?,
        })
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.db.open_connection()?;
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| db_err!("failed to read storage key {key}: {e}"))
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.db.open_connection()?;
        conn.execute(
            r#"
INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#,
            rusqlite::params![key, value, now_unix_seconds()],
        )
        .map_err(|e| db_err!("failed to write storage key {key}: {e}"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        let conn = self.db.open_connection()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])
            .map_err(|e| db_err!("failed to delete storage key {key}: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(storage: &dyn KeyValueStorage) {
        assert_eq!(storage.get("github_code_verifier").unwrap(), None);

        storage.set("github_code_verifier", "first").unwrap();
        storage.set("github_code_verifier", "second").unwrap();
        assert_eq!(
            storage.get("github_code_verifier").unwrap().as_deref(),
            Some("second")
        );

        storage.delete("github_code_verifier").unwrap();
        storage.delete("github_code_verifier").unwrap();
        assert_eq!(storage.get("github_code_verifier").unwrap(), None);
    }

    #[test]
    fn memory_storage_get_set_delete() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn sqlite_storage_get_set_delete() {
        exercise(&SqliteStorage::open_in_memory().expect("open"));
    }

    #[test]
    fn sqlite_storage_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("client.db");

        {
            let storage = SqliteStorage::open(&path).expect("open");
            storage.set("auth-storage", r#"{"github_access_token":"tok"}"#).unwrap();
        }

        let reopened = SqliteStorage::open(&path).expect("reopen");
        assert_eq!(
            reopened.get("auth-storage").unwrap().as_deref(),
            Some(r#"{"github_access_token":"tok"}"#)
        );
    }
}
