//! Usage: Session token store shared by the callback handler and downstream GitHub API callers.
//!
//! The token is mirrored into durable storage under [`SESSION_STORAGE_KEY`] as
//! `{"github_access_token": string|null}` so a restarted client keeps its session.

use crate::infra::storage::KeyValueStorage;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

pub const SESSION_STORAGE_KEY: &str = "auth-storage";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionSnapshot {
    #[serde(default)]
    github_access_token: Option<String>,
}

struct SessionInner {
    storage: Arc<dyn KeyValueStorage>,
    token: watch::Sender<Option<String>>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = self.get_token();
        f.debug_struct("SessionStore")
            .field("github_access_token", &token.as_deref().map(mask_token))
            .finish()
    }
}

impl SessionStore {
    /// Restores the last persisted session. A corrupt snapshot is dropped with a warning.
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> AppResult<Self> {
        let raw = storage
            .get(SESSION_STORAGE_KEY)
            .map_err(|e| format!("STORAGE_ERROR: failed to read session: {e}"))?;

        let snapshot = match raw {
            None => SessionSnapshot::default(),
            Some(raw) => serde_json::from_str::<SessionSnapshot>(&raw).unwrap_or_else(|e| {
                tracing::warn!("discarding unreadable session snapshot: {e}");
                SessionSnapshot::default()
            }),
        };
        let token = snapshot.github_access_token.filter(|t| !t.trim().is_empty());

        let (tx, _rx) = watch::channel(token);
        Ok(Self {
            inner: Arc::new(SessionInner { storage, token: tx }),
        })
    }

    pub fn get_token(&self) -> Option<String> {
        self.inner.token.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.token.borrow().is_some()
    }

    /// Overwrites the current token (or clears it with `None`) and persists the change.
    pub fn set_token(&self, token: Option<String>) -> AppResult<()> {
        let snapshot = SessionSnapshot {
            github_access_token: token.clone(),
        };
        let encoded = serde_json::to_string(&snapshot)
            .map_err(|e| format!("SYSTEM_ERROR: failed to encode session: {e}"))?;
        self.inner
            .storage
            .set(SESSION_STORAGE_KEY, &encoded)
            .map_err(|e| format!("STORAGE_ERROR: failed to persist session: {e}"))?;

        self.inner.token.send_replace(token);
        Ok(())
    }

    /// Receives every token change after the call.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.inner.token.subscribe()
    }

    pub fn logout(&self) -> AppResult<()> {
        tracing::info!("github session cleared");
        self.set_token(None)
    }

    /// `Bearer <token>` for GitHub API requests, if signed in.
    pub fn authorization_header(&self) -> Option<String> {
        self.get_token().map(|token| format!("Bearer {token}"))
    }

    /// Downstream callers report API response statuses here; a 401 ends the session.
    pub fn clear_if_unauthorized(&self, status: reqwest::StatusCode) -> AppResult<bool> {
        if status != reqwest::StatusCode::UNAUTHORIZED || !self.is_authenticated() {
            return Ok(false);
        }
        tracing::warn!("github api rejected the stored token; signing out");
        self.set_token(None)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::MemoryStorage;

    fn storage() -> Arc<dyn KeyValueStorage> {
        Arc::new(MemoryStorage::new())
    }

    #[test]
    fn set_token_persists_snapshot() {
        let storage = storage();
        let session = SessionStore::load(storage.clone()).unwrap();
        assert_eq!(session.get_token(), None);

        session.set_token(Some("gho_token".to_string())).unwrap();
        let raw = storage.get(SESSION_STORAGE_KEY).unwrap().expect("snapshot");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({ "github_access_token": "gho_token" }));

        let restored = SessionStore::load(storage).unwrap();
        assert_eq!(restored.get_token().as_deref(), Some("gho_token"));
    }

    #[test]
    fn logout_clears_token() {
        let session = SessionStore::load(storage()).unwrap();
        session.set_token(Some("gho_token".to_string())).unwrap();
        session.logout().unwrap();
        assert_eq!(session.get_token(), None);
        assert_eq!(session.authorization_header(), None);
    }

    #[test]
    fn corrupt_snapshot_loads_empty() {
        let storage = storage();
        storage.set(SESSION_STORAGE_KEY, "{not json").unwrap();
        let session = SessionStore::load(storage).unwrap();
        assert_eq!(session.get_token(), None);
    }

    #[test]
    fn authorization_header_uses_bearer_scheme() {
        let session = SessionStore::load(storage()).unwrap();
        session.set_token(Some("gho_abc".to_string())).unwrap();
        assert_eq!(session.authorization_header().as_deref(), Some("Bearer gho_abc"));
    }

    #[test]
    fn only_unauthorized_clears_session() {
        let session = SessionStore::load(storage()).unwrap();
        session.set_token(Some("gho_abc".to_string())).unwrap();

        assert!(!session.clear_if_unauthorized(reqwest::StatusCode::FORBIDDEN).unwrap());
        assert!(session.is_authenticated());

        assert!(session.clear_if_unauthorized(reqwest::StatusCode::UNAUTHORIZED).unwrap());
        assert!(!session.is_authenticated());
        assert!(!session.clear_if_unauthorized(reqwest::StatusCode::UNAUTHORIZED).unwrap());
    }

    #[test]
    fn debug_masks_token() {
        let session = SessionStore::load(storage()).unwrap();
        session.set_token(Some("gho_1234567890abcdef".to_string())).unwrap();
        assert!(!format!("{session:?}").contains("gho_1234567890abcdef"));
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let session = SessionStore::load(storage()).unwrap();
        let mut rx = session.subscribe();

        let clone = session.clone();
        clone.set_token(Some("gho_new".to_string())).unwrap();

        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow_and_update().as_deref(), Some("gho_new"));
    }
}
