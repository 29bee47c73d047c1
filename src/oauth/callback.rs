//! Usage: Complete a GitHub login when the provider redirects back with `?code=...`.
//!
//! The pending verifier is single-use: it is removed on every exit path, so replaying the
//! same callback lands in `MissingInputs` without contacting the relay.

use crate::infra::settings::ClientConfig;
use crate::infra::storage::KeyValueStorage;
use crate::oauth::authorize::{Navigator, VERIFIER_STORAGE_KEY};
use crate::oauth::relay_client::TokenExchanger;
use crate::oauth::session::SessionStore;
use crate::shared::mutex_ext::MutexExt;
use std::sync::{Arc, Mutex};

pub const MISSING_INPUTS_MESSAGE: &str =
    "Authorization code or verifier not found. Please try logging in again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred during GitHub authentication.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackState {
    Exchanging,
    MissingInputs { message: String },
    Success,
    Failed { message: String },
}

impl CallbackState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Exchanging)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::MissingInputs { message } | Self::Failed { message } => Some(message),
            Self::Exchanging | Self::Success => None,
        }
    }
}

/// Query parameters GitHub appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Accepts an absolute URL, a path with query (`/auth/github/callback?code=..`) or a bare query.
pub fn parse_callback_query(target: &str) -> CallbackQuery {
    let raw = target.trim();
    let raw = raw.split('#').next().unwrap_or_default();
    let query = if let Ok(url) = reqwest::Url::parse(raw) {
        url.query().unwrap_or_default().to_string()
    } else if let Some((_, q)) = raw.split_once('?') {
        q.to_string()
    } else if raw.contains('=') {
        raw.to_string()
    } else {
        String::new()
    };

    // Any absolute base works; only the query string is read back.
    let Ok(mut url) = reqwest::Url::parse("http://callback.invalid/") else {
        return CallbackQuery::default();
    };
    url.set_query(Some(&query));

    let mut parsed = CallbackQuery::default();
    for (key, value) in url.query_pairs() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match key.as_ref() {
            "code" => &mut parsed.code,
            "error" => &mut parsed.error,
            "error_description" => &mut parsed.error_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    parsed
}

/// Deletes the pending verifier when dropped, including on panic or cancellation.
struct VerifierGuard {
    storage: Arc<dyn KeyValueStorage>,
    armed: bool,
}

impl VerifierGuard {
    fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            armed: true,
        }
    }

    fn release(mut self) {
        self.delete();
    }

    fn delete(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Err(err) = self.storage.delete(VERIFIER_STORAGE_KEY) {
            tracing::warn!("failed to delete pending code verifier: {err}");
        }
    }
}

impl Drop for VerifierGuard {
    fn drop(&mut self) {
        self.delete();
    }
}

pub struct CallbackHandler {
    storage: Arc<dyn KeyValueStorage>,
    exchanger: Arc<dyn TokenExchanger>,
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    landing_path: String,
    recovery_path: String,
    state: Mutex<CallbackState>,
}

impl CallbackHandler {
    pub fn new(
        config: &ClientConfig,
        storage: Arc<dyn KeyValueStorage>,
        exchanger: Arc<dyn TokenExchanger>,
        session: SessionStore,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            storage,
            exchanger,
            session,
            navigator,
            landing_path: config.landing_path.clone(),
            recovery_path: config.recovery_path.clone(),
            state: Mutex::new(CallbackState::Exchanging),
        }
    }

    pub fn state(&self) -> CallbackState {
        self.state.lock_or_recover().clone()
    }

    /// Where the user can go manually after a failed login.
    pub fn recovery_path(&self) -> &str {
        &self.recovery_path
    }

    /// Runs the callback to a terminal state. There is no retry: the code is single-use.
    pub async fn handle(&self, target: &str) -> CallbackState {
        self.set_state(CallbackState::Exchanging);
        let outcome = self.run(target).await;
        self.set_state(outcome.clone());
        outcome
    }

    async fn run(&self, target: &str) -> CallbackState {
        let query = parse_callback_query(target);
        let guard = VerifierGuard::new(self.storage.clone());

        let verifier = match self.storage.get(VERIFIER_STORAGE_KEY) {
            Ok(v) => v.filter(|v| !v.trim().is_empty()),
            Err(err) => {
                tracing::error!("failed to read pending code verifier: {err}");
                guard.release();
                return CallbackState::Failed {
                    message: GENERIC_FAILURE_MESSAGE.to_string(),
                };
            }
        };

        let (code, verifier) = match (query.code.as_deref(), verifier) {
            (Some(code), Some(verifier)) => (code.to_string(), verifier),
            (code, verifier) => {
                guard.release();
                tracing::warn!(
                    has_code = code.is_some(),
                    has_verifier = verifier.is_some(),
                    provider_error = query.error.as_deref().unwrap_or(""),
                    "github callback is missing its inputs"
                );
                return CallbackState::MissingInputs {
                    message: missing_inputs_message(&query),
                };
            }
        };

        tracing::info!("exchanging github authorization code");
        let result = self.exchanger.exchange(&code, &verifier).await;
        guard.release();

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(code = err.code(), "github token exchange failed: {}", err.message());
                let message = if err.code() == "OAUTH_EXCHANGE_REJECTED" {
                    err.message().to_string()
                } else {
                    GENERIC_FAILURE_MESSAGE.to_string()
                };
                return CallbackState::Failed { message };
            }
        };

        if let Err(err) = self.session.set_token(Some(response.access_token)) {
            tracing::error!("failed to store github access token: {err}");
            return CallbackState::Failed {
                message: GENERIC_FAILURE_MESSAGE.to_string(),
            };
        }

        tracing::info!(scope = %response.scope, "github login completed");
        if let Err(err) = self.navigator.navigate(&self.landing_path) {
            tracing::error!(
                landing_path = %self.landing_path,
                "failed to navigate after login: {err}"
            );
        }
        CallbackState::Success
    }

    fn set_state(&self, next: CallbackState) {
        *self.state.lock_or_recover() = next;
    }
}

fn missing_inputs_message(query: &CallbackQuery) -> String {
    match query.error_description.as_deref().or(query.error.as_deref()) {
        Some(detail) => format!("GitHub authorization failed: {detail}. {MISSING_INPUTS_MESSAGE}"),
        None => MISSING_INPUTS_MESSAGE.to_string(),
    }
}
