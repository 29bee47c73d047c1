//! Usage: Start a GitHub login: create and persist the PKCE verifier, then send the user agent to GitHub.

use crate::infra::settings::ClientConfig;
use crate::infra::storage::KeyValueStorage;
use crate::oauth::pkce::{ChallengeHasher, PkcePair, RandomSource, DEFAULT_VERIFIER_LENGTH};
use crate::shared::error::AppResult;
use std::process::Command;

/// Durable storage key for the verifier that is waiting on the provider's redirect.
pub const VERIFIER_STORAGE_KEY: &str = "github_code_verifier";

/// Full navigation of the user agent. Accepts absolute URLs and in-app paths such as `/repositories`.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str) -> AppResult<()>;
}

/// Opens targets in the OS default browser. In-app paths are resolved against `app_base_url`.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowserNavigator {
    app_base_url: Option<String>,
}

impl SystemBrowserNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_base_url(mut self, base: impl Into<String>) -> Self {
        self.app_base_url = Some(base.into());
        self
    }

    fn resolve(&self, target: &str) -> AppResult<String> {
        if reqwest::Url::parse(target).is_ok() {
            return Ok(target.to_string());
        }
        let base = self.app_base_url.as_deref().ok_or_else(|| {
            format!("SYSTEM_ERROR: cannot open relative target {target} without an app base url")
        })?;
        let base = reqwest::Url::parse(base)
            .map_err(|e| format!("CONFIG_ERROR: invalid app base url: {e}"))?;
        let joined = base
            .join(target)
            .map_err(|e| format!("SYSTEM_ERROR: invalid navigation target {target}: {e}"))?;
        Ok(joined.to_string())
    }
}

impl Navigator for SystemBrowserNavigator {
    fn navigate(&self, target: &str) -> AppResult<()> {
        let url = self.resolve(target)?;
        open_browser(&url)
    }
}

fn open_browser(url: &str) -> AppResult<()> {
    #[cfg(target_os = "windows")]
    {
        build_windows_open_browser_command(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        Command::new("open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    Err("SYSTEM_ERROR: browser open is unsupported on this platform"
        .to_string()
        .into())
}

#[cfg(target_os = "windows")]
fn build_windows_open_browser_command(url: &str) -> Command {
    let mut cmd = Command::new("rundll32.exe");
    // `explorer <url>` can open File Explorer for some URL shapes.
    cmd.arg("url.dll,FileProtocolHandler").arg(url);
    cmd
}

/// Pure: the GitHub authorization URL for `code_challenge`.
pub fn build_authorize_url(config: &ClientConfig, code_challenge: &str) -> AppResult<String> {
    let mut url = reqwest::Url::parse(&config.authorize_url)
        .map_err(|e| format!("CONFIG_ERROR: invalid authorize url: {e}"))?;
    {
        let scope = config.scopes.join(" ");
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", &config.redirect_uri);
        query.append_pair("scope", &scope);
        query.append_pair("response_type", "code");
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", "S256");
    }
    Ok(url.to_string())
}

/// Persists a fresh verifier (replacing any stale one) and navigates to GitHub.
///
/// Nothing is navigated unless the verifier was stored. Returns the URL that was opened.
pub fn begin_login(
    config: &ClientConfig,
    storage: &dyn KeyValueStorage,
    navigator: &dyn Navigator,
    rng: &dyn RandomSource,
    hasher: &dyn ChallengeHasher,
) -> AppResult<String> {
    let pair = PkcePair::generate(rng, hasher, DEFAULT_VERIFIER_LENGTH)?;
    let url = build_authorize_url(config, &pair.code_challenge)?;

    storage
        .set(VERIFIER_STORAGE_KEY, &pair.code_verifier)
        .map_err(|e| format!("STORAGE_ERROR: failed to persist code verifier: {e}"))?;

    tracing::info!(
        client_id = %config.client_id,
        scopes = %config.scopes.join(" "),
        "redirecting to github authorization"
    );
    navigator.navigate(&url)?;
    Ok(url)
}
