//! Usage: Relay and client configuration (env vars, optional TOML file, sanitization).
//!
//! The relay is the only component that ever sees the GitHub client secret. `RelayConfig`
//! keeps it out of `Debug` output so a stray `{:?}` in a log line cannot leak it.

use crate::relay::listen;
use crate::shared::error::AppResult;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RELAY_PORT: u16 = 3001;
pub const DEFAULT_GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const DEFAULT_GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
pub const DEFAULT_EXCHANGE_TOKEN_URL: &str =
    "http://localhost:3001/api/auth/github/exchange-token";
pub const DEFAULT_LANDING_PATH: &str = "/repositories";
const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_EXCHANGE_TIMEOUT_SECONDS: u64 = 30;
const MAX_TIMEOUT_SECONDS: u64 = 5 * 60;
const CONFIG_FILE_ENV: &str = "RELAY_CONFIG_FILE";

/// Optional file layer; every key mirrors an env var in snake_case.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelayFileConfig {
    listen_address: Option<String>,
    port: Option<u16>,
    github_client_id: Option<String>,
    github_client_secret: Option<String>,
    github_redirect_uri: Option<String>,
    github_token_url: Option<String>,
    frontend_url: Option<String>,
    upstream_connect_timeout_seconds: Option<u64>,
    upstream_timeout_seconds: Option<u64>,
    log_dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct RelayConfig {
    pub listen_host: String,
    pub port: u16,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub github_redirect_uri: Option<String>,
    pub github_token_url: String,
    pub frontend_origin: Option<String>,
    pub upstream_connect_timeout: Duration,
    pub upstream_timeout: Duration,
    pub log_dir: Option<PathBuf>,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("listen_host", &self.listen_host)
            .field("port", &self.port)
            .field("github_client_id", &self.github_client_id)
            .field(
                "github_client_secret",
                &self.github_client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("github_redirect_uri", &self.github_redirect_uri)
            .field("github_token_url", &self.github_token_url)
            .field("frontend_origin", &self.frontend_origin)
            .field("upstream_connect_timeout", &self.upstream_connect_timeout)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            port: DEFAULT_RELAY_PORT,
            github_client_id: None,
            github_client_secret: None,
            github_redirect_uri: None,
            github_token_url: DEFAULT_GITHUB_TOKEN_URL.to_string(),
            frontend_origin: None,
            upstream_connect_timeout: Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECONDS),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
            log_dir: None,
        }
    }
}

impl RelayConfig {
    /// Reads `RELAY_CONFIG_FILE` (if set) and then the process environment; env wins.
    pub fn load() -> AppResult<Self> {
        let file = match non_empty(env::var(CONFIG_FILE_ENV).ok()) {
            Some(path) => Some(read_config_file(&PathBuf::from(path))?),
            None => None,
        };
        Self::from_sources(file.unwrap_or_default(), |key| env::var(key).ok())
    }

    pub fn from_env_get(get: impl FnMut(&str) -> Option<String>) -> AppResult<Self> {
        Self::from_sources(RelayFileConfig::default(), get)
    }

    pub fn from_toml_str(raw: &str, get: impl FnMut(&str) -> Option<String>) -> AppResult<Self> {
        let file: RelayFileConfig =
            toml::from_str(raw).map_err(|e| format!("CONFIG_ERROR: invalid relay config file: {e}"))?;
        Self::from_sources(file, get)
    }

    fn from_sources(
        file: RelayFileConfig,
        mut get: impl FnMut(&str) -> Option<String>,
    ) -> AppResult<Self> {
        let defaults = Self::default();

        let listen_raw = non_empty(get("RELAY_LISTEN_ADDRESS")).or(file.listen_address);
        let parsed = listen::parse_listen_address(listen_raw.as_deref().unwrap_or(""))
            .map_err(|e| format!("CONFIG_ERROR: RELAY_LISTEN_ADDRESS: {e}"))?;

        let env_port = match non_empty(get("PORT")) {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .map_err(|_| format!("CONFIG_ERROR: PORT must be a port number, got {raw}"))?,
            ),
            None => None,
        };
        let port = parsed
            .port
            .or(env_port)
            .or(file.port)
            .unwrap_or(defaults.port);

        let connect_timeout_secs = non_empty(get("RELAY_UPSTREAM_CONNECT_TIMEOUT_SECONDS"))
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.upstream_connect_timeout_seconds);
        let timeout_secs = non_empty(get("RELAY_UPSTREAM_TIMEOUT_SECONDS"))
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.upstream_timeout_seconds);

        let config = Self {
            listen_host: parsed.host,
            port,
            github_client_id: non_empty(get("GITHUB_CLIENT_ID")).or(non_empty(file.github_client_id)),
            github_client_secret: non_empty(get("GITHUB_CLIENT_SECRET"))
                .or(non_empty(file.github_client_secret)),
            github_redirect_uri: non_empty(get("GITHUB_REDIRECT_URI"))
                .or(non_empty(file.github_redirect_uri)),
            github_token_url: non_empty(get("GITHUB_TOKEN_URL"))
                .or(non_empty(file.github_token_url))
                .unwrap_or(defaults.github_token_url),
            frontend_origin: non_empty(get("FRONTEND_URL"))
                .or(non_empty(file.frontend_url))
                .map(|v| normalize_origin(&v)),
            upstream_connect_timeout: sanitize_timeout(
                connect_timeout_secs,
                DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECONDS,
            ),
            upstream_timeout: sanitize_timeout(timeout_secs, DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
            log_dir: non_empty(get("RELAY_LOG_DIR"))
                .map(PathBuf::from)
                .or(file.log_dir),
        };

        Ok(config)
    }

    /// Client id and secret are both required before any exchange is attempted.
    pub fn is_exchange_configured(&self) -> bool {
        self.github_client_id.is_some() && self.github_client_secret.is_some()
    }

    pub fn listen_address(&self) -> String {
        listen::format_host_port(&self.listen_host, self.port)
    }
}

/// Client-side settings for starting a login and reaching the relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub exchange_token_url: String,
    pub exchange_timeout: Duration,
    pub landing_path: String,
    pub recovery_path: String,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            authorize_url: DEFAULT_GITHUB_AUTHORIZE_URL.to_string(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            exchange_token_url: DEFAULT_EXCHANGE_TOKEN_URL.to_string(),
            exchange_timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECONDS),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            recovery_path: DEFAULT_LANDING_PATH.to_string(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exchange_token_url(mut self, url: impl Into<String>) -> Self {
        self.exchange_token_url = url.into();
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_env_get(|key| env::var(key).ok())
    }

    pub fn from_env_get(mut get: impl FnMut(&str) -> Option<String>) -> AppResult<Self> {
        let client_id = non_empty(get("GITHUB_CLIENT_ID"))
            .ok_or_else(|| "CONFIG_ERROR: GITHUB_CLIENT_ID is not set".to_string())?;
        let redirect_uri = non_empty(get("GITHUB_REDIRECT_URI"))
            .ok_or_else(|| "CONFIG_ERROR: GITHUB_REDIRECT_URI is not set".to_string())?;

        let mut config = Self::new(client_id, redirect_uri);
        if let Some(raw) = non_empty(get("GITHUB_SCOPES")) {
            config.scopes = split_scopes(&raw);
        }
        if let Some(url) = non_empty(get("GITHUB_EXCHANGE_TOKEN_URL")) {
            config.exchange_token_url = url;
        }
        if let Some(url) = non_empty(get("GITHUB_AUTHORIZE_URL")) {
            config.authorize_url = url;
        }
        let timeout_secs = non_empty(get("GITHUB_EXCHANGE_TIMEOUT_SECONDS"))
            .and_then(|v| v.parse::<u64>().ok());
        config.exchange_timeout = sanitize_timeout(timeout_secs, DEFAULT_EXCHANGE_TIMEOUT_SECONDS);
        Ok(config)
    }
}

fn read_config_file(path: &PathBuf) -> AppResult<RelayFileConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        format!(
            "CONFIG_ERROR: failed to read relay config file {}: {e}",
            path.display()
        )
    })?;
    toml::from_str(&raw).map_err(|e| {
        format!(
            "CONFIG_ERROR: invalid relay config file {}: {e}",
            path.display()
        )
        .into()
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_origin(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn sanitize_timeout(value: Option<u64>, default_secs: u64) -> Duration {
    let secs = match value {
        None | Some(0) => default_secs,
        Some(v) => v.min(MAX_TIMEOUT_SECONDS),
    };
    Duration::from_secs(secs)
}
