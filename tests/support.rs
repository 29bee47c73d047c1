#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use github_pkce_relay::{
    derive_challenge, AppResult, Navigator, RelayConfig, RelayServer, Sha256Hasher,
};
use tokio::sync::oneshot;

pub const TOKEN_PATH: &str = "/login/oauth/access_token";
pub const CLIENT_ID: &str = "Iv1.test-client";
pub const CLIENT_SECRET: &str = "test-client-secret";
pub const REDIRECT_URI: &str = "http://localhost:5173/auth/github/callback";
pub const FRONTEND_URL: &str = "http://localhost:5173";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How the stub token endpoint answers.
#[derive(Clone)]
pub enum StubMode {
    /// Issues `token` only when SHA-256(code_verifier) matches `challenge`, like GitHub.
    VerifyPkce { challenge: String, token: String },
    Fixed {
        status: StatusCode,
        content_type: &'static str,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub form: Vec<(String, String)>,
    pub accept: Option<String>,
}

impl RecordedRequest {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.form.iter().map(|(k, _)| k.as_str()).collect()
    }
}

struct StubState {
    mode: Mutex<StubMode>,
    requests: Mutex<Vec<RecordedRequest>>,
}

async fn token_endpoint(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    let recorded = RecordedRequest {
        form,
        accept: headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let verifier = recorded.field("code_verifier").unwrap_or_default().to_string();
    lock(&state.requests).push(recorded);

    let mode = lock(&state.mode).clone();
    match mode {
        StubMode::VerifyPkce { challenge, token } => {
            if derive_challenge(&Sha256Hasher, &verifier) == challenge {
                Json(serde_json::json!({
                    "access_token": token,
                    "token_type": "bearer",
                    "scope": "repo,read:user",
                }))
                .into_response()
            } else {
                Json(serde_json::json!({
                    "error": "bad_verification_code",
                    "error_description": "The code passed is incorrect or expired.",
                    "error_uri": "https://docs.github.com/apps/managing-oauth-apps/troubleshooting-oauth-app-access-token-request-errors/#bad-verification-code",
                }))
                .into_response()
            }
        }
        StubMode::Fixed {
            status,
            content_type,
            body,
        } => (status, [(header::CONTENT_TYPE, content_type)], body).into_response(),
    }
}

/// Fake GitHub token endpoint on an ephemeral local port.
pub struct StubGithub {
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubGithub {
    pub async fn start(mode: StubMode) -> Self {
        let state = Arc::new(StubState {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route(TOKEN_PATH, post(token_endpoint))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    pub fn json(status: StatusCode, body: serde_json::Value) -> StubMode {
        StubMode::Fixed {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn token_url(&self) -> String {
        format!("http://{}{TOKEN_PATH}", self.addr)
    }

    pub fn set_mode(&self, mode: StubMode) {
        *lock(&self.state.mode) = mode;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }
}

impl Drop for StubGithub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A URL whose server accepts connections and closes them without answering.
pub async fn hangup_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind hangup");
    let addr = listener.local_addr().expect("hangup addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    format!("http://{addr}{TOKEN_PATH}")
}

/// A URL whose server accepts connections, reads nothing and never answers.
pub async fn stalled_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stalled");
    let addr = listener.local_addr().expect("stalled addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{addr}{TOKEN_PATH}")
}

pub fn relay_config(token_url: &str) -> RelayConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("RELAY_LISTEN_ADDRESS", "127.0.0.1:0".to_string()),
        ("GITHUB_CLIENT_ID", CLIENT_ID.to_string()),
        ("GITHUB_CLIENT_SECRET", CLIENT_SECRET.to_string()),
        ("GITHUB_REDIRECT_URI", REDIRECT_URI.to_string()),
        ("GITHUB_TOKEN_URL", token_url.to_string()),
        ("FRONTEND_URL", FRONTEND_URL.to_string()),
        ("RELAY_UPSTREAM_TIMEOUT_SECONDS", "5".to_string()),
    ]);
    RelayConfig::from_env_get(|key| vars.get(key).cloned()).expect("relay config")
}

pub async fn start_relay(config: RelayConfig) -> RelayServer {
    RelayServer::start(config).await.expect("start relay")
}

/// POSTs a raw body to the relay's exchange endpoint; returns status and parsed JSON.
pub async fn post_exchange(relay: &RelayServer, body: &str) -> (u16, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(relay.exchange_token_url())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .send()
        .await
        .expect("relay reachable");
    let status = resp.status().as_u16();
    let text = resp.text().await.expect("relay body");
    let json = serde_json::from_str(&text).expect("relay json");
    (status, json)
}

#[derive(Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn targets(&self) -> Vec<String> {
        lock(&self.targets).clone()
    }

    pub fn last(&self) -> Option<String> {
        lock(&self.targets).last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) -> AppResult<()> {
        lock(&self.targets).push(target.to_string());
        Ok(())
    }
}

pub fn query_param(url: &str, key: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
