//! Usage: Client side of the token exchange: POST `{code, code_verifier}` to the relay.

use crate::infra::settings::ClientConfig;
use crate::protocol::{ExchangeTokenRequest, ExchangeTokenResponse};
use crate::shared::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

pub(crate) const REJECTED_FALLBACK_MESSAGE: &str = "Failed to exchange token with GitHub.";
pub(crate) const TOKEN_MISSING_MESSAGE: &str = "Access token not found in GitHub response.";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Exchanges an authorization code for an access token. Called at most once per code.
///
/// Rejections carry `OAUTH_EXCHANGE_REJECTED` with a user-facing message; transport
/// failures carry `SYSTEM_ERROR`.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, code: &str, code_verifier: &str)
        -> AppResult<ExchangeTokenResponse>;
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    exchange_token_url: String,
}

impl RelayClient {
    pub fn new(config: &ClientConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "github-pkce-relay-client/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(CONNECT_TIMEOUT.min(config.exchange_timeout))
            .timeout(config.exchange_timeout)
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: relay client init failed: {e}"))?;
        Ok(Self {
            client,
            exchange_token_url: config.exchange_token_url.clone(),
        })
    }
}

#[async_trait]
impl TokenExchanger for RelayClient {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> AppResult<ExchangeTokenResponse> {
        let payload = ExchangeTokenRequest {
            code: Some(code.to_string()),
            code_verifier: Some(code_verifier.to_string()),
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| format!("SYSTEM_ERROR: failed to encode exchange request: {e}"))?;

        let response = self
            .client
            .post(&self.exchange_token_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::new(
                    "SYSTEM_ERROR",
                    format!("token exchange request failed: {e}"),
                )
                .with_source(e)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: token exchange response read failed: {e}"))?;

        interpret_relay_response(status, &text)
    }
}

/// Maps a relay response onto the exchange outcome.
pub(crate) fn interpret_relay_response(
    status: reqwest::StatusCode,
    body: &str,
) -> AppResult<ExchangeTokenResponse> {
    let value = serde_json::from_str::<Value>(body).ok();

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "token exchange rejected by relay");
        let message = value
            .as_ref()
            .and_then(select_rejection_message)
            .unwrap_or_else(|| REJECTED_FALLBACK_MESSAGE.to_string());
        return Err(AppError::new("OAUTH_EXCHANGE_REJECTED", message));
    }

    let value = value.ok_or_else(|| {
        AppError::new("OAUTH_EXCHANGE_REJECTED", TOKEN_MISSING_MESSAGE)
    })?;
    let has_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty());
    if !has_token {
        let message = value
            .get("error_description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(TOKEN_MISSING_MESSAGE);
        return Err(AppError::new("OAUTH_EXCHANGE_REJECTED", message));
    }

    serde_json::from_value::<ExchangeTokenResponse>(value)
        .map_err(|e| format!("OAUTH_EXCHANGE_REJECTED: malformed token response: {e}").into())
}

fn select_rejection_message(value: &Value) -> Option<String> {
    let details = value.get("details");
    [
        value.get("error_description"),
        details.and_then(|d| d.get("error_description")),
        details.and_then(|d| d.get("error")),
        value.get("error"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(str::to_string)
}
