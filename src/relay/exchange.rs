//! Usage: `POST /api/auth/github/exchange-token` handler.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;

use super::errors::RelayError;
use super::server::RelayAppState;
use super::token_exchange::{exchange_authorization_code, TokenExchangeRequest};
use crate::protocol::{ExchangeTokenRequest, ExchangeTokenResponse};
use serde_json::Value;

pub(super) async fn exchange_token(State(state): State<RelayAppState>, body: Bytes) -> Response {
    match exchange(&state, &body).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Input and configuration are checked before any outbound call.
pub(super) async fn exchange(
    state: &RelayAppState,
    body: &[u8],
) -> Result<ExchangeTokenResponse, RelayError> {
    let request = parse_body(body)?;

    let code = non_empty(request.code.as_deref()).ok_or(RelayError::MissingCode)?;
    let code_verifier =
        non_empty(request.code_verifier.as_deref()).ok_or(RelayError::MissingVerifier)?;

    let config = &state.config;
    let (Some(client_id), Some(client_secret)) = (
        config.github_client_id.as_deref(),
        config.github_client_secret.as_deref(),
    ) else {
        tracing::error!(
            has_client_id = config.github_client_id.is_some(),
            has_client_secret = config.github_client_secret.is_some(),
            "github oauth credentials are not configured; refusing token exchange"
        );
        return Err(RelayError::Misconfigured);
    };

    let req = TokenExchangeRequest {
        token_url: &config.github_token_url,
        client_id,
        client_secret,
        code,
        redirect_uri: config.github_redirect_uri.as_deref(),
        code_verifier,
    };
    let resp = exchange_authorization_code(&state.client, &req).await?;

    tracing::info!(
        scope = %resp.scope,
        token_type = %resp.token_type,
        "github token exchange succeeded"
    );
    Ok(resp)
}

fn parse_body(body: &[u8]) -> Result<ExchangeTokenRequest, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExchangeTokenRequest::default());
    }
    let value = serde_json::from_slice::<Value>(body).map_err(|e| {
        tracing::warn!("rejecting token exchange with malformed body: {e}");
        RelayError::InvalidJson
    })?;
    let Value::Object(fields) = value else {
        tracing::warn!("rejecting token exchange whose body is not a json object");
        return Err(RelayError::InvalidJson);
    };
    // Non-string values count as absent.
    let string_field = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
    Ok(ExchangeTokenRequest {
        code: string_field("code"),
        code_verifier: string_field("code_verifier"),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
