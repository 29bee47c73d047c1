//! Usage: Server-to-server authorization code exchange against the GitHub token endpoint.

use axum::http::StatusCode;
use reqwest::header::ACCEPT;
use serde_json::Value;

use super::errors::RelayError;
use crate::protocol::ExchangeTokenResponse;
use crate::shared::security::sanitize_body_for_log;

pub(crate) struct TokenExchangeRequest<'a> {
    pub(crate) token_url: &'a str,
    pub(crate) client_id: &'a str,
    pub(crate) client_secret: &'a str,
    pub(crate) code: &'a str,
    pub(crate) redirect_uri: Option<&'a str>,
    pub(crate) code_verifier: &'a str,
}

/// One attempt, no retry: authorization codes are single-use.
pub(crate) async fn exchange_authorization_code(
    client: &reqwest::Client,
    req: &TokenExchangeRequest<'_>,
) -> Result<ExchangeTokenResponse, RelayError> {
    let mut form: Vec<(&str, &str)> = vec![
        ("client_id", req.client_id),
        ("client_secret", req.client_secret),
        ("code", req.code),
    ];
    if let Some(redirect_uri) = req.redirect_uri {
        form.push(("redirect_uri", redirect_uri));
    }
    form.push(("code_verifier", req.code_verifier));

    let response = client
        .post(req.token_url)
        .header(ACCEPT, "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            if e.is_builder() {
                tracing::error!("failed to build github token request: {e}");
                RelayError::Internal
            } else {
                tracing::error!(
                    timeout = e.is_timeout(),
                    connect = e.is_connect(),
                    "github token endpoint unreachable: {e}"
                );
                RelayError::NoResponse
            }
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        tracing::error!(status = status.as_u16(), "github token response read failed: {e}");
        RelayError::NoResponse
    })?;

    parse_token_response(status, &body)
}

fn parse_token_response(
    status: StatusCode,
    body: &str,
) -> Result<ExchangeTokenResponse, RelayError> {
    let parsed = serde_json::from_str::<Value>(body);

    if !status.is_success() {
        tracing::warn!(
            status = status.as_u16(),
            body = %sanitize_body_for_log(body),
            "github token endpoint rejected the exchange"
        );
        let details = parsed.unwrap_or_else(|_| Value::String(body.to_string()));
        return Err(RelayError::ProviderRejected {
            status,
            details,
        });
    }

    let value = match parsed {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                status = status.as_u16(),
                body = %sanitize_body_for_log(body),
                "github token endpoint returned a non-JSON body: {e}"
            );
            return Err(RelayError::ProviderRejected {
                status: StatusCode::BAD_GATEWAY,
                details: Value::String(body.to_string()),
            });
        }
    };

    let access_token = string_field(&value, "access_token");
    let Some(access_token) = access_token else {
        tracing::warn!(
            status = status.as_u16(),
            body = %sanitize_body_for_log(body),
            "github token response carried no access token"
        );
        return Err(RelayError::ProviderRejected {
            status: StatusCode::BAD_REQUEST,
            details: value,
        });
    };

    Ok(ExchangeTokenResponse {
        access_token,
        scope: string_field(&value, "scope").unwrap_or_default(),
        token_type: string_field(&value, "token_type").unwrap_or_default(),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_keeps_only_token_fields() {
        let resp = parse_token_response(
            StatusCode::OK,
            r#"{"access_token":"gho_x","scope":"repo,user","token_type":"bearer","refresh_token":"ghr_y"}"#,
        )
        .unwrap();
        assert_eq!(resp.access_token, "gho_x");
        assert_eq!(resp.scope, "repo,user");
        assert_eq!(resp.token_type, "bearer");
    }

    #[test]
    fn ok_status_with_error_payload_is_rejection() {
        let body = r#"{"error":"bad_verification_code","error_description":"The code passed is incorrect or expired."}"#;
        let err = parse_token_response(StatusCode::OK, body).unwrap_err();
        match err {
            RelayError::ProviderRejected { status, details } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(details["error"], "bad_verification_code");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn error_status_is_echoed_with_json_details() {
        let err = parse_token_response(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"incorrect_client_credentials"}"#,
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            err.body().details,
            Some(json!({ "error": "incorrect_client_credentials" }))
        );
    }

    #[test]
    fn error_status_with_text_body_keeps_raw_details() {
        let err =
            parse_token_response(StatusCode::SERVICE_UNAVAILABLE, "upstream down").unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body().details, Some(json!("upstream down")));
    }

    #[test]
    fn ok_status_with_non_json_body_is_bad_gateway() {
        let err = parse_token_response(StatusCode::OK, "<html>").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
