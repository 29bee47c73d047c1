//! Usage: Wire types of the relay's token exchange endpoint, shared by the relay and its client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::shared::security::mask_token;

pub const EXCHANGE_TOKEN_PATH: &str = "/api/auth/github/exchange-token";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeTokenRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

/// Only these three fields ever leave the relay, whatever else the provider returned.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
}

impl fmt::Debug for ExchangeTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeTokenResponse")
            .field("access_token", &mask_token(&self.access_token))
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_absent_fields() {
        let body = serde_json::to_value(ExchangeTokenRequest {
            code: Some("ABC123".to_string()),
            code_verifier: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "code": "ABC123" }));
    }

    #[test]
    fn response_debug_masks_access_token() {
        let resp = ExchangeTokenResponse {
            access_token: "gho_1234567890abcdef".to_string(),
            scope: "repo".to_string(),
            token_type: "bearer".to_string(),
        };
        let rendered = format!("{resp:?}");
        assert!(!rendered.contains("gho_1234567890abcdef"));
        assert!(rendered.contains("repo"));
    }

    #[test]
    fn error_body_skips_missing_details() {
        let body = serde_json::to_value(RelayErrorBody {
            error: "Server configuration error.".to_string(),
            details: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Server configuration error." }));
    }
}
