//! Usage: Security-sensitive helpers (token masking and log-safe provider bodies).

use serde_json::Value;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;
const LOG_SNIPPET_MAX_CHARS: usize = 500;

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !trimmed.is_ascii() {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc == "code"
        || key_lc == "code_verifier"
        || key_lc == "authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

/// Log-safe rendering of a provider response body: credential-like fields are
/// masked and the result is truncated.
pub(crate) fn sanitize_body_for_log(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(LOG_SNIPPET_MAX_CHARS).collect();
        }
    }
    body.chars().take(LOG_SNIPPET_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_keeps_prefix_and_suffix() {
        let token = "abcdef1234567890";
        assert_eq!(mask_token(token), "abcdef...7890");
    }

    #[test]
    fn mask_token_short_values_redacts_fully() {
        assert_eq!(mask_token("abcd"), "****");
        assert_eq!(mask_token("   "), "");
    }

    #[test]
    fn sanitize_body_masks_token_fields() {
        let raw = r#"{
          "access_token": "gho_abcdefghijklmnop",
          "nested": {"refresh_token": "ghr_0123456789abcdef"},
          "error": "bad_verification_code"
        }"#;
        let snippet = sanitize_body_for_log(raw);
        assert!(!snippet.contains("gho_abcdefghijklmnop"));
        assert!(!snippet.contains("ghr_0123456789abcdef"));
        assert!(snippet.contains(&mask_token("gho_abcdefghijklmnop")));
        assert!(snippet.contains("bad_verification_code"));
    }

    #[test]
    fn sanitize_body_truncates_plain_text() {
        let raw = "x".repeat(2_000);
        assert_eq!(sanitize_body_for_log(&raw).len(), LOG_SNIPPET_MAX_CHARS);
    }
}
