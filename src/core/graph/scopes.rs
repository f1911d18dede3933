//! Local inspection of access-token claims. Tokens are decoded, never verified:
//! Graph does the verification, this only catches missing consent early.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeCheck {
    pub has_all: bool,
    pub missing: Vec<String>,
    pub actual: Vec<String>,
}

/// Payload segment of a JWT as JSON, or `None` when the token is not a decodable JWT.
pub fn decode_claims(token: &str) -> Option<Value> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

/// Delegated scopes from `scp`, falling back to app `roles`.
pub fn token_scopes(claims: &Value) -> Vec<String> {
    fn split(value: &Value) -> Vec<String> {
        match value {
            Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .flat_map(str::split_whitespace)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    let scopes = claims.get("scp").map(split).unwrap_or_default();
    if !scopes.is_empty() {
        return scopes;
    }
    claims.get("roles").map(split).unwrap_or_default()
}

pub fn check_scopes(token: &str, required: &[&str]) -> ScopeCheck {
    let Some(claims) = decode_claims(token) else {
        return ScopeCheck {
            has_all: false,
            missing: required.iter().map(|s| s.to_string()).collect(),
            actual: Vec::new(),
        };
    };
    let actual = token_scopes(&claims);
    let missing: Vec<String> = required
        .iter()
        .filter(|r| !actual.iter().any(|a| a == *r))
        .map(|r| r.to_string())
        .collect();
    ScopeCheck {
        has_all: missing.is_empty(),
        missing,
        actual,
    }
}
