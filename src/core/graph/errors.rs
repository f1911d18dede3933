use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

const MAILBOX_HINT: &str = "This account may be a guest account without a mailbox. Guest accounts often cannot send emails via Graph API.";
const GUEST_HINT: &str = "Guest/external accounts may have limited Graph API access even with correct permissions. Try using a native Azure AD account, or contact your tenant administrator to enable guest account API access.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnauthorizedReason {
    InvalidToken,
    InsufficientClaims,
    MailboxNotEnabled,
    GuestRestricted,
    Upstream(String),
}

impl UnauthorizedReason {
    fn summary(&self) -> &str {
        match self {
            UnauthorizedReason::InvalidToken => "Invalid token. Please login again",
            UnauthorizedReason::InsufficientClaims => {
                "Token missing required claims. Please login again"
            }
            UnauthorizedReason::MailboxNotEnabled => "Mailbox not enabled for REST API",
            UnauthorizedReason::GuestRestricted => {
                "Authentication failed - possible guest account restriction"
            }
            UnauthorizedReason::Upstream(message) => message.trim_end_matches('.'),
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            UnauthorizedReason::MailboxNotEnabled => Some(MAILBOX_HINT),
            UnauthorizedReason::GuestRestricted => Some(GUEST_HINT),
            _ => None,
        }
    }
}

fn unauthorized_message(reason: &UnauthorizedReason, scope: &str) -> String {
    match reason.hint() {
        Some(hint) => format!(
            "Authentication failed (401): {}. {} Token has correct scopes but may be restricted.",
            reason.summary(),
            hint
        ),
        None => format!(
            "Authentication failed (401): {}. Token may be expired or missing required permissions ({}). Please login again.",
            reason.summary(),
            scope
        ),
    }
}

fn scope_list(scopes: &[String]) -> String {
    if scopes.is_empty() {
        "none".to_string()
    } else {
        scopes.join(", ")
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Access token is empty or invalid")]
    EmptyToken,

    #[error(
        "Missing required permissions: {}. Token has scopes: {}. Please log out and log back in to grant the required permissions.",
        .missing.join(", "),
        scope_list(.present)
    )]
    MissingScopes {
        missing: Vec<String>,
        present: Vec<String>,
    },

    #[error("{}", unauthorized_message(.reason, .scope))]
    Unauthorized {
        reason: UnauthorizedReason,
        scope: String,
    },

    #[error(
        "Permission denied (403): {message}. Make sure {scope} permission is granted and admin consent is provided."
    )]
    Forbidden { message: String, scope: String },

    #[error("Failed to {operation}: {message}")]
    Request { operation: String, message: String },

    #[error("Failed to {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
}

impl GraphError {
    /// True when signing in again is the likely fix.
    pub fn needs_reauthentication(&self) -> bool {
        matches!(
            self,
            GraphError::EmptyToken
                | GraphError::MissingScopes { .. }
                | GraphError::Unauthorized { .. }
        )
    }
}

/// `error.message` from a Graph error body, or a top-level `message`.
fn upstream_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

fn body_is_empty(raw: &str, body: &Value) -> bool {
    raw.trim().is_empty() || body.as_object().is_some_and(|o| o.is_empty())
}

/// Map a failed Graph response to a typed error.
pub fn classify(
    status: StatusCode,
    www_authenticate: Option<&str>,
    raw_body: &str,
    operation: &str,
    scope: &str,
) -> GraphError {
    let body: Value = serde_json::from_str(raw_body).unwrap_or(Value::Null);
    let www_authenticate = www_authenticate.unwrap_or("").trim();

    match status {
        StatusCode::UNAUTHORIZED => {
            let reason = if www_authenticate.contains("invalid_token") {
                UnauthorizedReason::InvalidToken
            } else if www_authenticate.contains("insufficient_claims") {
                UnauthorizedReason::InsufficientClaims
            } else if body.pointer("/error/code").and_then(Value::as_str)
                == Some("MailboxNotEnabledForRESTAPI")
            {
                UnauthorizedReason::MailboxNotEnabled
            } else if www_authenticate.is_empty() && body_is_empty(raw_body, &body) {
                UnauthorizedReason::GuestRestricted
            } else {
                UnauthorizedReason::Upstream(
                    upstream_message(&body).unwrap_or_else(|| "Unauthorized".to_string()),
                )
            };
            GraphError::Unauthorized {
                reason,
                scope: scope.to_string(),
            }
        }
        StatusCode::FORBIDDEN => GraphError::Forbidden {
            message: upstream_message(&body)
                .unwrap_or_else(|| "Forbidden".to_string())
                .trim_end_matches('.')
                .to_string(),
            scope: scope.to_string(),
        },
        _ => GraphError::Request {
            operation: operation.to_string(),
            message: upstream_message(&body).unwrap_or_else(|| {
                let raw = raw_body.trim();
                if raw.is_empty() {
                    format!("Request failed with status code {}", status.as_u16())
                } else {
                    raw.to_string()
                }
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unauthorized(www: Option<&str>, body: &str) -> GraphError {
        classify(StatusCode::UNAUTHORIZED, www, body, "send email", "Mail.Send")
    }

    #[test]
    fn invalid_token_header_is_recognised() {
        let err = unauthorized(Some(r#"Bearer error="invalid_token""#), "{}");
        assert_eq!(
            err.to_string(),
            "Authentication failed (401): Invalid token. Please login again. Token may be expired or missing required permissions (Mail.Send). Please login again."
        );
    }

    #[test]
    fn insufficient_claims_header_is_recognised() {
        let err = unauthorized(Some(r#"Bearer error="insufficient_claims""#), "");
        assert!(matches!(
            err,
            GraphError::Unauthorized {
                reason: UnauthorizedReason::InsufficientClaims,
                ..
            }
        ));
    }

    #[test]
    fn mailbox_not_enabled_carries_guest_hint() {
        let err = unauthorized(
            None,
            r#"{"error":{"code":"MailboxNotEnabledForRESTAPI","message":"REST API is not yet supported for this mailbox."}}"#,
        );
        let text = err.to_string();
        assert!(text.starts_with("Authentication failed (401): Mailbox not enabled for REST API."));
        assert!(text.contains("guest account without a mailbox"));
        assert!(text.ends_with("Token has correct scopes but may be restricted."));
    }

    #[test]
    fn empty_401_suggests_guest_restriction() {
        let err = unauthorized(None, "");
        assert!(matches!(
            err,
            GraphError::Unauthorized {
                reason: UnauthorizedReason::GuestRestricted,
                ..
            }
        ));
        assert!(err.to_string().contains("possible guest account restriction"));
    }

    #[test]
    fn other_401_uses_upstream_message() {
        let err = unauthorized(
            Some("Bearer realm=\"\""),
            r#"{"error":{"code":"InvalidAuthenticationToken","message":"Lifetime validation failed."}}"#,
        );
        assert!(
            err.to_string()
                .starts_with("Authentication failed (401): Lifetime validation failed. Token may be expired")
        );
        assert!(err.needs_reauthentication());
    }

    #[test]
    fn forbidden_names_the_scope() {
        let err = classify(
            StatusCode::FORBIDDEN,
            None,
            r#"{"error":{"message":"Access is denied."}}"#,
            "create calendar event",
            "Calendars.ReadWrite",
        );
        assert_eq!(
            err.to_string(),
            "Permission denied (403): Access is denied. Make sure Calendars.ReadWrite permission is granted and admin consent is provided."
        );
    }

    #[test]
    fn other_statuses_report_the_operation() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            None,
            r#"{"error":{"message":"Invalid recipient"}}"#,
            "send email",
            "Mail.Send",
        );
        assert_eq!(err.to_string(), "Failed to send email: Invalid recipient");
        assert!(!err.needs_reauthentication());

        let bare = classify(
            StatusCode::BAD_GATEWAY,
            None,
            "",
            "post Teams message",
            "ChannelMessage.Send",
        );
        assert_eq!(
            bare.to_string(),
            "Failed to post Teams message: Request failed with status code 502"
        );
    }

    #[test]
    fn missing_scopes_message_lists_present_scopes_or_none() {
        let err = GraphError::MissingScopes {
            missing: vec!["Mail.Send".into()],
            present: vec![],
        };
        assert_eq!(
            err.to_string(),
            "Missing required permissions: Mail.Send. Token has scopes: none. Please log out and log back in to grant the required permissions."
        );

        let err = GraphError::MissingScopes {
            missing: vec!["Mail.Send".into()],
            present: vec!["User.Read".into(), "openid".into()],
        };
        assert!(err.to_string().contains("Token has scopes: User.Read, openid."));
    }
}
