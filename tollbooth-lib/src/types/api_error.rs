//! Errors reported by the API itself.
//!
//! A 4xx response carries a JSON payload with a numeric code, a top-level
//! message and an optional tree of field errors. The tree is loosely shaped,
//! so it is modeled as [`ErrorNode`] and flattened into one line per leaf.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::time::Duration;

use http::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::Method;

/// Message used when neither a top-level message nor field errors exist.
const UNKNOWN_ERROR: &str = "Unknown Error";

/// Raw error payload of a 4xx response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorPayload {
    /// API specific error code, distinct from the HTTP status
    #[serde(default)]
    pub code: u64,
    /// Human readable summary
    #[serde(default)]
    pub message: Option<String>,
    /// Nested field errors
    #[serde(default)]
    pub errors: Option<ErrorNode>,
}

/// One node of the field error tree.
///
/// Variants are tried in declaration order, so a group (an object with an
/// `_errors` array) wins over a field error, which wins over a plain object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorNode {
    /// A wrapper holding the actual errors of the enclosing key
    Group {
        /// Errors reported for the key this group is stored under
        #[serde(rename = "_errors")]
        errors: Vec<ErrorNode>,
    },
    /// A leaf describing what is wrong with one field
    Field {
        /// Machine readable code, e.g. `STRING_LENGTH`
        #[serde(default)]
        code: Option<serde_json::Value>,
        /// Human readable description
        message: String,
    },
    /// A bare message
    Message(String),
    /// Errors keyed by field name or array index
    Object(BTreeMap<String, ErrorNode>),
    /// Anything else; carries no message and is skipped
    Other(serde_json::Value),
}

impl ErrorNode {
    /// Flatten the tree into `path: CODE: message` lines.
    #[must_use]
    pub fn flatten(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.walk("", &mut lines);
        lines
    }

    fn walk(&self, key: &str, lines: &mut Vec<String>) {
        match self {
            Self::Field { code, message } => {
                let mut line = String::new();
                if !key.is_empty() {
                    line.push_str(key);
                    line.push_str(": ");
                }
                if let Some(code) = code.as_ref().and_then(render_code) {
                    line.push_str(&code);
                    line.push_str(": ");
                }
                line.push_str(message);
                lines.push(line.trim().to_string());
            }
            Self::Message(message) => lines.push(message.clone()),
            Self::Group { errors } => {
                for error in errors {
                    error.walk(key, lines);
                }
            }
            Self::Object(children) => {
                for (child_key, child) in children {
                    child.walk(&nested_key(key, child_key), lines);
                }
            }
            Self::Other(_) => {}
        }
    }
}

/// Build the path of a child: `a.b` for names, `a[0]` for indices.
/// Keys starting with `_` are structural and do not extend the path.
fn nested_key(parent: &str, key: &str) -> String {
    if key.starts_with('_') {
        parent.to_string()
    } else if parent.is_empty() {
        key.to_string()
    } else if key.parse::<u64>().is_ok() {
        format!("{parent}[{key}]")
    } else {
        format!("{parent}.{key}")
    }
}

fn render_code(code: &serde_json::Value) -> Option<String> {
    match code {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A well-formed error response from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// API specific error code
    pub code: u64,
    /// HTTP status of the response
    pub status: StatusCode,
    /// Method of the failed request
    pub method: Method,
    /// Full URL of the failed request
    pub url: Url,
    /// Top-level message reported by the server
    pub message: Option<String>,
    /// Flattened field errors, one `path: CODE: message` entry each
    pub errors: Vec<String>,
}

impl ApiError {
    /// Build an error from a decoded payload and the request it answered.
    #[must_use]
    pub fn new(payload: ApiErrorPayload, status: StatusCode, method: Method, url: Url) -> Self {
        let errors = payload
            .errors
            .as_ref()
            .map(ErrorNode::flatten)
            .unwrap_or_default();

        Self {
            code: payload.code,
            status,
            method,
            url,
            message: payload.message.filter(|m| !m.is_empty()),
            errors,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flattened = self.errors.join("\n");
        match (&self.message, flattened.is_empty()) {
            (Some(message), false) => write!(f, "{message}\n{flattened}"),
            (Some(message), true) => f.write_str(message),
            (None, false) => f.write_str(&flattened),
            (None, true) => f.write_str(UNKNOWN_ERROR),
        }
    }
}

impl std::error::Error for ApiError {}

/// A failure at the HTTP layer: persistent server errors, exhausted
/// timeouts, and client errors whose body is not a valid error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// Status of the last response; `None` when no response arrived in time
    pub status: Option<StatusCode>,
    /// Method of the failed request
    pub method: Method,
    /// Route (endpoint) of the failed request
    pub route: String,
    /// Description, the reason phrase of `status` unless a better one exists
    pub message: String,
}

impl HttpError {
    /// Error for a response status, described by its canonical reason phrase.
    #[must_use]
    pub fn from_status(status: StatusCode, method: Method, route: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            method,
            route: route.into(),
            message: status
                .canonical_reason()
                .unwrap_or(UNKNOWN_ERROR)
                .to_string(),
        }
    }

    /// Error for a request that never produced a response in time.
    #[must_use]
    pub fn timeout(after: Duration, method: Method, route: impl Into<String>) -> Self {
        Self {
            status: None,
            method,
            route: route.into(),
            message: format!("Request timed out after {}ms", after.as_millis()),
        }
    }

    /// Replace the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} ({} {} {})",
                self.message,
                status.as_u16(),
                self.method,
                self.route
            ),
            None => write!(f, "{} ({} {})", self.message, self.method, self.route),
        }
    }
}

impl std::error::Error for HttpError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn api_error(body: &str) -> ApiError {
        let payload: ApiErrorPayload = serde_json::from_str(body).unwrap();
        ApiError::new(
            payload,
            StatusCode::BAD_REQUEST,
            Method::Post,
            Url::parse("https://discord.com/api/v9/users/@me").unwrap(),
        )
    }

    #[test]
    fn test_flatten_invalid_form_body() {
        let err = api_error(
            r#"{"code": 50035, "message": "Invalid Form Body", "errors": {"username": {"_errors": [{"code": "STRING_LENGTH", "message": "too short"}]}}}"#,
        );

        assert_eq!(err.code, 50035);
        assert_eq!(err.errors, vec!["username: STRING_LENGTH: too short"]);
        assert_eq!(
            err.to_string(),
            "Invalid Form Body\nusername: STRING_LENGTH: too short"
        );
    }

    #[test]
    fn test_flatten_nested_paths() {
        let err = api_error(
            r#"{
                "code": 50035,
                "message": "Invalid Form Body",
                "errors": {
                    "embeds": {
                        "0": {
                            "title": {"_errors": [{"code": "BASE_TYPE_REQUIRED", "message": "required"}]},
                            "fields": {"1": {"name": {"_errors": [
                                {"code": "A", "message": "first"},
                                {"code": "B", "message": "second"}
                            ]}}}
                        }
                    }
                }
            }"#,
        );

        assert_eq!(
            err.errors,
            vec![
                "embeds[0].fields[1].name: A: first",
                "embeds[0].fields[1].name: B: second",
                "embeds[0].title: BASE_TYPE_REQUIRED: required",
            ]
        );
    }

    #[test]
    fn test_bare_messages_and_groups() {
        let node: ErrorNode = serde_json::from_str(r#"{"note": "plain", "count": 3}"#).unwrap();
        assert_eq!(node.flatten(), vec!["plain"]);

        let group: ErrorNode =
            serde_json::from_str(r#"{"_errors": [{"code": "X", "message": "top"}]}"#).unwrap();
        assert_eq!(group.flatten(), vec!["X: top"]);

        let numeric: ErrorNode =
            serde_json::from_str(r#"{"id": {"code": 50001, "message": "no access"}}"#).unwrap();
        assert_eq!(numeric.flatten(), vec!["id: 50001: no access"]);
    }

    #[test]
    fn test_message_only() {
        let err = api_error(r#"{"code": 10003, "message": "Unknown Channel"}"#);
        assert!(err.errors.is_empty());
        assert_eq!(err.to_string(), "Unknown Channel");
    }

    #[test]
    fn test_unknown_error() {
        let err = api_error("{}");
        assert_eq!(err.code, 0);
        assert_eq!(err.to_string(), "Unknown Error");
    }

    #[test]
    fn test_http_error_reason_phrase() {
        let err = HttpError::from_status(
            StatusCode::SERVICE_UNAVAILABLE,
            Method::Get,
            "/gateway/bot",
        );
        assert_eq!(err.message, "Service Unavailable");
        assert_eq!(
            err.to_string(),
            "Service Unavailable (503 GET /gateway/bot)"
        );
    }

    #[test]
    fn test_http_error_timeout() {
        let err = HttpError::timeout(Duration::from_millis(250), Method::Delete, "/channels/1");
        assert_eq!(err.status, None);
        assert_eq!(
            err.to_string(),
            "Request timed out after 250ms (DELETE /channels/1)"
        );
    }
}
