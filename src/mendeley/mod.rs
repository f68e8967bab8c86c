use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub mod auth;
pub mod documents;

pub const USER_AGENT: &str = concat!("mendeley-bib/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("OAuth authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("could not fetch first page (HTTP {status}){}", detail(.message))]
    FirstPage { status: u16, message: Option<String> },
    #[error("could not fetch later page {url} (HTTP {status}){}", detail(.message))]
    LaterPage {
        url: String,
        status: u16,
        message: Option<String>,
    },
    #[error("invalid API url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] ureq::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("login returned HTTP {0}, expected a 302 redirect")]
    NotRedirected(u16),
    #[error("login redirect carries no Location header")]
    MissingLocation,
    #[error("malformed redirect location `{0}`")]
    BadLocation(String),
    #[error("authorization server answered `{error}`{}", detail(.description))]
    Denied {
        error: String,
        description: Option<String>,
    },
    #[error("state in redirect does not match the one sent")]
    StateMismatch,
    #[error("no access token in redirect")]
    MissingToken,
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// Body of a Mendeley API error response.
#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Pull the human readable `message` out of a JSON error body, if there is one.
fn api_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ApiError>(body)
        .ok()?
        .message
        .filter(|m| !m.trim().is_empty())
}

/// Bearer credential obtained from the implicit grant. Lives for the duration of the run.
pub struct Session {
    access_token: String,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(access_token: String, token_type: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Session {
            access_token,
            token_type,
            expires_at,
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Agent shared by every request of the run.
///
/// Status codes are checked by the callers, so they must not surface as transport errors.
pub fn agent() -> ureq::Agent {
    let cfg = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_reads_json_error_body() {
        let body = br#"{"message": "Document not found", "errorId": "abc"}"#;
        assert_eq!(api_message(body).as_deref(), Some("Document not found"));
    }

    #[test]
    fn api_message_ignores_other_bodies() {
        assert_eq!(api_message(b"<html>nope</html>"), None);
        assert_eq!(api_message(br#"{"message": "  "}"#), None);
        assert_eq!(api_message(b""), None);
    }

    #[test]
    fn errors_render_api_message() {
        let err = Error::FirstPage {
            status: 404,
            message: Some("Not found".into()),
        };
        assert_eq!(err.to_string(), "could not fetch first page (HTTP 404): Not found");

        let err = Error::LaterPage {
            url: "https://api.mendeley.com/documents?marker=x".into(),
            status: 500,
            message: None,
        };
        assert_eq!(
            err.to_string(),
            "could not fetch later page https://api.mendeley.com/documents?marker=x (HTTP 500)"
        );
    }

    #[test]
    fn session_debug_hides_token() {
        let session = Session::new("s3cr3t".into(), "bearer".into(), None);
        assert_eq!(session.authorization(), "Bearer s3cr3t");
        assert!(!format!("{session:?}").contains("s3cr3t"));
    }
}
