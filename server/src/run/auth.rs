//! Caller authorization for run control
//!
//! Starting and cancelling runs is reserved to admins; watching a run needs
//! any valid token. Tokens are held only as SHA256 digests.

use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Admin privileges required (role: {0})")]
    Forbidden(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Viewer
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub role: Role,
}

impl Principal {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        match self.role {
            Role::Admin => Ok(()),
            other => Err(AuthError::Forbidden(other.as_str().to_string())),
        }
    }
}

/// Token verification seam
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Fixed set of tokens loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthorizer {
    tokens: HashMap<String, Role>,
}

impl StaticTokenAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, role: Role) -> Self {
        self.tokens.insert(hash_token(token), role);
        self
    }

    /// Parse `token:role` pairs separated by commas; a bare token is a viewer
    pub fn parse(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .fold(Self::new(), |auth, entry| match entry.rsplit_once(':') {
                Some((token, role)) if !token.is_empty() => {
                    auth.with_token(token, Role::parse(role))
                }
                _ => auth.with_token(entry, Role::Viewer),
            })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn authorize(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(&hash_token(token))
            .map(|&role| Principal { role })
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extract the token of an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticate an optional token
pub async fn authenticate(
    authorizer: &dyn Authorizer,
    token: Option<&str>,
) -> Result<Principal, AuthError> {
    let token = token.ok_or(AuthError::MissingToken)?;
    authorizer.authorize(token).await
}

fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn authorizer() -> StaticTokenAuthorizer {
        StaticTokenAuthorizer::parse("root-token:admin, watch-token:viewer,bare")
    }

    #[tokio::test]
    async fn test_admin_and_viewer_tokens() {
        let auth = authorizer();
        assert_eq!(auth.len(), 3);

        let admin = auth.authorize("root-token").await.unwrap();
        assert!(admin.require_admin().is_ok());

        let viewer = auth.authorize("watch-token").await.unwrap();
        assert!(matches!(
            viewer.require_admin(),
            Err(AuthError::Forbidden(_))
        ));

        let bare = auth.authorize("bare").await.unwrap();
        assert_eq!(bare.role, Role::Viewer);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_tokens() {
        let auth = authorizer();
        assert!(matches!(
            auth.authorize("nope").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            authenticate(&auth, None).await,
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_tokens_are_not_stored_in_clear() {
        let auth = authorizer();
        assert!(!auth.tokens.contains_key("root-token"));
        assert!(auth.tokens.keys().all(|k| k.len() == 64));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
