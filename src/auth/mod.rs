// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::observability::metrics;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use std::collections::HashMap;
use thiserror::Error;

pub mod file_sessions;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_HEADER: &str = "x-session-token";
/// Session key holding the authenticated principal.
pub const PRINCIPAL_KEY: &str = "user_email";

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing session")]
    MissingSession,
    #[error("invalid session")]
    InvalidSession,
    #[error("internal auth error: {0}")]
    Internal(String),
}

/// Key/value bag attached to a session token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    values: HashMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn principal(&self) -> Option<&str> {
        self.get(PRINCIPAL_KEY).filter(|p| !p.is_empty())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn load(&self, token: &str) -> Result<Option<Session>, AuthError>;

    /// Resolve the request's session to an authenticated principal.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = session_token(headers).ok_or(AuthError::MissingSession)?;
        let session = match self.load(&token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                metrics::increment_session_lookup("miss");
                return Err(AuthError::InvalidSession);
            }
            Err(e) => {
                metrics::increment_session_lookup("error");
                return Err(e);
            }
        };
        metrics::increment_session_lookup("hit");
        let principal = session.principal().ok_or(AuthError::InvalidSession)?;
        Ok(AuthContext {
            principal: principal.to_string(),
        })
    }
}

/// Helper: read the session token from `x-session-token` or the `session` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, "tok123".parse().unwrap());
        assert_eq!(session_token(&headers), Some("tok123".to_string()));
    }

    #[test]
    fn test_session_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; session=abc; x=1".parse().unwrap());
        assert_eq!(session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn test_session_token_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(header::COOKIE, "session=".parse().unwrap());
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn test_principal_must_be_non_empty() {
        let session = Session::new().with_value(PRINCIPAL_KEY, "");
        assert_eq!(session.principal(), None);

        let session = Session::new().with_value(PRINCIPAL_KEY, "a@example.com");
        assert_eq!(session.principal(), Some("a@example.com"));
    }
}
