//! Auth Token Providers
//!
//! The realtime server authenticates the socket with a previously issued
//! token passed as the `token` query parameter of the connection URI. The
//! token is read from storage on every connection attempt, so a token
//! refreshed by the host application is picked up on the next reconnect.
//!
//! # Providers
//!
//! - [`StaticTokenProvider`]: fixed token, useful for tests and tooling
//! - [`EnvTokenProvider`]: reads an environment variable at each attempt
//! - [`FileTokenProvider`]: reads a token file written by the host app

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::application::ports::{TokenError, TokenProvider};

/// Environment variable read by [`EnvTokenProvider::default`].
pub const AUTH_TOKEN_ENV: &str = "REALTIME_AUTH_TOKEN";

/// Environment variable naming a token file for the binary.
pub const AUTH_TOKEN_FILE_ENV: &str = "REALTIME_AUTH_TOKEN_FILE";

// =============================================================================
// Auth Token
// =============================================================================

/// Bearer token for the realtime socket.
///
/// The `Debug` implementation redacts the value for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token, rejecting blank values.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == token.len() {
            Some(Self(token))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthToken").field(&"[REDACTED]").finish()
    }
}

/// Append the token as a percent-encoded `token` query parameter.
#[must_use]
pub fn connection_url(base_url: &str, token: &AuthToken) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{base_url}{separator}token={}",
        urlencoding::encode(token.expose())
    )
}

// =============================================================================
// Providers
// =============================================================================

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<AuthToken>,
}

impl StaticTokenProvider {
    /// Provider holding `token`. A blank token behaves as signed out.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AuthToken::new(token),
        }
    }

    /// Provider for a signed-out user.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<Option<String>, TokenError> {
        Ok(self.token.as_ref().map(|t| t.expose().to_string()))
    }
}

/// Reads the token from an environment variable on each call.
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    /// Provider reading `var`.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new(AUTH_TOKEN_ENV)
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self) -> Result<Option<String>, TokenError> {
        Ok(std::env::var(&self.var)
            .ok()
            .and_then(AuthToken::new)
            .map(|t| t.expose().to_string()))
    }
}

/// Reads the token from a file on each call.
///
/// A missing or blank file means signed out.
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    /// Provider reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Token file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn token(&self) -> Result<Option<String>, TokenError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(AuthToken::new(contents).map(|t| t.expose().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
