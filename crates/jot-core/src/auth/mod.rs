//! Authentication: session types, provider seam, and the gateway clients use.

mod firebase;
mod gateway;
mod link;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::UserScope;
use crate::util::unix_timestamp_now;

pub use firebase::{AuthEndpoints, FirebaseAuthClient};
pub use gateway::AuthGateway;
pub use link::{EmailLink, LinkSignInAttempt};

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }

    /// Note store scope for this session's user.
    #[must_use]
    pub fn scope(&self) -> UserScope {
        UserScope::new(self.user.id.clone(), self.id_token.clone())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Firebase auth is not configured for this build.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("Invalid email or password ({0})")]
    InvalidCredentials(String),
    #[error("An account already exists for this email")]
    EmailInUse,
    #[error("The sign-in link has expired")]
    ExpiredLink,
    #[error("Invalid sign-in link: {0}")]
    InvalidLink(String),
    #[error("The sign-in link belongs to a different sign-in attempt")]
    LinkMismatch,
    #[error("Session expired, sign in again ({0})")]
    SessionExpired(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

impl AuthError {
    /// Whether the session this error came from can never be refreshed, as
    /// opposed to a failure worth retrying.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::InvalidConfiguration(_))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Identity provider operations the gateway builds on.
pub trait AuthProvider: Send + Sync + 'static {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = AuthResult<AuthSession>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = AuthResult<AuthSession>> + Send;

    /// Email a passwordless sign-in link that redirects to `continue_url`.
    fn send_sign_in_link(
        &self,
        email: &str,
        continue_url: &str,
    ) -> impl Future<Output = AuthResult<()>> + Send;

    fn sign_in_with_email_link(
        &self,
        email: &str,
        oob_code: &str,
    ) -> impl Future<Output = AuthResult<AuthSession>> + Send;

    fn refresh_session(
        &self,
        session: &AuthSession,
    ) -> impl Future<Output = AuthResult<AuthSession>> + Send;
}

pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Process-lifetime session storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    session: Arc<Mutex<Option<AuthSession>>>,
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

pub(crate) fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(AuthError::InvalidCredentials("INVALID_EMAIL".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    validate_email(email)?;
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}
