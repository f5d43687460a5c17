//! Test doubles shared by unit tests across modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::auth::{AuthError, AuthProvider, AuthResult, AuthSession, AuthUser};
use crate::util::unix_timestamp_now;

#[derive(Debug, Default)]
struct FakeAuthInner {
    accounts: HashMap<String, String>,
    codes: HashMap<String, String>,
    last_link: Option<String>,
    issued: u64,
    offline: bool,
    revoked: bool,
    expiring: bool,
}

/// In-memory identity provider with password accounts and email links.
#[derive(Debug, Clone, Default)]
pub struct FakeAuthProvider {
    inner: Arc<Mutex<FakeAuthInner>>,
}

impl FakeAuthProvider {
    pub fn with_account(email: &str, password: &str) -> Self {
        let provider = Self::default();
        provider
            .lock()
            .accounts
            .insert(email.to_string(), password.to_string());
        provider
    }

    pub fn session_for(user_id: &str, email: &str) -> AuthSession {
        AuthSession {
            id_token: format!("id-{user_id}"),
            refresh_token: format!("refresh-{user_id}"),
            expires_at: unix_timestamp_now() + 3600,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(email.to_string()),
            },
        }
    }

    pub fn user_id(email: &str) -> String {
        format!("uid-{}", email.split('@').next().unwrap_or_default())
    }

    /// Make refreshes fail as if the provider could not be reached.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make refreshes fail as if the refresh token had been revoked.
    pub fn set_revoked(&self, revoked: bool) {
        self.lock().revoked = revoked;
    }

    /// Issue sessions that are already due for a refresh.
    pub fn set_expiring(&self, expiring: bool) {
        self.lock().expiring = expiring;
    }

    fn issue(&self, user_id: &str, email: &str) -> AuthSession {
        let mut session = Self::session_for(user_id, email);
        if self.lock().expiring {
            session.expires_at = 0;
        }
        session
    }

    pub fn last_link(&self) -> Option<String> {
        self.lock().last_link.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeAuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthProvider for FakeAuthProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let matches = self
            .lock()
            .accounts
            .get(email)
            .map(|stored| stored == password);
        match matches {
            Some(true) => Ok(self.issue(&Self::user_id(email), email)),
            Some(false) => Err(AuthError::InvalidCredentials("INVALID_PASSWORD".to_string())),
            None => Err(AuthError::InvalidCredentials("EMAIL_NOT_FOUND".to_string())),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        {
            let mut inner = self.lock();
            if inner.accounts.contains_key(email) {
                return Err(AuthError::EmailInUse);
            }
            inner
                .accounts
                .insert(email.to_string(), password.to_string());
        }
        Ok(self.issue(&Self::user_id(email), email))
    }

    async fn send_sign_in_link(&self, email: &str, continue_url: &str) -> AuthResult<()> {
        let mut inner = self.lock();
        inner.issued += 1;
        let code = format!("code-{}", inner.issued);
        inner.codes.insert(code.clone(), email.to_string());

        let mut link = Url::parse("https://fake.firebaseapp.com/__/auth/action")
            .map_err(|error| AuthError::Api(error.to_string()))?;
        link.query_pairs_mut()
            .append_pair("mode", "signIn")
            .append_pair("oobCode", &code)
            .append_pair("continueUrl", continue_url);
        inner.last_link = Some(link.into());
        Ok(())
    }

    async fn sign_in_with_email_link(&self, email: &str, oob_code: &str) -> AuthResult<AuthSession> {
        let owner = self.lock().codes.remove(oob_code);
        match owner {
            Some(owner) if owner == email => Ok(self.issue(&Self::user_id(email), email)),
            Some(_) => Err(AuthError::InvalidLink("INVALID_OOB_CODE".to_string())),
            None => Err(AuthError::ExpiredLink),
        }
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        let (offline, revoked) = {
            let inner = self.lock();
            (inner.offline, inner.revoked)
        };
        if offline {
            return Err(AuthError::Api("network unreachable".to_string()));
        }
        if revoked || session.refresh_token == "revoked" {
            return Err(AuthError::SessionExpired("TOKEN_EXPIRED".to_string()));
        }
        let mut refreshed = self.issue(
            &session.user.id,
            session.user.email.as_deref().unwrap_or_default(),
        );
        refreshed.id_token = format!("{}-refreshed", refreshed.id_token);
        Ok(refreshed)
    }
}
