//! Session owner sitting between the UI and the identity provider.

use tokio::sync::watch;

use super::{
    validate_credentials, validate_email, AuthProvider, AuthResult, AuthSession, AuthUser,
    EmailLink, LinkSignInAttempt, SessionPersistence,
};

/// Wraps an [`AuthProvider`], persists the active session, and publishes
/// current-session changes to subscribers.
///
/// Failures are returned to the caller as-is; the gateway never retries.
pub struct AuthGateway<P: AuthProvider, S: SessionPersistence> {
    provider: P,
    store: S,
    redirect_url: String,
    current: watch::Sender<Option<AuthSession>>,
}

impl<P: AuthProvider, S: SessionPersistence> AuthGateway<P, S> {
    pub fn new(provider: P, store: S, redirect_url: impl Into<String>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            provider,
            store,
            redirect_url: redirect_url.into(),
            current,
        }
    }

    /// Receive every change of the current session (`None` when signed out).
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.current.subscribe()
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.current.borrow().clone()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.current.borrow().as_ref().map(|session| session.user.clone())
    }

    /// Load the persisted session, refreshing it if it has expired.
    ///
    /// A revoked session is cleared. Other refresh failures are returned and
    /// the persisted session is kept for the next attempt.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthUser>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            tracing::info!("Restored session for {}", stored_session.user.id);
            return self.establish(stored_session).map(Some);
        }

        match self.provider.refresh_session(&stored_session).await {
            Ok(refreshed) => self.establish(refreshed).map(Some),
            Err(error) if error.ends_session() => {
                tracing::warn!("Persisted session was revoked: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                Err(error)
            }
        }
    }

    /// Refresh the current session if its token is about to expire.
    pub async fn ensure_fresh_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(session) = self.session() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        tracing::debug!("Refreshing expired session for {}", session.user.id);
        let refreshed = self.provider.refresh_session(&session).await?;
        self.establish(refreshed.clone())?;
        Ok(Some(refreshed))
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        validate_credentials(email, password)?;
        let session = self
            .provider
            .sign_in_with_password(email.trim(), password)
            .await?;
        self.establish(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        validate_credentials(email, password)?;
        let session = self.provider.sign_up(email.trim(), password).await?;
        self.establish(session)
    }

    /// Email a sign-in link and return the attempt needed to complete it.
    pub async fn send_passwordless_link(&self, email: &str) -> AuthResult<LinkSignInAttempt> {
        validate_email(email)?;
        let attempt = LinkSignInAttempt::new(email, &self.redirect_url)?;
        self.provider
            .send_sign_in_link(attempt.email(), attempt.continue_url())
            .await?;
        tracing::info!("Sent sign-in link for attempt {:?}", attempt.id());
        Ok(attempt)
    }

    pub async fn complete_passwordless_sign_in(
        &self,
        link_url: &str,
        attempt: &LinkSignInAttempt,
    ) -> AuthResult<AuthUser> {
        let link = EmailLink::parse(link_url)?;
        attempt.verify(&link)?;
        let session = self
            .provider
            .sign_in_with_email_link(attempt.email(), &link.oob_code)
            .await?;
        self.establish(session)
    }

    /// Drop the local session. Subscribers see `None` even if clearing the
    /// persisted copy fails; that failure is still returned.
    pub fn sign_out(&self) -> AuthResult<()> {
        let previous = self.current.send_replace(None);
        if let Some(session) = previous {
            tracing::info!("Signed out {}", session.user.id);
        }
        self.store.clear_session()
    }

    fn establish(&self, session: AuthSession) -> AuthResult<AuthUser> {
        self.store.save_session(&session)?;
        let user = session.user.clone();
        self.current.send_replace(Some(session));
        Ok(user)
    }
}
