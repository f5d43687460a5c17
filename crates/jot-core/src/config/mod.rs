//! Client configuration for the Firebase project backing the note client.
//!
//! Values are public, ship-with-the-app identifiers (API key, project id,
//! redirect URL). Secret credentials must never be stored here.

use thiserror::Error;

use crate::auth::AuthEndpoints;
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REDIRECT_URL: &str = "http://localhost:3000";
const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Setting {0} must include http:// or https://")]
    InvalidUrl(&'static str),
}

/// Raw settings as read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub auth_redirect_url: Option<String>,
    pub auth_emulator_host: Option<String>,
    pub firestore_emulator_host: Option<String>,
}

impl ClientConfig {
    /// Read settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| normalize_text_option(lookup(key));
        Self {
            api_key: read("FIREBASE_API_KEY"),
            auth_domain: read("FIREBASE_AUTH_DOMAIN"),
            project_id: read("FIREBASE_PROJECT_ID"),
            storage_bucket: read("FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: read("FIREBASE_MESSAGING_SENDER_ID"),
            app_id: read("FIREBASE_APP_ID"),
            auth_redirect_url: read("AUTH_REDIRECT_URL"),
            auth_emulator_host: read("FIREBASE_AUTH_EMULATOR_HOST"),
            firestore_emulator_host: read("FIRESTORE_EMULATOR_HOST"),
        }
    }

    /// Validate settings and derive service endpoints.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(ConfigError::Missing("FIREBASE_API_KEY"))?;
        let project_id = self
            .project_id
            .clone()
            .ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))?;

        let redirect_url = self
            .auth_redirect_url
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string());
        if !is_http_url(&redirect_url) {
            return Err(ConfigError::InvalidUrl("AUTH_REDIRECT_URL"));
        }

        let auth_endpoints = self
            .auth_emulator_host
            .as_deref()
            .map_or_else(AuthEndpoints::default, AuthEndpoints::emulator);

        let firestore_base = self.firestore_emulator_host.as_deref().map_or_else(
            || FIRESTORE_URL.to_string(),
            |host| format!("http://{}/v1", host.trim_end_matches('/')),
        );
        let documents_url = format!(
            "{firestore_base}/projects/{}/databases/(default)/documents",
            urlencoding::encode(&project_id)
        );

        Ok(ResolvedConfig {
            api_key,
            project_id,
            redirect_url,
            auth_endpoints,
            documents_url,
        })
    }
}

/// Validated settings ready to build clients from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub api_key: String,
    pub project_id: String,
    pub redirect_url: String,
    pub auth_endpoints: AuthEndpoints,
    pub documents_url: String,
}
