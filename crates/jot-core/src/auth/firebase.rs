//! Firebase Identity Toolkit / Secure Token REST client.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

use super::{AuthError, AuthProvider, AuthResult, AuthSession, AuthUser};
use crate::util::{compact_text, unix_timestamp_now};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Base URLs of the identity and token services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub identity_url: String,
    pub token_url: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            identity_url: IDENTITY_TOOLKIT_URL.to_string(),
            token_url: SECURE_TOKEN_URL.to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Endpoints served by a local auth emulator at `host` (`host:port`).
    #[must_use]
    pub fn emulator(host: &str) -> Self {
        let host = host.trim().trim_end_matches('/');
        Self {
            identity_url: format!("http://{host}/identitytoolkit.googleapis.com/v1"),
            token_url: format!("http://{host}/securetoken.googleapis.com/v1"),
        }
    }
}

#[derive(Clone)]
pub struct FirebaseAuthClient {
    api_key: String,
    endpoints: AuthEndpoints,
    client: Client,
}

impl FirebaseAuthClient {
    pub fn new(api_key: impl Into<String>, endpoints: AuthEndpoints) -> AuthResult<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Firebase API key must not be empty",
            ));
        }

        Ok(Self {
            api_key,
            endpoints,
            client: Client::builder().build()?,
        })
    }

    fn identity_request(&self, method: &str, payload: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(format!("{}/accounts:{method}", self.endpoints.identity_url))
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> AuthResult<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, &body));
        }
        Ok(response.json::<T>().await?)
    }

    async fn session_request(&self, method: &str, payload: serde_json::Value) -> AuthResult<AuthSession> {
        let response: IdentityResponse = Self::send(self.identity_request(method, &payload)).await?;
        response.into_session()
    }
}

impl AuthProvider for FirebaseAuthClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        self.session_request("signInWithPassword", payload).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        self.session_request("signUp", payload).await
    }

    async fn send_sign_in_link(&self, email: &str, continue_url: &str) -> AuthResult<()> {
        let payload = serde_json::json!({
            "requestType": "EMAIL_SIGNIN",
            "email": email,
            "continueUrl": continue_url,
            "canHandleCodeInApp": true,
        });
        let _: serde_json::Value = Self::send(self.identity_request("sendOobCode", &payload)).await?;
        Ok(())
    }

    async fn sign_in_with_email_link(&self, email: &str, oob_code: &str) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({
            "email": email,
            "oobCode": oob_code,
            "returnSecureToken": true,
        });
        self.session_request("signInWithEmailLink", payload).await
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        if session.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let request = self
            .client
            .post(format!("{}/token", self.endpoints.token_url))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ]);
        let response: RefreshResponse = Self::send(request).await?;
        let expires_at = parse_expires_in(&response.expires_in)?;

        Ok(AuthSession {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at,
            user: AuthUser {
                id: response.user_id,
                email: session.user.email.clone(),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    local_id: Option<String>,
    email: Option<String>,
}

impl IdentityResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        match (self.id_token, self.refresh_token, self.expires_in, self.local_id) {
            (Some(id_token), Some(refresh_token), Some(expires_in), Some(local_id)) => {
                Ok(AuthSession {
                    id_token,
                    refresh_token,
                    expires_at: parse_expires_in(&expires_in)?,
                    user: AuthUser {
                        id: local_id,
                        email: self.email,
                    },
                })
            }
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

fn parse_expires_in(raw: &str) -> AuthResult<i64> {
    let seconds = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| AuthError::Api(format!("Invalid expiresIn value '{raw}'")))?;
    Ok(unix_timestamp_now().saturating_add(seconds))
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorResponse {
    error: Option<FirebaseErrorBody>,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorBody {
    message: Option<String>,
}

/// Map an Identity Toolkit error body onto the gateway's error reasons.
///
/// Messages look like `INVALID_PASSWORD` or `WEAK_PASSWORD : Password should be at least 6 characters`.
fn classify_api_error(status: StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<FirebaseErrorResponse>(body)
        .ok()
        .and_then(|payload| payload.error)
        .and_then(|error| error.message);

    let Some(message) = message else {
        let trimmed = compact_text(body);
        return if trimmed.is_empty() {
            AuthError::Api(format!("HTTP {}", status.as_u16()))
        } else {
            AuthError::Api(format!("{} ({})", trimmed, status.as_u16()))
        };
    };

    let code = message
        .split([' ', ':'])
        .next()
        .unwrap_or_default()
        .to_string();
    match code.as_str() {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED"
        | "INVALID_EMAIL" => AuthError::InvalidCredentials(code),
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "EXPIRED_OOB_CODE" => AuthError::ExpiredLink,
        "INVALID_OOB_CODE" => AuthError::InvalidLink(code),
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" | "INVALID_ID_TOKEN" => {
            AuthError::SessionExpired(code)
        }
        _ => AuthError::Api(format!("{} ({})", message.trim(), status.as_u16())),
    }
}
