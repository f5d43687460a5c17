//! Passwordless email-link sign-in attempts.
//!
//! Each call to send a link produces its own [`LinkSignInAttempt`]. The attempt
//! id travels inside the link's continue URL, so completing a link against the
//! wrong attempt is detected instead of silently using whichever email was
//! cached last.

use url::Url;
use uuid::Uuid;

use super::{validate_email, AuthError, AuthResult};

const ATTEMPT_PARAM: &str = "jotAttempt";
const SIGN_IN_MODE: &str = "signIn";

/// One in-flight passwordless sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSignInAttempt {
    id: Option<Uuid>,
    email: String,
    continue_url: String,
}

impl LinkSignInAttempt {
    /// Start a new attempt whose link will redirect to `redirect_url`.
    pub fn new(email: &str, redirect_url: &str) -> AuthResult<Self> {
        validate_email(email)?;
        let id = Uuid::now_v7();
        let mut continue_url = Url::parse(redirect_url)
            .map_err(|_| AuthError::InvalidConfiguration("Auth redirect URL is not a valid URL"))?;
        continue_url
            .query_pairs_mut()
            .append_pair(ATTEMPT_PARAM, &id.to_string());

        Ok(Self {
            id: Some(id),
            email: email.trim().to_string(),
            continue_url: continue_url.into(),
        })
    }

    /// Attempt for a link opened without its originating attempt, e.g. on
    /// another device, where the user re-enters the email.
    pub fn for_email(email: &str) -> AuthResult<Self> {
        validate_email(email)?;
        Ok(Self {
            id: None,
            email: email.trim().to_string(),
            continue_url: String::new(),
        })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn continue_url(&self) -> &str {
        &self.continue_url
    }

    #[must_use]
    pub const fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Reject links that were issued for a different attempt. An attempt
    /// started here only accepts links carrying its own id; an email-only
    /// attempt accepts any link.
    pub fn verify(&self, link: &EmailLink) -> AuthResult<()> {
        match (self.id, link.attempt_id) {
            (None, _) => Ok(()),
            (Some(expected), Some(found)) if expected == found => Ok(()),
            (Some(_), _) => Err(AuthError::LinkMismatch),
        }
    }
}

/// The parts of an email sign-in link the provider needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailLink {
    pub oob_code: String,
    pub attempt_id: Option<Uuid>,
}

impl EmailLink {
    /// Parse a sign-in link, either the provider's action URL or the app URL
    /// it redirected to. Wrapped links carry the action URL in a `link` param.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|error| AuthError::InvalidLink(format!("not a URL: {error}")))?;
        Self::from_url(&url, 0)
    }

    fn from_url(url: &Url, depth: u8) -> AuthResult<Self> {
        let mut mode = None;
        let mut oob_code = None;
        let mut attempt_id = None;
        let mut nested = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "mode" => mode = Some(value.into_owned()),
                "oobCode" => oob_code = Some(value.into_owned()),
                ATTEMPT_PARAM => attempt_id = parse_attempt(&value),
                "continueUrl" => {
                    if attempt_id.is_none() {
                        attempt_id = Url::parse(&value).ok().and_then(|continue_url| {
                            continue_url
                                .query_pairs()
                                .find(|(key, _)| key == ATTEMPT_PARAM)
                                .and_then(|(_, value)| parse_attempt(&value))
                        });
                    }
                }
                "link" => nested = Url::parse(&value).ok(),
                _ => {}
            }
        }

        match (oob_code, nested) {
            (Some(oob_code), _) => {
                if mode.as_deref() != Some(SIGN_IN_MODE) {
                    return Err(AuthError::InvalidLink(
                        "link is not an email sign-in link".to_string(),
                    ));
                }
                Ok(Self {
                    oob_code,
                    attempt_id,
                })
            }
            (None, Some(inner)) if depth < 2 => {
                let mut parsed = Self::from_url(&inner, depth + 1)?;
                parsed.attempt_id = parsed.attempt_id.or(attempt_id);
                Ok(parsed)
            }
            _ => Err(AuthError::InvalidLink(
                "link does not contain a sign-in code".to_string(),
            )),
        }
    }
}

fn parse_attempt(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value).ok()
}
