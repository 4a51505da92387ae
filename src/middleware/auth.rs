//! Credential issuance and the Identity Gate
//!
//! Credentials are HS256 JWTs carried in the `notes_jwt` cookie. The gate runs
//! a fixed sequence per request and stops at the first failure:
//! extract the cookie, verify the signature, check `exp` is strictly in the
//! future, then attach a [`VerifiedIdentity`] to the request.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::NotesError;

/// Name of the cookie carrying the credential
pub const DEFAULT_COOKIE_NAME: &str = "notes_jwt";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC signing secret
    pub secret: Secret<String>,
    /// Validity of an issued credential
    pub token_lifetime: chrono::Duration,
    pub cookie_name: String,
    /// `Max-Age` attribute of the session cookie
    pub cookie_max_age_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: Secret::new(String::new()),
            token_lifetime: chrono::Duration::minutes(60),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_max_age_secs: 309_600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: u64,
    exp: i64,
}

/// Identity attached to a request after its credential verified.
///
/// Only [`CredentialAuthority::verify_at`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    subject: u64,
    expires_at: DateTime<Utc>,
}

impl VerifiedIdentity {
    /// Verified user id
    pub fn subject(&self) -> u64 {
        self.subject
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
{
    type Rejection = NotesError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .ok_or(NotesError::Auth(AuthError::MissingIdentity))
    }
}

/// Issues and verifies credentials with the server secret
pub struct CredentialAuthority {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl CredentialAuthority {
    pub fn new(config: AuthConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);

        // Expiry is checked by hand so it can be reported separately and
        // compared strictly.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Issue a credential for `subject` valid from now
    pub fn issue(&self, subject: u64) -> Result<String, AuthError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: u64, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: subject,
            exp: (issued_at + self.config.token_lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Verify a credential against the current time
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedIdentity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("Credential rejected: {}", e);
            AuthError::InvalidCredential
        })?;
        let claims = data.claims;

        if claims.exp <= now.timestamp() {
            return Err(AuthError::ExpiredCredential);
        }

        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidCredential)?;

        Ok(VerifiedIdentity {
            subject: claims.user_id,
            expires_at,
        })
    }

    /// Read the credential cookie from request headers
    pub fn extract_credential<'a>(&self, headers: &'a HeaderMap) -> Result<&'a str, AuthError> {
        let prefix = format!("{}=", self.config.cookie_name);

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .find_map(|pair| pair.trim().strip_prefix(prefix.as_str()))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingCredential)
    }

    /// Run the full gate over a request's headers
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        let token = self.extract_credential(headers)?;
        self.verify(token)
    }

    /// `Set-Cookie` value carrying a freshly issued credential
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; Secure; SameSite=None; Max-Age={}",
            self.config.cookie_name, token, self.config.cookie_max_age_secs
        )
    }

    /// `Set-Cookie` value that clears the credential
    pub fn cleared_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; Secure; SameSite=None; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            self.config.cookie_name
        )
    }
}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing or invalid credential")]
    MissingCredential,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential has expired")]
    ExpiredCredential,

    #[error("unauthorized")]
    MissingIdentity,

    #[error("invalid username or password")]
    InvalidLogin,

    #[error("failed to issue credential: {0}")]
    Issue(String),
}

/// Identity Gate middleware for protected routes
pub async fn require_identity(
    State(authority): State<Arc<CredentialAuthority>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authority.authenticate(req.headers()) {
        Ok(identity) => {
            debug!(subject = identity.subject(), "Identity verified");
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => {
            warn!("Authentication failed for {}: {}", req.uri().path(), err);
            NotesError::from(err).into_response()
        }
    }
}
