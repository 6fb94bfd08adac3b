//! Verification of externally-issued identity tokens.
//!
//! The only way to obtain claims from an external token is
//! [`ExternalTokenVerifier::verify`], which checks the signature against the
//! trusted issuer's key before anything else is read. The deserializable
//! claims struct is private to this module and [`VerifiedIdentity`] has no
//! public constructor, so no caller can act on an unverified payload.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use crate::config::AuthConfig;
use crate::credentials::looks_like_email;
use crate::error::AuthError;

/// Claims exactly as signed by the issuer. Never leaves this module.
#[derive(Debug, Deserialize)]
struct ExternalClaims {
    iss: String,
    sub: String,
    nickname: Option<String>,
    #[allow(dead_code)]
    exp: u64,
}

/// Identity attested by a verified external token.
#[derive(Clone, Debug)]
pub struct VerifiedIdentity {
    subject: String,
    display_name: String,
    issuer: String,
    email: String,
}

impl VerifiedIdentity {
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Email derived from the verified subject claim; the basis for
    /// just-in-time provisioning.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

pub struct ExternalTokenVerifier {
    issuer: String,
    decoding: DecodingKey,
    email_domain: Option<String>,
}

impl ExternalTokenVerifier {
    #[must_use]
    pub fn new(issuer: String, secret: &SecretString, email_domain: Option<String>) -> Self {
        Self {
            issuer,
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            email_domain,
        }
    }

    /// Build a verifier when the configuration names a trusted issuer.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        let issuer = config.trusted_issuer()?.to_string();
        let secret = config.external_token_secret()?;
        Some(Self::new(
            issuer,
            secret,
            config.external_email_domain().map(str::to_string),
        ))
    }

    /// Verify the token signature and expiry, then extract the identity.
    ///
    /// # Errors
    /// `InvalidToken` on signature failure, expiry, unknown issuer,
    /// malformed payload, or missing subject/display-name claims.
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = token
            .trim()
            .strip_prefix("Bearer ")
            .unwrap_or_else(|| token.trim())
            .trim();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let claims = match decode::<ExternalClaims>(token, &self.decoding, &validation) {
            Ok(data) => data.claims,
            Err(err) => {
                warn!("external token rejected: {err}");
                return Err(AuthError::InvalidToken);
            }
        };

        let subject = claims.sub.trim().to_string();
        if subject.is_empty() {
            warn!("external token rejected: empty subject claim");
            return Err(AuthError::InvalidToken);
        }
        let display_name = match claims.nickname.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!("external token rejected: missing display name claim");
                return Err(AuthError::InvalidToken);
            }
        };

        let email = match self.derive_email(&subject) {
            Some(email) => email,
            None => {
                warn!("external token rejected: subject is not email-shaped and no domain is configured");
                return Err(AuthError::InvalidToken);
            }
        };

        Ok(VerifiedIdentity {
            subject,
            display_name,
            issuer: claims.iss,
            email,
        })
    }

    fn derive_email(&self, subject: &str) -> Option<String> {
        let subject = subject.to_lowercase();
        if looks_like_email(&subject) {
            return Some(subject);
        }
        self.email_domain
            .as_deref()
            .map(|domain| format!("{subject}@{domain}"))
    }
}
