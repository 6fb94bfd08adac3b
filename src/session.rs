//! Session issuance, validation, and revocation.
//!
//! A session is a signed, expiring token binding a user id and the
//! browser/device identifier it was issued to. Revocation is a denylist of
//! token hashes kept until the revoked token would have expired anyway, so
//! the map stays bounded without a background sweeper. During secret
//! rotation the previous secret keeps verifying existing sessions while new
//! ones are signed with the active secret.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    sub: Uuid,
    dev: String,
    iat: u64,
    exp: u64,
}

impl SessionClaims {
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.dev
    }

    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// A freshly issued session. Delivery (cookie, header) is the embedding
/// application's concern.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: u64,
}

pub struct SessionManager {
    encoding: EncodingKey,
    /// Active key first, then the previous key during a rotation grace
    /// period.
    decoding: Vec<DecodingKey>,
    ttl_seconds: u64,
    revoked: Mutex<HashMap<Vec<u8>, u64>>,
}

impl SessionManager {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        let active = config.session_secret().expose_secret().as_bytes();
        let mut decoding = vec![DecodingKey::from_secret(active)];
        if let Some(previous) = config.previous_session_secret() {
            decoding.push(DecodingKey::from_secret(previous.expose_secret().as_bytes()));
        }
        Self {
            encoding: EncodingKey::from_secret(active),
            decoding,
            ttl_seconds: config.session_ttl_seconds(),
            revoked: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a session bound to the user and device.
    ///
    /// # Errors
    /// `Internal` when signing fails (key misconfiguration); fails closed.
    pub fn issue(&self, user_id: Uuid, device_id: &str) -> Result<IssuedSession, AuthError> {
        let now = get_current_timestamp();
        let claims = SessionClaims {
            sub: user_id,
            dev: device_id.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("failed to sign session: {err}")))?;
        Ok(IssuedSession {
            token,
            expires_at: claims.exp,
        })
    }

    /// Validate a presented session token.
    ///
    /// # Errors
    /// `SessionInvalid` when the token is expired, tampered with, revoked,
    /// signed by an unknown key, or bound to a different device.
    pub fn validate(
        &self,
        token: &str,
        expected_device: Option<&str>,
    ) -> Result<SessionClaims, AuthError> {
        let claims = self.decode_claims(token).ok_or(AuthError::SessionInvalid)?;

        let revoked = self
            .revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if revoked.contains_key(&hash_token(token)) {
            debug!(user_id = %claims.sub, "revoked session presented");
            return Err(AuthError::SessionInvalid);
        }
        drop(revoked);

        if let Some(expected) = expected_device {
            if claims.dev != expected {
                warn!(user_id = %claims.sub, "session presented from a different device");
                return Err(AuthError::SessionInvalid);
            }
        }

        Ok(claims)
    }

    /// Mark a session unusable for future validation.
    ///
    /// Unconditionally succeeds: tokens that never validated, already
    /// expired, or were already revoked are a no-op.
    pub fn invalidate(&self, token: &str) {
        let Some(claims) = self.decode_claims(token) else {
            return;
        };
        let now = get_current_timestamp();
        let mut revoked = self
            .revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The denylist only has to outlive the tokens it names.
        revoked.retain(|_, expires_at| *expires_at > now);
        revoked.insert(hash_token(token), claims.exp);
    }

    fn decode_claims(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;
        self.decoding
            .iter()
            .find_map(|key| decode::<SessionClaims>(token, key, &validation).ok())
            .map(|data| data.claims)
    }
}

/// Hash a token for the revocation map so raw tokens are never retained.
fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
