//! Password credential verification.
//!
//! Email-shaped identifiers are checked against the stored hash through the
//! injected comparator; when directory login is enabled the check is
//! delegated to the directory service instead. Unknown identifiers and
//! wrong passwords fail identically, and a miss still runs one comparison
//! against a fixed dummy hash so the two cases stay indistinguishable by
//! timing.

use anyhow::{Context, Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use std::sync::Arc;
use tracing::error;

use crate::error::AuthError;
use crate::store::UserRepository;
use crate::users::User;

/// Comparator over the opaque stored password hash.
pub trait PasswordComparator: Send + Sync {
    /// Hash a password for storage.
    ///
    /// # Errors
    /// Fails when the underlying hash primitive rejects its parameters.
    fn hash(&self, password: &str) -> Result<String>;

    /// Constant-time comparison of a password against a stored hash.
    fn verify(&self, password: &str, password_hash: &str) -> bool;
}

/// Default comparator backed by Argon2id.
#[derive(Clone, Debug, Default)]
pub struct Argon2Comparator;

impl PasswordComparator for Argon2Comparator {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, password: &str, password_hash: &str) -> bool {
        PasswordHash::new(password_hash).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

/// Directory-backed credential check (LDAP or similar).
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Returns the bound user on success, `None` when the directory rejects
    /// the credentials.
    ///
    /// # Errors
    /// Fails only on directory unavailability, never on a wrong password.
    async fn verify_credentials(&self, login_id: &str, password: &str) -> Result<Option<User>>;
}

/// Normalize an identifier for lookup/uniqueness checks.
pub(crate) fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn looks_like_email(identifier: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(identifier))
}

/// Generate a throwaway high-entropy password.
///
/// Used for the dummy comparison target and for the unusable placeholder
/// credential of just-in-time provisioned users; the raw value is discarded
/// after hashing.
pub(crate) fn generate_placeholder_password() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate placeholder password")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

pub struct CredentialVerifier {
    repository: Arc<dyn UserRepository>,
    comparator: Arc<dyn PasswordComparator>,
    directory: Option<Arc<dyn DirectoryService>>,
    ldap_enabled: bool,
    /// Comparison target for identifiers that resolve to no usable hash.
    dummy_hash: String,
}

impl CredentialVerifier {
    /// # Errors
    /// Fails when the comparator cannot produce the dummy comparison target.
    pub fn new(
        repository: Arc<dyn UserRepository>,
        comparator: Arc<dyn PasswordComparator>,
        directory: Option<Arc<dyn DirectoryService>>,
        ldap_enabled: bool,
    ) -> Result<Self> {
        let dummy_hash = comparator
            .hash(&generate_placeholder_password()?)
            .context("failed to prepare dummy credential hash")?;
        Ok(Self {
            repository,
            comparator,
            directory,
            ldap_enabled,
            dummy_hash,
        })
    }

    /// Verify an identifier/password pair and return the matching user.
    ///
    /// # Errors
    /// `InvalidCredentials` on any mismatch; `Internal` when a collaborator
    /// is unavailable (fails closed).
    pub async fn verify(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let identifier = normalize_identifier(identifier);

        if self.ldap_enabled {
            return self.verify_against_directory(&identifier, password).await;
        }

        if !looks_like_email(&identifier) {
            // Burn one comparison so malformed identifiers cost the same.
            let _ = self.comparator.verify(password, &self.dummy_hash);
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .repository
            .find_by_email(&identifier)
            .await
            .map_err(|err| AuthError::Internal(err.into()))?;

        match user {
            Some(user) => {
                let Some(stored_hash) = user.password_hash.as_deref() else {
                    // Unclaimed invite accounts cannot log in with a password.
                    let _ = self.comparator.verify(password, &self.dummy_hash);
                    return Err(AuthError::InvalidCredentials);
                };
                if self.comparator.verify(password, stored_hash) {
                    Ok(user)
                } else {
                    Err(AuthError::InvalidCredentials)
                }
            }
            None => {
                let _ = self.comparator.verify(password, &self.dummy_hash);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn verify_against_directory(
        &self,
        login_id: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let Some(directory) = self.directory.as_ref() else {
            error!("directory login enabled but no directory service configured");
            return Err(AuthError::Internal(anyhow!(
                "directory service not configured"
            )));
        };
        let user = directory
            .verify_credentials(login_id, password)
            .await
            .map_err(AuthError::Internal)?;
        user.ok_or(AuthError::InvalidCredentials)
    }
}
