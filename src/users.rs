//! User records and their sanitized public projection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global role assigned to a user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "global:owner")]
    Owner,
    #[serde(rename = "global:admin")]
    Admin,
    #[serde(rename = "global:member")]
    Member,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "global:owner",
            Self::Admin => "global:admin",
            Self::Member => "global:member",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "global:owner" => Some(Self::Owner),
            "global:admin" => Some(Self::Admin),
            "global:member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Identity record as stored by the embedding application.
///
/// The password hash is opaque to this crate; only the injected
/// [`PasswordComparator`](crate::credentials::PasswordComparator) interprets
/// it. MFA recovery codes are stored as Argon2id hashes, never plaintext.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    /// Globally unique, stored normalized (trimmed, lowercased).
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Directory login id, when the account is directory-backed.
    pub ldap_login_id: Option<String>,
    /// Unset for users provisioned by invite who have not claimed the
    /// account yet.
    pub password_hash: Option<String>,
    pub role: Role,
    /// Base32-encoded TOTP seed, present once MFA is enrolled.
    pub mfa_secret: Option<String>,
    /// Hashes of unused single-use recovery codes.
    pub mfa_recovery_codes: Vec<String>,
}

impl User {
    /// Whether the account has been claimed (a password was set).
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.password_hash.is_some()
    }

    #[must_use]
    pub fn mfa_enrolled(&self) -> bool {
        self.mfa_secret.is_some()
    }
}

/// Fields for creating a user; the repository assigns the id.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub ldap_login_id: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
}

/// Projection safe to return to callers: no hashes, no MFA material.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub mfa_enabled: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            mfa_enabled: user.mfa_enrolled(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::{Role, User};
    use uuid::Uuid;

    pub(crate) fn member(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: Some("Alice".to_string()),
            last_name: Some("Doe".to_string()),
            ldap_login_id: None,
            password_hash: None,
            role: Role::Member,
            mfa_secret: None,
            mfa_recovery_codes: Vec::new(),
        }
    }
}
