//! Multi-factor authentication checks.
//!
//! After password verification, an enrolled user must present either the
//! current TOTP code or one of their unused recovery codes. Recovery codes
//! are single-use: a successful match removes the matched hash from the
//! user record, and the outcome tells the caller so it can prompt for
//! re-enrollment.

pub mod recovery;

use anyhow::anyhow;
use secrecy::ExposeSecret;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::users::User;

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
const TOTP_SKEW_STEPS: u8 = 1;

/// How a second factor was satisfied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MfaVerification {
    Totp,
    /// A recovery code matched and was removed from the stored set. The
    /// caller persists the user and should prompt for re-enrollment.
    RecoveryCodeConsumed,
}

pub struct MfaValidator {
    recovery_pepper: Option<Vec<u8>>,
}

impl MfaValidator {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            recovery_pepper: config
                .mfa_recovery_pepper()
                .map(|pepper| pepper.expose_secret().as_bytes().to_vec()),
        }
    }

    /// Check a TOTP code or recovery code for an enrolled user.
    ///
    /// # Errors
    /// `MfaNotEnrolled` when the user has no secret, `MfaRequired` when no
    /// code was supplied, `InvalidMfaCode` on mismatch.
    pub fn verify(
        &self,
        user: &mut User,
        totp_code: Option<&str>,
        recovery_code: Option<&str>,
    ) -> Result<MfaVerification, AuthError> {
        let Some(secret) = user.mfa_secret.clone() else {
            return Err(AuthError::MfaNotEnrolled);
        };

        if let Some(code) = non_empty(totp_code) {
            return if check_totp(&secret, &user.email, code)? {
                Ok(MfaVerification::Totp)
            } else {
                Err(AuthError::InvalidMfaCode)
            };
        }

        if let Some(code) = non_empty(recovery_code) {
            return self.consume_recovery_code(user, code);
        }

        Err(AuthError::MfaRequired)
    }

    fn consume_recovery_code(
        &self,
        user: &mut User,
        code: &str,
    ) -> Result<MfaVerification, AuthError> {
        let pepper = self.recovery_pepper.as_deref();
        let matched = user.mfa_recovery_codes.iter().position(|hash| {
            recovery::verify_recovery_code(code, hash, pepper).unwrap_or(false)
        });
        match matched {
            Some(index) => {
                // Single use: drop the matched hash before reporting success.
                user.mfa_recovery_codes.remove(index);
                Ok(MfaVerification::RecoveryCodeConsumed)
            }
            None => Err(AuthError::InvalidMfaCode),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn check_totp(secret: &str, account: &str, code: &str) -> Result<bool, AuthError> {
    let seed = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|err| AuthError::Internal(anyhow!("stored TOTP seed is invalid: {err}")))?;
    let totp = TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW_STEPS,
        TOTP_STEP_SECONDS,
        seed,
        None,
        account.to_string(),
    )
    .map_err(|err| AuthError::Internal(anyhow!("stored TOTP seed is unusable: {err}")))?;
    Ok(totp.check_current(code).unwrap_or(false))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::recovery::RecoveryCodeBatch;
    use super::{MfaValidator, MfaVerification};
    use crate::config::AuthConfig;
    use crate::error::AuthError;
    use crate::users::User;
    use crate::users::test_fixtures::member;
    use secrecy::SecretString;
    use totp_rs::{Algorithm, Secret, TOTP};

    // RFC 6238 test seed ("12345678901234567890", base32).
    const TEST_SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn validator() -> MfaValidator {
        MfaValidator::new(&AuthConfig::new(SecretString::from("secret".to_string())))
    }

    fn enrolled_user() -> User {
        let mut user = member("alice@example.com");
        user.mfa_secret = Some(TEST_SEED.to_string());
        user
    }

    fn current_code() -> String {
        let seed = Secret::Encoded(TEST_SEED.to_string()).to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            seed,
            None,
            "alice@example.com".to_string(),
        )
        .unwrap();
        totp.generate_current().unwrap()
    }

    #[test]
    fn current_totp_code_passes() {
        let mut user = enrolled_user();
        let outcome = validator()
            .verify(&mut user, Some(&current_code()), None)
            .unwrap();
        assert_eq!(outcome, MfaVerification::Totp);
    }

    #[test]
    fn wrong_totp_code_is_rejected() {
        let mut user = enrolled_user();
        let result = validator().verify(&mut user, Some("000000"), None);
        assert!(matches!(result, Err(AuthError::InvalidMfaCode)));
    }

    #[test]
    fn missing_code_for_enrolled_user_requires_mfa() {
        let mut user = enrolled_user();
        let result = validator().verify(&mut user, None, None);
        assert!(matches!(result, Err(AuthError::MfaRequired)));
        let result = validator().verify(&mut user, Some("  "), None);
        assert!(matches!(result, Err(AuthError::MfaRequired)));
    }

    #[test]
    fn code_without_enrollment_is_rejected() {
        let mut user = member("alice@example.com");
        let result = validator().verify(&mut user, Some("123456"), None);
        assert!(matches!(result, Err(AuthError::MfaNotEnrolled)));
    }

    #[test]
    fn recovery_code_is_single_use() {
        let batch = RecoveryCodeBatch::generate(None).unwrap();
        let mut user = enrolled_user();
        user.mfa_recovery_codes = batch.code_hashes.clone();
        let code = batch.codes.first().unwrap();

        let outcome = validator().verify(&mut user, None, Some(code)).unwrap();
        assert_eq!(outcome, MfaVerification::RecoveryCodeConsumed);
        assert_eq!(user.mfa_recovery_codes.len(), batch.code_hashes.len() - 1);

        let second_use = validator().verify(&mut user, None, Some(code));
        assert!(matches!(second_use, Err(AuthError::InvalidMfaCode)));
    }

    #[test]
    fn peppered_codes_need_the_matching_validator() {
        let batch = RecoveryCodeBatch::generate(Some(b"pepper")).unwrap();
        let mut user = enrolled_user();
        user.mfa_recovery_codes = batch.code_hashes.clone();
        let code = batch.codes.first().unwrap();

        let unpeppered = validator().verify(&mut user, None, Some(code));
        assert!(matches!(unpeppered, Err(AuthError::InvalidMfaCode)));

        let config = AuthConfig::new(SecretString::from("secret".to_string()))
            .with_mfa_recovery_pepper(SecretString::from("pepper".to_string()));
        let peppered = MfaValidator::new(&config)
            .verify(&mut user, None, Some(code))
            .unwrap();
        assert_eq!(peppered, MfaVerification::RecoveryCodeConsumed);
    }

    #[test]
    fn garbage_recovery_input_is_rejected_not_fatal() {
        let mut user = enrolled_user();
        user.mfa_recovery_codes = vec!["$argon2id$not-a-real-hash".to_string()];
        let result = validator().verify(&mut user, None, Some("???"));
        assert!(matches!(result, Err(AuthError::InvalidMfaCode)));
    }
}
