//! Recovery code generation and verification.
//!
//! Recovery codes are the fallback when a TOTP device is unavailable. Each
//! code is single-use; only Argon2id hashes are stored on the user record,
//! optionally mixed with a server-side pepper.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{RngCore, rngs::OsRng};

const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated recovery-code batch (plaintext + hashes).
///
/// The plaintext codes are shown to the user once; the hashes go into
/// `User::mfa_recovery_codes`.
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a new recovery-code batch.
    ///
    /// # Errors
    /// Fails when the system RNG or the hash primitive fails.
    pub fn generate(pepper: Option<&[u8]>) -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng, pepper)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, pepper: Option<&[u8]>) -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code(rng)?;
            let hash = hash_recovery_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize a recovery code for verification.
///
/// # Errors
/// Fails when the input cannot be a recovery code at all.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }

    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow::anyhow!("invalid recovery code characters"));
    }

    Ok(normalized)
}

/// Format a normalized recovery code for display.
///
/// # Errors
/// Fails on inputs of the wrong length.
pub fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

/// Verify a recovery code against a stored hash.
///
/// # Errors
/// Fails on malformed input or a malformed stored hash.
pub fn verify_recovery_code(code: &str, stored_hash: &str, pepper: Option<&[u8]>) -> Result<bool> {
    let normalized = normalize_recovery_code(code)?;
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|_| anyhow::anyhow!("invalid recovery code hash"))?;
    let argon2 = recovery_hasher(pepper)?;
    Ok(argon2
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn recovery_hasher(pepper: Option<&[u8]>) -> Result<Argon2<'_>> {
    match pepper {
        Some(pepper) => Argon2::new_with_secret(
            pepper,
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2::Params::default(),
        )
        .map_err(|_| anyhow::anyhow!("failed to initialize Argon2id")),
        None => Ok(Argon2::default()),
    }
}

/// Generate a single recovery code in grouped form.
fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_recovery_code(&normalized)
}

fn hash_recovery_code(code: &str, pepper: Option<&[u8]>) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = recovery_hasher(pepper)?;
    let hash = argon2
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{
        RecoveryCodeBatch, format_recovery_code, normalize_recovery_code, verify_recovery_code,
    };

    #[test]
    fn normalize_recovery_code_trims_and_uppercases() {
        let normalized = normalize_recovery_code("abcd-efgh-jklm").unwrap();
        assert_eq!(normalized, "ABCDEFGHJKLM");
    }

    #[test]
    fn format_recovery_code_groups() {
        let formatted = format_recovery_code("ABCDEFGHJKLM").unwrap();
        assert_eq!(formatted, "ABCD-EFGH-JKLM");
    }

    #[test]
    fn batch_has_ten_codes_with_matching_hashes() {
        let batch = RecoveryCodeBatch::generate(None).unwrap();
        assert_eq!(batch.codes.len(), 10);
        assert_eq!(batch.code_hashes.len(), 10);
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let pepper = Some(b"pepper".as_slice());
        let batch = RecoveryCodeBatch::generate(pepper).unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_recovery_code(code, hash, pepper).unwrap());
        assert!(!verify_recovery_code("ABCD-EFGH-9999", hash, pepper).unwrap());
    }

    #[test]
    fn pepper_mismatch_rejects() {
        let batch = RecoveryCodeBatch::generate(Some(b"pepper")).unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(!verify_recovery_code(code, hash, Some(b"other")).unwrap());
        assert!(!verify_recovery_code(code, hash, None).unwrap());
    }
}
