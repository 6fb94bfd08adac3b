//! Authentication configuration loaded at startup.

use anyhow::{Context, Result};
use secrecy::SecretString;

use crate::users::Role;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_LOGIN_WINDOW_SECONDS: u64 = 5 * 60;
const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 5;

const ENV_SESSION_SECRET: &str = "GARDISTO_SESSION_SECRET";
const ENV_SESSION_SECRET_PREVIOUS: &str = "GARDISTO_SESSION_SECRET_PREVIOUS";
const ENV_SESSION_TTL_SECONDS: &str = "GARDISTO_SESSION_TTL_SECONDS";
const ENV_TRUSTED_ISSUER: &str = "GARDISTO_TRUSTED_ISSUER";
const ENV_EXTERNAL_TOKEN_SECRET: &str = "GARDISTO_EXTERNAL_TOKEN_SECRET";
const ENV_EXTERNAL_EMAIL_DOMAIN: &str = "GARDISTO_EXTERNAL_EMAIL_DOMAIN";
const ENV_EXTERNAL_TOKEN_MFA_EXEMPT: &str = "GARDISTO_EXTERNAL_TOKEN_MFA_EXEMPT";
const ENV_LDAP_LOGIN_ENABLED: &str = "GARDISTO_LDAP_LOGIN_ENABLED";
const ENV_DEFAULT_ROLE: &str = "GARDISTO_DEFAULT_ROLE";
const ENV_MFA_RECOVERY_PEPPER: &str = "GARDISTO_MFA_RECOVERY_PEPPER";
const ENV_LOGIN_WINDOW_SECONDS: &str = "GARDISTO_LOGIN_WINDOW_SECONDS";
const ENV_LOGIN_MAX_ATTEMPTS: &str = "GARDISTO_LOGIN_MAX_ATTEMPTS";

/// Configuration for the authentication core.
///
/// Secrets are held in [`SecretString`] so they never show up in debug
/// output or logs.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_secret: SecretString,
    previous_session_secret: Option<SecretString>,
    session_ttl_seconds: u64,
    trusted_issuer: Option<String>,
    external_token_secret: Option<SecretString>,
    external_email_domain: Option<String>,
    external_token_mfa_exempt: bool,
    ldap_login_enabled: bool,
    default_role: Role,
    mfa_recovery_pepper: Option<SecretString>,
    login_window_seconds: u64,
    login_max_attempts: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(session_secret: SecretString) -> Self {
        Self {
            session_secret,
            previous_session_secret: None,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            trusted_issuer: None,
            external_token_secret: None,
            external_email_domain: None,
            external_token_mfa_exempt: true,
            ldap_login_enabled: false,
            default_role: Role::Member,
            mfa_recovery_pepper: None,
            login_window_seconds: DEFAULT_LOGIN_WINDOW_SECONDS,
            login_max_attempts: DEFAULT_LOGIN_MAX_ATTEMPTS,
        }
    }

    /// Keep the previous signing secret verifying existing sessions during
    /// a rotation grace period. New sessions always use the active secret.
    #[must_use]
    pub fn with_previous_session_secret(mut self, secret: SecretString) -> Self {
        self.previous_session_secret = Some(secret);
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    /// Enable external-token login for the given issuer and verification
    /// secret. Login with an external token is refused while unset.
    #[must_use]
    pub fn with_trusted_issuer(mut self, issuer: String, secret: SecretString) -> Self {
        self.trusted_issuer = Some(issuer);
        self.external_token_secret = Some(secret);
        self
    }

    /// Domain used to derive an email from a non-email `sub` claim during
    /// just-in-time provisioning.
    #[must_use]
    pub fn with_external_email_domain(mut self, domain: String) -> Self {
        self.external_email_domain = Some(domain);
        self
    }

    /// Whether externally authenticated identities skip local MFA.
    ///
    /// Defaults to `true`: the trusted issuer is assumed to own the second
    /// factor, which moves that part of the trust boundary outside this
    /// process. Set to `false` to require local MFA on the external path
    /// as well.
    #[must_use]
    pub fn with_external_token_mfa_exempt(mut self, exempt: bool) -> Self {
        self.external_token_mfa_exempt = exempt;
        self
    }

    /// When enabled, credential logins are delegated to the directory
    /// service instead of the local password hash.
    #[must_use]
    pub fn with_ldap_login_enabled(mut self, enabled: bool) -> Self {
        self.ldap_login_enabled = enabled;
        self
    }

    /// Role assigned to just-in-time provisioned users.
    #[must_use]
    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    /// Server-side pepper mixed into recovery-code hashes.
    #[must_use]
    pub fn with_mfa_recovery_pepper(mut self, pepper: SecretString) -> Self {
        self.mfa_recovery_pepper = Some(pepper);
        self
    }

    #[must_use]
    pub fn with_login_window_seconds(mut self, seconds: u64) -> Self {
        self.login_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_max_attempts(mut self, attempts: u32) -> Self {
        self.login_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn session_secret(&self) -> &SecretString {
        &self.session_secret
    }

    #[must_use]
    pub fn previous_session_secret(&self) -> Option<&SecretString> {
        self.previous_session_secret.as_ref()
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn trusted_issuer(&self) -> Option<&str> {
        self.trusted_issuer.as_deref()
    }

    #[must_use]
    pub fn external_token_secret(&self) -> Option<&SecretString> {
        self.external_token_secret.as_ref()
    }

    #[must_use]
    pub fn external_email_domain(&self) -> Option<&str> {
        self.external_email_domain.as_deref()
    }

    #[must_use]
    pub fn external_token_mfa_exempt(&self) -> bool {
        self.external_token_mfa_exempt
    }

    #[must_use]
    pub fn ldap_login_enabled(&self) -> bool {
        self.ldap_login_enabled
    }

    #[must_use]
    pub fn default_role(&self) -> Role {
        self.default_role
    }

    #[must_use]
    pub fn mfa_recovery_pepper(&self) -> Option<&SecretString> {
        self.mfa_recovery_pepper.as_ref()
    }

    #[must_use]
    pub fn login_window_seconds(&self) -> u64 {
        self.login_window_seconds
    }

    #[must_use]
    pub fn login_max_attempts(&self) -> u32 {
        self.login_max_attempts
    }

    /// Load configuration from `GARDISTO_*` environment variables.
    ///
    /// # Errors
    /// Fails when the session signing secret is missing or a variable does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        let session_secret = std::env::var(ENV_SESSION_SECRET)
            .map(SecretString::from)
            .with_context(|| format!("{ENV_SESSION_SECRET} is required"))?;

        let mut config = Self::new(session_secret);

        if let Ok(secret) = std::env::var(ENV_SESSION_SECRET_PREVIOUS) {
            config = config.with_previous_session_secret(SecretString::from(secret));
        }
        if let Some(seconds) = parse_u64_env(ENV_SESSION_TTL_SECONDS)? {
            config = config.with_session_ttl_seconds(seconds);
        }
        match (
            std::env::var(ENV_TRUSTED_ISSUER).ok(),
            std::env::var(ENV_EXTERNAL_TOKEN_SECRET).ok(),
        ) {
            (Some(issuer), Some(secret)) => {
                config = config.with_trusted_issuer(issuer, SecretString::from(secret));
            }
            (None, None) => {}
            _ => anyhow::bail!(
                "{ENV_TRUSTED_ISSUER} and {ENV_EXTERNAL_TOKEN_SECRET} must be set together"
            ),
        }
        if let Ok(domain) = std::env::var(ENV_EXTERNAL_EMAIL_DOMAIN) {
            config = config.with_external_email_domain(domain);
        }
        if let Some(exempt) = parse_bool_env(ENV_EXTERNAL_TOKEN_MFA_EXEMPT) {
            config = config.with_external_token_mfa_exempt(exempt);
        }
        if let Some(enabled) = parse_bool_env(ENV_LDAP_LOGIN_ENABLED) {
            config = config.with_ldap_login_enabled(enabled);
        }
        if let Ok(role) = std::env::var(ENV_DEFAULT_ROLE) {
            let role = Role::from_str(&role)
                .with_context(|| format!("{ENV_DEFAULT_ROLE} does not name a role: {role}"))?;
            config = config.with_default_role(role);
        }
        if let Ok(pepper) = std::env::var(ENV_MFA_RECOVERY_PEPPER) {
            config = config.with_mfa_recovery_pepper(SecretString::from(pepper));
        }
        if let Some(seconds) = parse_u64_env(ENV_LOGIN_WINDOW_SECONDS)? {
            config = config.with_login_window_seconds(seconds);
        }
        if let Some(attempts) = parse_u64_env(ENV_LOGIN_MAX_ATTEMPTS)? {
            config = config.with_login_max_attempts(u32::try_from(attempts).with_context(
                || format!("{ENV_LOGIN_MAX_ATTEMPTS} out of range: {attempts}"),
            )?);
        }

        Ok(config)
    }
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|value| match value.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
}

fn parse_u64_env(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} is not a number: {value}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
