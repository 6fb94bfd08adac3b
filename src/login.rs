//! The login orchestrator: the single entry point for the full
//! login/signup decision flow.
//!
//! A request either carries an external identity token or an
//! identifier/password pair. The external path verifies the token,
//! provisions the user just-in-time when needed, and issues a session;
//! local MFA is skipped on that path by default, an explicit and
//! configurable policy since the trusted issuer owns the second factor.
//! The credential path runs the credential verifier and, for enrolled
//! users, the MFA validator. Every rejection is logged with its stage
//! internally and surfaces as the same generic denial.

use std::sync::Arc;

use anyhow::anyhow;
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use crate::config::AuthConfig;
use crate::credentials::{
    CredentialVerifier, DirectoryService, PasswordComparator, generate_placeholder_password,
};
use crate::error::{AuthError, LoginError};
use crate::events::{AuthEvent, AuthenticationMethod, EventEmitter};
use crate::mfa::{MfaValidator, MfaVerification};
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::session::{IssuedSession, SessionManager};
use crate::store::{StoreError, UserRepository};
use crate::token::{ExternalTokenVerifier, VerifiedIdentity};
use crate::users::{NewUser, PublicUser, Role, User};

/// Typed login input; the transport layer maps its request body onto this.
#[derive(Debug, Default)]
pub struct LoginRequest {
    /// Email or directory login id.
    pub identifier: Option<String>,
    pub password: Option<secrecy::SecretString>,
    pub mfa_code: Option<String>,
    pub mfa_recovery_code: Option<String>,
    /// Bearer token from the trusted external issuer.
    pub external_token: Option<String>,
    /// Browser/device identifier the session will be bound to.
    pub device_id: String,
    /// Caller address for rate limiting.
    pub client_ip: Option<String>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub session: IssuedSession,
    /// Set when a recovery code was consumed; the caller should prompt for
    /// MFA re-enrollment.
    pub used_recovery_code: bool,
}

pub struct LoginService {
    repository: Arc<dyn UserRepository>,
    comparator: Arc<dyn PasswordComparator>,
    credentials: CredentialVerifier,
    mfa: MfaValidator,
    external: Option<ExternalTokenVerifier>,
    sessions: Arc<SessionManager>,
    rate_limiter: Arc<dyn RateLimiter>,
    events: Arc<dyn EventEmitter>,
    default_role: Role,
    ldap_enabled: bool,
    external_token_mfa_exempt: bool,
}

impl LoginService {
    /// Wire the orchestrator from configuration and collaborators.
    ///
    /// # Errors
    /// Fails when the credential verifier cannot prepare its comparison
    /// material.
    pub fn new(
        config: &AuthConfig,
        repository: Arc<dyn UserRepository>,
        comparator: Arc<dyn PasswordComparator>,
        directory: Option<Arc<dyn DirectoryService>>,
        sessions: Arc<SessionManager>,
        rate_limiter: Arc<dyn RateLimiter>,
        events: Arc<dyn EventEmitter>,
    ) -> anyhow::Result<Self> {
        let credentials = CredentialVerifier::new(
            repository.clone(),
            comparator.clone(),
            directory,
            config.ldap_login_enabled(),
        )?;
        Ok(Self {
            repository,
            comparator,
            credentials,
            mfa: MfaValidator::new(config),
            external: ExternalTokenVerifier::from_config(config),
            sessions,
            rate_limiter,
            events,
            default_role: config.default_role(),
            ldap_enabled: config.ldap_login_enabled(),
            external_token_mfa_exempt: config.external_token_mfa_exempt(),
        })
    }

    /// Decide a login attempt and issue a session on success.
    ///
    /// # Errors
    /// `Denied` for every verification failure without revealing the stage,
    /// `RateLimited` when the attempt budget is exhausted, `Internal` when
    /// a collaborator fails (never degrades to an issued session).
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, LoginError> {
        if let RateLimitDecision::Limited { retry_after } =
            self.rate_limiter.check_ip(request.client_ip.as_deref())
        {
            warn!("login rejected: attempt budget exhausted for caller address");
            return Err(LoginError::RateLimited { retry_after });
        }
        if let Some(identifier) = request.identifier.as_deref() {
            if let RateLimitDecision::Limited { retry_after } =
                self.rate_limiter.check_identifier(identifier)
            {
                warn!("login rejected: attempt budget exhausted for identifier");
                return Err(LoginError::RateLimited { retry_after });
            }
        }

        if let Some(token) = request.external_token.as_deref() {
            self.external_login(token, &request).await
        } else {
            self.credential_login(&request).await
        }
    }

    /// Resolve the user behind a presented session token.
    ///
    /// # Errors
    /// `SessionInvalid` when the token does not validate or the user no
    /// longer exists; `Internal` when the store is unavailable.
    pub async fn current_user(
        &self,
        session_token: &str,
        device_id: Option<&str>,
    ) -> Result<PublicUser, AuthError> {
        let claims = self.sessions.validate(session_token, device_id)?;
        let user = self
            .repository
            .find_by_id(claims.user_id())
            .await
            .map_err(|err| AuthError::Internal(err.into()))?;
        match user {
            Some(user) => Ok(PublicUser::from(&user)),
            None => {
                warn!(user_id = %claims.user_id(), "valid session for a missing user");
                Err(AuthError::SessionInvalid)
            }
        }
    }

    /// Invalidate a session. Unconditionally successful: already-invalid
    /// and never-issued tokens are a no-op.
    pub fn logout(&self, session_token: &str) {
        self.sessions.invalidate(session_token);
        debug!("logout processed");
    }

    async fn external_login(
        &self,
        token: &str,
        request: &LoginRequest,
    ) -> Result<LoginOutcome, LoginError> {
        let Some(verifier) = self.external.as_ref() else {
            warn!("login rejected: external token presented but no trusted issuer is configured");
            return Err(LoginError::Denied);
        };

        let identity = verifier
            .verify(token)
            .map_err(|err| deny("external_token", &err))?;

        let mut user = self
            .provision_external_user(&identity)
            .await
            .map_err(|err| deny("provisioning", &err))?;

        let mut used_recovery_code = false;
        if user.mfa_enrolled() && !self.external_token_mfa_exempt {
            used_recovery_code = self
                .run_mfa(&mut user, request)
                .await
                .map_err(|err| deny("mfa", &err))?;
        }

        self.issue_outcome(
            &user,
            &request.device_id,
            AuthenticationMethod::ExternalToken,
            used_recovery_code,
        )
    }

    async fn credential_login(&self, request: &LoginRequest) -> Result<LoginOutcome, LoginError> {
        let (Some(identifier), Some(password)) =
            (request.identifier.as_deref(), request.password.as_ref())
        else {
            warn!("login rejected: missing identifier or password");
            return Err(LoginError::Denied);
        };

        let mut user = match self
            .credentials
            .verify(identifier, password.expose_secret())
            .await
        {
            Ok(user) => user,
            Err(err) => {
                self.events.emit(AuthEvent::UserLoginFailed {
                    identifier: identifier.to_string(),
                });
                return Err(deny("credentials", &err));
            }
        };

        let mut used_recovery_code = false;
        if user.mfa_enrolled() {
            used_recovery_code = self.run_mfa(&mut user, request).await.map_err(|err| {
                self.events.emit(AuthEvent::UserLoginFailed {
                    identifier: identifier.to_string(),
                });
                deny("mfa", &err)
            })?;
        } else if has_mfa_input(request) {
            self.events.emit(AuthEvent::UserLoginFailed {
                identifier: identifier.to_string(),
            });
            return Err(deny("mfa", &AuthError::MfaNotEnrolled));
        }

        let method = if self.ldap_enabled {
            AuthenticationMethod::Ldap
        } else {
            AuthenticationMethod::Email
        };
        self.issue_outcome(&user, &request.device_id, method, used_recovery_code)
    }

    /// Lookup-or-create for an externally attested identity.
    ///
    /// The email comes from verified claims only. A uniqueness conflict on
    /// create means another request provisioned the same identity first;
    /// the lookup is retried and the existing record wins.
    async fn provision_external_user(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<User, AuthError> {
        let email = identity.email();
        if let Some(user) = self.find_by_email(email).await? {
            return Ok(user);
        }

        let placeholder = self
            .comparator
            .hash(&generate_placeholder_password().map_err(AuthError::Internal)?)
            .map_err(AuthError::Internal)?;
        let new_user = NewUser {
            email: email.to_string(),
            first_name: Some(identity.display_name().to_string()),
            last_name: None,
            ldap_login_id: None,
            password_hash: Some(placeholder),
            role: self.default_role,
        };

        match self.repository.create(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, issuer = identity.issuer(), "provisioned user from external identity");
                Ok(user)
            }
            Err(StoreError::Conflict) => {
                debug!("concurrent provisioning for this identity, reusing the winner");
                self.find_by_email(email).await?.ok_or_else(|| {
                    AuthError::Internal(anyhow!("user missing after provisioning conflict"))
                })
            }
            Err(err) => Err(AuthError::Internal(err.into())),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.repository
            .find_by_email(email)
            .await
            .map_err(|err| AuthError::Internal(err.into()))
    }

    async fn run_mfa(&self, user: &mut User, request: &LoginRequest) -> Result<bool, AuthError> {
        let outcome = self.mfa.verify(
            user,
            request.mfa_code.as_deref(),
            request.mfa_recovery_code.as_deref(),
        )?;
        match outcome {
            MfaVerification::Totp => Ok(false),
            MfaVerification::RecoveryCodeConsumed => {
                // Persist before issuing, or the code would stay reusable.
                self.repository
                    .save(user)
                    .await
                    .map_err(|err| AuthError::Internal(err.into()))?;
                info!(user_id = %user.id, "recovery code consumed, re-enrollment recommended");
                Ok(true)
            }
        }
    }

    fn issue_outcome(
        &self,
        user: &User,
        device_id: &str,
        method: AuthenticationMethod,
        used_recovery_code: bool,
    ) -> Result<LoginOutcome, LoginError> {
        let session = self
            .sessions
            .issue(user.id, device_id)
            .map_err(|err| deny("session", &err))?;
        self.events.emit(AuthEvent::UserLoggedIn {
            user_id: user.id,
            email: user.email.clone(),
            authentication_method: method,
        });
        info!(user_id = %user.id, ?method, "login succeeded");
        Ok(LoginOutcome {
            user: PublicUser::from(user),
            session,
            used_recovery_code,
        })
    }
}

fn has_mfa_input(request: &LoginRequest) -> bool {
    let filled = |value: &Option<String>| {
        value
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    };
    filled(&request.mfa_code) || filled(&request.mfa_recovery_code)
}

/// Map a stage failure to the caller-visible generic denial, keeping the
/// stage in the log only. Internal failures stay internal and fail closed.
fn deny(stage: &str, err: &AuthError) -> LoginError {
    match err {
        AuthError::Internal(cause) => {
            error!(stage, "login aborted by internal failure: {cause:#}");
            LoginError::Internal(anyhow!("login stage {stage} failed"))
        }
        other => {
            warn!(stage, "login rejected: {other}");
            LoginError::Denied
        }
    }
}
