//! Error taxonomy for the authentication core.
//!
//! Components report precise failures through [`AuthError`]. The login
//! orchestrator recovers them at its boundary and exposes only the
//! deliberately under-specific [`LoginError`], so callers cannot tell which
//! verification stage rejected an attempt. Invite and current-user paths
//! surface their specific kind; they carry no credential-guessing surface.

use std::time::Duration;

/// Precise failure kinds produced by the verification components.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown identifier or wrong password. Both cases are reported
    /// identically so callers cannot probe for existing accounts.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The user has MFA enrolled but the attempt carried no code.
    #[error("mfa code required")]
    MfaRequired,

    /// The supplied TOTP or recovery code did not match.
    #[error("invalid mfa code")]
    InvalidMfaCode,

    /// A code was supplied but the user has no MFA enrollment.
    #[error("mfa not enrolled")]
    MfaNotEnrolled,

    /// External identity token failed signature or claim validation.
    #[error("invalid identity token")]
    InvalidToken,

    /// Session token is expired, tampered with, revoked, or bound to a
    /// different device.
    #[error("session invalid")]
    SessionInvalid,

    /// The seat quota reports the account limit reached.
    #[error("user quota reached")]
    QuotaExceeded,

    /// The invitee already set a password.
    #[error("invitation deleted or already claimed")]
    InviteAlreadyClaimed,

    /// The inviter record is missing the fields needed to present an invite.
    #[error("inviter account is not set up")]
    InviterNotConfigured,

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Infrastructure failure (store unavailable, key misconfiguration).
    /// Always fails closed; details go to the log, never to the caller.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// The only error shape the login path exposes.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The attempt was rejected. Which stage rejected it is logged
    /// internally and withheld here.
    #[error("invalid login credentials")]
    Denied,

    /// Too many attempts from this caller or for this identifier.
    #[error("too many login attempts, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}
