//! # Gardisto (Authentication & Session-Issuance Core)
//!
//! `gardisto` is the part of a multi-user backend where trust decisions are
//! made: whether a presented credential entitles a caller to a session, and
//! whether an invite link may be turned into an account. Everything around
//! it (HTTP routing, request validation, persistence, directory lookups,
//! seat licensing, analytics) is a collaborator injected through the traits
//! in this crate.
//!
//! ## Login
//!
//! [`login::LoginService`] is the single entry point. A request carries
//! either an external identity token or an identifier/password pair:
//!
//! - **External token:** the token's signature is verified against the
//!   trusted issuer's key before any claim is read; there is no code path
//!   that yields claims from an unverified token. Verified identities are
//!   provisioned just-in-time, keyed by the email derived from verified
//!   claims. By default these logins skip local MFA, a configurable policy
//!   ([`config::AuthConfig::with_external_token_mfa_exempt`]).
//! - **Credentials:** email identifiers are checked against the stored
//!   hash, directory identifiers against the directory service. Enrolled
//!   users must then pass a TOTP or single-use recovery code.
//!
//! Every login-path rejection surfaces as the same generic denial; which
//! stage rejected the attempt is only logged, never returned, so the API
//! cannot be used to enumerate accounts or probe credentials.
//!
//! ## Sessions
//!
//! Sessions are signed, expiring tokens bound to a user and the device
//! they were issued to. Logout is idempotent; revocation keeps a bounded
//! denylist of token hashes. Rotating the signing secret leaves a grace
//! period during which the previous secret still verifies.
//!
//! ## Invites
//!
//! [`invite::InviteResolver`] turns an inviter/invitee id pair into the
//! inviter's presentable name, enforcing the seat quota and refusing
//! already-claimed invitations. It is read-only and returns no PII beyond
//! the inviter's name.

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod invite;
pub mod login;
pub mod mfa;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod token;
pub mod users;

pub use config::AuthConfig;
pub use error::{AuthError, LoginError};
pub use login::{LoginOutcome, LoginRequest, LoginService};
pub use users::{PublicUser, Role, User};
