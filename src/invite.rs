//! Resolution of invite links into presentable inviter information.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::AuthError;
use crate::events::{AuthEvent, EventEmitter};
use crate::store::UserRepository;
use crate::users::User;

/// Seat-quota collaborator; typically backed by the license layer.
pub trait SeatQuota: Send + Sync {
    fn is_within_limit(&self) -> bool;
}

/// Quota that never limits; for deployments without seat licensing.
#[derive(Clone, Debug)]
pub struct UnlimitedSeats;

impl SeatQuota for UnlimitedSeats {
    fn is_within_limit(&self) -> bool {
        true
    }
}

/// What an invite link is allowed to show about the inviter. No other PII.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InviterInfo {
    pub first_name: String,
    pub last_name: Option<String>,
}

pub struct InviteResolver {
    repository: Arc<dyn UserRepository>,
    quota: Arc<dyn SeatQuota>,
    events: Arc<dyn EventEmitter>,
}

impl InviteResolver {
    #[must_use]
    pub fn new(
        repository: Arc<dyn UserRepository>,
        quota: Arc<dyn SeatQuota>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            repository,
            quota,
            events,
        }
    }

    /// Validate an invite pair and return the inviter's presentable name.
    ///
    /// Read-only and idempotent; repeated calls with the same ids return
    /// the same result.
    ///
    /// # Errors
    /// `QuotaExceeded` when the seat limit is reached, `NotFound` unless
    /// both ids resolve, `InviteAlreadyClaimed` when the invitee has a
    /// password, `InviterNotConfigured` when the inviter is missing an
    /// email or first name.
    pub async fn resolve(
        &self,
        inviter_id: Uuid,
        invitee_id: Uuid,
    ) -> Result<InviterInfo, AuthError> {
        if !self.quota.is_within_limit() {
            debug!(%inviter_id, %invitee_id, "invite resolution refused: user quota reached");
            return Err(AuthError::QuotaExceeded);
        }

        let users = self
            .repository
            .find_many_by_ids(&[inviter_id, invitee_id])
            .await
            .map_err(|err| AuthError::Internal(err.into()))?;

        if users.len() != 2 {
            debug!(%inviter_id, %invitee_id, "invite resolution failed: inviter or invitee missing");
            return Err(AuthError::NotFound);
        }

        let invitee = users.iter().find(|user| user.id == invitee_id);
        match invitee {
            Some(invitee) if !invitee.is_claimed() => {}
            _ => {
                debug!(%inviter_id, %invitee_id, "invite resolution failed: invitee already set up");
                return Err(AuthError::InviteAlreadyClaimed);
            }
        }

        let inviter = users.iter().find(|user| user.id == inviter_id);
        let Some(inviter) = inviter.filter(|user| inviter_presentable(user)) else {
            debug!(%inviter_id, "invite resolution failed: inviter not set up");
            return Err(AuthError::InviterNotConfigured);
        };

        self.events.emit(AuthEvent::UserInviteClick {
            inviter_id,
            invitee_id,
        });

        Ok(InviterInfo {
            // first_name presence is checked above.
            first_name: inviter.first_name.clone().unwrap_or_default(),
            last_name: inviter.last_name.clone(),
        })
    }
}

fn inviter_presentable(inviter: &User) -> bool {
    !inviter.email.trim().is_empty()
        && inviter
            .first_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{InviteResolver, InviterInfo, SeatQuota, UnlimitedSeats};
    use crate::error::AuthError;
    use crate::events::NoopEventEmitter;
    use crate::store::{StoreError, UserRepository};
    use crate::users::test_fixtures::member;
    use crate::users::{NewUser, User};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FixedRepository {
        users: Vec<User>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl UserRepository for FixedRepository {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            Ok(self.users.iter().find(|user| user.email == email).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            Ok(self.users.iter().find(|user| user.id == id).cloned())
        }

        async fn find_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let distinct: HashSet<Uuid> = ids.iter().copied().collect();
            Ok(self
                .users
                .iter()
                .filter(|user| distinct.contains(&user.id))
                .cloned()
                .collect())
        }

        async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Conflict)
        }

        async fn save(&self, _user: &User) -> Result<(), StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!(
                "writes not expected in invite resolution"
            )))
        }
    }

    struct FullSeats;

    impl SeatQuota for FullSeats {
        fn is_within_limit(&self) -> bool {
            false
        }
    }

    fn resolver_with(users: Vec<User>) -> (InviteResolver, Arc<FixedRepository>) {
        let repository = Arc::new(FixedRepository {
            users,
            reads: AtomicUsize::new(0),
        });
        let resolver = InviteResolver::new(
            repository.clone(),
            Arc::new(UnlimitedSeats),
            Arc::new(NoopEventEmitter),
        );
        (resolver, repository)
    }

    fn inviter() -> User {
        let mut user = member("owner@example.com");
        user.password_hash = Some("$argon2id$stub".to_string());
        user.first_name = Some("Owner".to_string());
        user.last_name = Some("Person".to_string());
        user
    }

    #[tokio::test]
    async fn valid_invite_returns_inviter_names_only() {
        let inviter = inviter();
        let invitee = member("invitee@example.com");
        let (resolver, _) = resolver_with(vec![inviter.clone(), invitee.clone()]);

        let info = resolver
            .resolve(inviter.id, invitee.id)
            .await
            .expect("invite resolves");
        assert_eq!(
            info,
            InviterInfo {
                first_name: "Owner".to_string(),
                last_name: Some("Person".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn resolution_is_repeatable_and_read_only() {
        let inviter = inviter();
        let invitee = member("invitee@example.com");
        let (resolver, repository) = resolver_with(vec![inviter.clone(), invitee.clone()]);

        let first = resolver.resolve(inviter.id, invitee.id).await.expect("resolves");
        let second = resolver.resolve(inviter.id, invitee.id).await.expect("resolves");
        assert_eq!(first, second);
        assert_eq!(repository.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn quota_reached_fails_before_lookup() {
        let inviter = inviter();
        let invitee = member("invitee@example.com");
        let repository = Arc::new(FixedRepository {
            users: vec![inviter.clone(), invitee.clone()],
            reads: AtomicUsize::new(0),
        });
        let resolver = InviteResolver::new(
            repository.clone(),
            Arc::new(FullSeats),
            Arc::new(NoopEventEmitter),
        );

        let result = resolver.resolve(inviter.id, invitee.id).await;
        assert!(matches!(result, Err(AuthError::QuotaExceeded)));
        assert_eq!(repository.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_ids_fail_not_found() {
        let inviter = inviter();
        let (resolver, _) = resolver_with(vec![inviter.clone()]);
        let result = resolver.resolve(inviter.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn same_id_for_both_parties_fails_not_found() {
        let inviter = inviter();
        let (resolver, _) = resolver_with(vec![inviter.clone()]);
        let result = resolver.resolve(inviter.id, inviter.id).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn claimed_invitee_fails_regardless_of_inviter() {
        let mut claimed = member("invitee@example.com");
        claimed.password_hash = Some("$argon2id$stub".to_string());

        // Even with a fully configured inviter the claimed invitee wins.
        let inviter = inviter();
        let (resolver, _) = resolver_with(vec![inviter.clone(), claimed.clone()]);
        let result = resolver.resolve(inviter.id, claimed.id).await;
        assert!(matches!(result, Err(AuthError::InviteAlreadyClaimed)));

        // And also with a misconfigured inviter.
        let mut bare_inviter = inviter.clone();
        bare_inviter.first_name = None;
        let (resolver, _) = resolver_with(vec![bare_inviter.clone(), claimed.clone()]);
        let result = resolver.resolve(bare_inviter.id, claimed.id).await;
        assert!(matches!(result, Err(AuthError::InviteAlreadyClaimed)));
    }

    #[tokio::test]
    async fn inviter_without_first_name_fails() {
        let mut inviter = inviter();
        inviter.first_name = None;
        let invitee = member("invitee@example.com");
        let (resolver, _) = resolver_with(vec![inviter.clone(), invitee.clone()]);
        let result = resolver.resolve(inviter.id, invitee.id).await;
        assert!(matches!(result, Err(AuthError::InviterNotConfigured)));
    }
}
