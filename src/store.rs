//! Seam to the user persistence store.
//!
//! The store is owned by the embedding application; this crate only
//! consumes it. The email uniqueness constraint of the store is the source
//! of truth for preventing duplicate accounts: a [`StoreError::Conflict`]
//! from [`UserRepository::create`] tells the caller another request won the
//! race, not that something is broken.

use async_trait::async_trait;

use crate::users::{NewUser, User};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (duplicate email).
    #[error("conflicting record")]
    Conflict,

    #[error("store unavailable")]
    Unavailable(#[source] anyhow::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Returns at most one user per distinct id, in no particular order.
    async fn find_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the email is already taken.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Persist mutated fields of an existing user.
    async fn save(&self, user: &User) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::StoreError;

    #[test]
    fn conflict_is_not_reported_as_unavailable() {
        assert_eq!(StoreError::Conflict.to_string(), "conflicting record");
        let unavailable = StoreError::Unavailable(anyhow::anyhow!("connection refused"));
        assert_eq!(unavailable.to_string(), "store unavailable");
    }
}
