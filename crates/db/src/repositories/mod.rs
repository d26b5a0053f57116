use async_trait::async_trait;
use thiserror::Error;

use kbassist_core::domain::conversation::{ConversationId, ThreadMapping, UserId};

pub mod memory;
pub mod thread_mapping;

pub use memory::InMemoryThreadMappingRepository;
pub use thread_mapping::SqlThreadMappingRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Storage for user → conversation associations.
///
/// Implementations only persist; serializing concurrent first turns for one user is the
/// caller's job. `insert_if_absent` still never overwrites, so a lost race degrades to
/// returning the mapping that won.
#[async_trait]
pub trait ThreadMappingRepository: Send + Sync {
    async fn find(&self, user_id: &UserId) -> Result<Option<ThreadMapping>, RepositoryError>;

    /// Stores `mapping` unless the user already has one; returns whichever mapping is stored
    /// afterwards.
    async fn insert_if_absent(
        &self,
        mapping: ThreadMapping,
    ) -> Result<ThreadMapping, RepositoryError>;

    /// Removes the user's mapping. With `expected` set, only a mapping pointing at that exact
    /// conversation is removed. Returns whether a row was removed.
    async fn delete(
        &self,
        user_id: &UserId,
        expected: Option<&ConversationId>,
    ) -> Result<bool, RepositoryError>;
}
