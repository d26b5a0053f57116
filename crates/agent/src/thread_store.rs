use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use kbassist_core::backend::AssistantBackend;
use kbassist_core::domain::conversation::{ConversationId, ThreadMapping, UserId};
use kbassist_core::errors::TurnError;
use kbassist_db::{RepositoryError, ThreadMappingRepository};
use tokio::sync::OwnedMutexGuard;
use tracing::info;

/// User → conversation association used by the turn pipeline.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Returns the user's conversation, creating one on the backend the first time.
    async fn resolve_or_create(&self, user_id: &UserId) -> Result<ConversationId, TurnError>;

    /// Forgets the association. With `expected` set, a mapping pointing elsewhere is left
    /// alone and `false` is returned. Backend-side conversations are never removed.
    async fn delete(
        &self,
        user_id: &UserId,
        expected: Option<&ConversationId>,
    ) -> Result<bool, TurnError>;
}

/// [`ThreadStore`] that serializes operations per user id behind an async lock, so the
/// lookup, backend creation and insert of a first turn are one step for that user.
pub struct KeyedThreadStore {
    repository: Arc<dyn ThreadMappingRepository>,
    backend: Arc<dyn AssistantBackend>,
    locks: UserLocks,
}

impl KeyedThreadStore {
    pub fn new(
        repository: Arc<dyn ThreadMappingRepository>,
        backend: Arc<dyn AssistantBackend>,
    ) -> Self {
        Self { repository, backend, locks: Mutex::new(HashMap::new()) }
    }

    /// Waits for the user's lock. The map entry is dropped again once no caller holds or
    /// waits on it, so the map only tracks users with work in flight.
    async fn lock_user(&self, user_id: &UserId) -> UserGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(user_id.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        UserGuard { locks: &self.locks, user_id: user_id.clone(), guard: Some(guard) }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

type UserLocks = Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>;

struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters hold their own clone, so a count of one means only the map is left.
        if locks.get(&self.user_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.user_id);
        }
    }
}

fn require_user(user_id: &UserId) -> Result<(), TurnError> {
    if user_id.as_str().trim().is_empty() {
        return Err(TurnError::InvalidInput("user_id must not be blank".to_string()));
    }
    Ok(())
}

fn store_error(error: RepositoryError) -> TurnError {
    TurnError::ThreadStore(error.to_string())
}

#[async_trait]
impl ThreadStore for KeyedThreadStore {
    async fn resolve_or_create(&self, user_id: &UserId) -> Result<ConversationId, TurnError> {
        require_user(user_id)?;
        let _guard = self.lock_user(user_id).await;

        if let Some(existing) = self.repository.find(user_id).await.map_err(store_error)? {
            return Ok(existing.conversation_id);
        }

        let conversation = self.backend.create_conversation().await?;
        let stored = self
            .repository
            .insert_if_absent(ThreadMapping::new(user_id.clone(), conversation))
            .await
            .map_err(store_error)?;
        info!(
            event_name = "pipeline.thread.created",
            user_id = %user_id,
            thread_id = %stored.conversation_id,
            "created conversation for user"
        );
        Ok(stored.conversation_id)
    }

    async fn delete(
        &self,
        user_id: &UserId,
        expected: Option<&ConversationId>,
    ) -> Result<bool, TurnError> {
        require_user(user_id)?;
        let _guard = self.lock_user(user_id).await;

        let deleted = self.repository.delete(user_id, expected).await.map_err(store_error)?;
        info!(
            event_name = "pipeline.thread.deleted",
            user_id = %user_id,
            deleted,
            "thread mapping delete requested"
        );
        Ok(deleted)
    }
}
