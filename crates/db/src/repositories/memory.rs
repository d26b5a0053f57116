use std::collections::HashMap;

use tokio::sync::RwLock;

use kbassist_core::domain::conversation::{ConversationId, ThreadMapping, UserId};

use super::{RepositoryError, ThreadMappingRepository};

#[derive(Default)]
pub struct InMemoryThreadMappingRepository {
    mappings: RwLock<HashMap<String, ThreadMapping>>,
}

impl InMemoryThreadMappingRepository {
    pub async fn len(&self) -> usize {
        self.mappings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mappings.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ThreadMappingRepository for InMemoryThreadMappingRepository {
    async fn find(&self, user_id: &UserId) -> Result<Option<ThreadMapping>, RepositoryError> {
        let mappings = self.mappings.read().await;
        Ok(mappings.get(user_id.as_str()).cloned())
    }

    async fn insert_if_absent(
        &self,
        mapping: ThreadMapping,
    ) -> Result<ThreadMapping, RepositoryError> {
        let mut mappings = self.mappings.write().await;
        let stored = mappings.entry(mapping.user_id.0.clone()).or_insert(mapping);
        Ok(stored.clone())
    }

    async fn delete(
        &self,
        user_id: &UserId,
        expected: Option<&ConversationId>,
    ) -> Result<bool, RepositoryError> {
        let mut mappings = self.mappings.write().await;
        let matches = match (mappings.get(user_id.as_str()), expected) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(stored), Some(expected)) => &stored.conversation_id == expected,
        };
        if matches {
            mappings.remove(user_id.as_str());
        }
        Ok(matches)
    }
}
