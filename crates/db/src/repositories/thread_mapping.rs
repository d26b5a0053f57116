use chrono::{DateTime, Utc};
use sqlx::Row;

use kbassist_core::domain::conversation::{ConversationId, ThreadMapping, UserId};

use super::{RepositoryError, ThreadMappingRepository};
use crate::DbPool;

pub struct SqlThreadMappingRepository {
    pool: DbPool,
}

impl SqlThreadMappingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_mapping(row: &sqlx::sqlite::SqliteRow) -> Result<ThreadMapping, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at `{created_at_str}`: {e}")))?;

    Ok(ThreadMapping {
        user_id: UserId(user_id),
        conversation_id: ConversationId(conversation_id),
        created_at,
    })
}

#[async_trait::async_trait]
impl ThreadMappingRepository for SqlThreadMappingRepository {
    async fn find(&self, user_id: &UserId) -> Result<Option<ThreadMapping>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, conversation_id, created_at FROM thread_mapping WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_mapping(r)?)),
            None => Ok(None),
        }
    }

    async fn insert_if_absent(
        &self,
        mapping: ThreadMapping,
    ) -> Result<ThreadMapping, RepositoryError> {
        sqlx::query(
            "INSERT INTO thread_mapping (user_id, conversation_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(mapping.user_id.as_str())
        .bind(mapping.conversation_id.as_str())
        .bind(mapping.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find(&mapping.user_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("mapping for `{}` vanished after insert", mapping.user_id))
        })
    }

    async fn delete(
        &self,
        user_id: &UserId,
        expected: Option<&ConversationId>,
    ) -> Result<bool, RepositoryError> {
        let result = match expected {
            Some(conversation_id) => {
                sqlx::query("DELETE FROM thread_mapping WHERE user_id = ? AND conversation_id = ?")
                    .bind(user_id.as_str())
                    .bind(conversation_id.as_str())
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM thread_mapping WHERE user_id = ?")
                    .bind(user_id.as_str())
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use kbassist_core::domain::conversation::{ConversationId, ThreadMapping, UserId};

    use super::SqlThreadMappingRepository;
    use crate::repositories::ThreadMappingRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    fn mapping(user: &str, conversation: &str) -> ThreadMapping {
        ThreadMapping::new(UserId(user.to_string()), ConversationId(conversation.to_string()))
    }

    #[tokio::test]
    async fn stored_mapping_survives_reload() {
        let pool = setup().await;
        let repo = SqlThreadMappingRepository::new(pool.clone());

        let stored = repo.insert_if_absent(mapping("u1", "thread_a")).await.expect("insert");
        let found = repo.find(&UserId("u1".to_string())).await.expect("find");

        assert_eq!(found.as_ref().map(|m| &m.conversation_id), Some(&stored.conversation_id));
        pool.close().await;
    }

    #[tokio::test]
    async fn second_insert_for_same_user_returns_existing_mapping() {
        let pool = setup().await;
        let repo = SqlThreadMappingRepository::new(pool.clone());

        repo.insert_if_absent(mapping("u1", "thread_a")).await.expect("insert first");
        let second = repo.insert_if_absent(mapping("u1", "thread_b")).await.expect("insert second");

        assert_eq!(second.conversation_id, ConversationId("thread_a".to_string()));
        pool.close().await;
    }

    #[tokio::test]
    async fn delete_respects_expected_conversation() {
        let pool = setup().await;
        let repo = SqlThreadMappingRepository::new(pool.clone());
        repo.insert_if_absent(mapping("u1", "thread_a")).await.expect("insert");
        let user = UserId("u1".to_string());

        let wrong = repo
            .delete(&user, Some(&ConversationId("thread_b".to_string())))
            .await
            .expect("delete wrong");
        assert!(!wrong);
        assert!(repo.find(&user).await.expect("find").is_some());

        let right = repo
            .delete(&user, Some(&ConversationId("thread_a".to_string())))
            .await
            .expect("delete right");
        assert!(right);
        assert!(repo.find(&user).await.expect("find").is_none());

        let again = repo.delete(&user, None).await.expect("delete again");
        assert!(!again);
        pool.close().await;
    }
}
