use chrono::{DateTime, Utc};
use practice_core::model::{CardId, TopicId, TopicResume, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, parse_timestamp, ser, user_id_to_i64},
};
use crate::repository::{ResumeRepository, StorageError};

#[async_trait::async_trait]
impl ResumeRepository for SqliteRepository {
    async fn upsert_topic_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
        next_card_id: Option<&CardId>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO topic_resume (user_id, topic_id, next_card_id, updated_at)
                SELECT ?1, ?2, ?3, ?4
                WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)
                ON CONFLICT(user_id, topic_id) DO UPDATE SET
                    next_card_id = excluded.next_card_id,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(topic_id.as_str())
        .bind(next_card_id.map(CardId::as_str))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_topic_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
    ) -> Result<Option<TopicResume>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT next_card_id, updated_at
                FROM topic_resume
                WHERE user_id = ?1 AND topic_id = ?2
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(topic_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let next_card_id = row
            .try_get::<Option<String>, _>("next_card_id")
            .map_err(ser)?
            .map(CardId::new)
            .transpose()
            .map_err(ser)?;

        Ok(Some(TopicResume {
            next_card_id,
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(ser)?)?,
        }))
    }
}
