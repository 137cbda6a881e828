use chrono::{DateTime, Utc};
use practice_core::MasteryRule;
use practice_core::model::{CardId, CardProgress, ProgressDelta, ProgressMap, UserId};
use sqlx::Sqlite;

use super::{
    SqliteRepository,
    mapping::{card_id_column, conn, map_progress_row, user_id_to_i64},
};
use crate::repository::{ProgressRepository, StorageError};

/// Increment-or-create in a single statement so concurrent writers cannot
/// lose updates; `mastered` is evaluated against the post-increment count.
///
/// Returns `None` when the user does not exist.
pub(super) async fn upsert_progress<'e, E>(
    executor: E,
    user_id: i64,
    card_id: &CardId,
    delta: ProgressDelta,
    rule: MasteryRule,
    now: DateTime<Utc>,
) -> Result<Option<CardProgress>, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r"
            INSERT INTO card_progress (user_id, card_id, correct, incorrect, last_seen, mastered)
            SELECT ?1, ?2, ?3, ?4, ?5, ?3 >= ?6
            WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)
            ON CONFLICT(user_id, card_id) DO UPDATE SET
                correct = card_progress.correct + excluded.correct,
                incorrect = card_progress.incorrect + excluded.incorrect,
                last_seen = excluded.last_seen,
                mastered = (card_progress.correct + excluded.correct) >= ?6
            RETURNING correct, incorrect, last_seen, mastered
        ",
    )
    .bind(user_id)
    .bind(card_id.as_str())
    .bind(i64::from(delta.correct))
    .bind(i64::from(delta.incorrect))
    .bind(now)
    .bind(i64::from(rule.threshold()))
    .fetch_optional(executor)
    .await
    .map_err(conn)?;

    row.as_ref().map(map_progress_row).transpose()
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_card_progress(
        &self,
        user_id: UserId,
        card_id: &CardId,
        delta: ProgressDelta,
        rule: MasteryRule,
        now: DateTime<Utc>,
    ) -> Result<CardProgress, StorageError> {
        upsert_progress(
            &self.pool,
            user_id_to_i64(user_id)?,
            card_id,
            delta,
            rule,
            now,
        )
        .await?
        .ok_or(StorageError::NotFound)
    }

    async fn progress_map(&self, user_id: UserId) -> Result<ProgressMap, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT card_id, correct, incorrect, last_seen, mastered
                FROM card_progress
                WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = ProgressMap::new();
        for row in rows {
            out.insert(card_id_column(&row, "card_id")?, map_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn needs_work(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT card_id
                FROM card_progress
                WHERE user_id = ?1 AND incorrect > 0
                ORDER BY last_seen DESC, card_id ASC
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| card_id_column(row, "card_id"))
            .collect()
    }
}
