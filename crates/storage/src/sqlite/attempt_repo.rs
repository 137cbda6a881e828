use chrono::{DateTime, NaiveDate, Utc};
use practice_core::MasteryRule;
use practice_core::model::{
    AdminUserSummary, AttemptEvent, AttemptTotals, NewAttempt, ProgressDelta, TopicStats, UserId,
};
use sqlx::{Row, Sqlite};

use super::{
    SqliteRepository,
    mapping::{
        conn, map_attempt_row, map_user_row, optional_timestamp_column, parse_date, ser,
        topic_id_column, u32_from_i64, user_id_to_i64,
    },
    progress_repo::upsert_progress,
};
use crate::repository::{AttemptPersistence, AttemptRepository, RecordedAttempt, StorageError};

/// Appends the event if the user exists; `None` otherwise.
async fn insert_event<'e, E>(
    executor: E,
    user_id: i64,
    attempt: &NewAttempt,
) -> Result<Option<i64>, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        r"
            INSERT INTO attempt_events (user_id, card_id, topic_id, correct, attempted_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)
        ",
    )
    .bind(user_id)
    .bind(attempt.card_id.as_str())
    .bind(attempt.topic_id.as_str())
    .bind(attempt.correct)
    .bind(attempt.attempted_at)
    .execute(executor)
    .await
    .map_err(conn)?;

    if res.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(res.last_insert_rowid()))
}

fn limit_i64(limit: u32) -> i64 {
    i64::from(limit)
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, attempt: &NewAttempt) -> Result<i64, StorageError> {
        insert_event(&self.pool, user_id_to_i64(attempt.user_id)?, attempt)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn topic_stats(&self, user_id: UserId) -> Result<Vec<TopicStats>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    topic_id,
                    COUNT(*) AS attempts,
                    COALESCE(SUM(correct), 0) AS correct,
                    COUNT(DISTINCT card_id) AS unique_cards,
                    MAX(attempted_at) AS last_attempt
                FROM attempt_events
                WHERE user_id = ?1
                GROUP BY topic_id
                ORDER BY topic_id ASC
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TopicStats {
                topic_id: topic_id_column(&row, "topic_id")?,
                attempts: u32_from_i64("attempts", row.try_get("attempts").map_err(ser)?)?,
                correct: u32_from_i64("correct", row.try_get("correct").map_err(ser)?)?,
                unique_cards: u32_from_i64(
                    "unique_cards",
                    row.try_get("unique_cards").map_err(ser)?,
                )?,
                last_attempt: optional_timestamp_column(&row, "last_attempt")?,
            });
        }
        Ok(out)
    }

    async fn attempt_totals(&self, user_id: UserId) -> Result<AttemptTotals, StorageError> {
        let row = sqlx::query(
            r"
                SELECT COUNT(*) AS attempts, COALESCE(SUM(correct), 0) AS correct
                FROM attempt_events
                WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        Ok(AttemptTotals {
            attempts: u32_from_i64("attempts", row.try_get("attempts").map_err(ser)?)?,
            correct: u32_from_i64("correct", row.try_get("correct").map_err(ser)?)?,
        })
    }

    async fn count_attempts_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
                SELECT COUNT(*) AS attempts
                FROM attempt_events
                WHERE user_id = ?1 AND attempted_at >= ?2 AND attempted_at < ?3
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u32_from_i64("attempts", row.try_get("attempts").map_err(ser)?)
    }

    async fn practice_dates(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT DISTINCT date(attempted_at) AS day
                FROM attempt_events
                WHERE user_id = ?1
                ORDER BY day DESC
                LIMIT ?2
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(limit_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| parse_date(&row.try_get::<String, _>("day").map_err(ser)?))
            .collect()
    }

    async fn recent_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptEvent>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, card_id, topic_id, correct, attempted_at
                FROM attempt_events
                WHERE user_id = ?1
                ORDER BY attempted_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(limit_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }

    async fn admin_summaries(&self) -> Result<Vec<AdminUserSummary>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    u.id AS id,
                    u.identity_key AS identity_key,
                    u.display_name AS display_name,
                    u.child_name AS child_name,
                    u.child_birth_year AS child_birth_year,
                    u.school_name AS school_name,
                    u.onboarded AS onboarded,
                    u.created_at AS created_at,
                    u.updated_at AS updated_at,
                    COUNT(a.id) AS total_attempts,
                    COALESCE(SUM(a.correct), 0) AS correct_attempts,
                    MAX(a.attempted_at) AS last_attempt_at
                FROM users u
                LEFT JOIN attempt_events a ON a.user_id = u.id
                GROUP BY u.id
                ORDER BY u.created_at DESC, u.id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(AdminUserSummary {
                user: map_user_row(&row)?,
                total_attempts: u32_from_i64(
                    "total_attempts",
                    row.try_get("total_attempts").map_err(ser)?,
                )?,
                correct_attempts: u32_from_i64(
                    "correct_attempts",
                    row.try_get("correct_attempts").map_err(ser)?,
                )?,
                last_attempt_at: optional_timestamp_column(&row, "last_attempt_at")?,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AttemptPersistence for SqliteRepository {
    async fn record_attempt(
        &self,
        attempt: &NewAttempt,
        rule: MasteryRule,
    ) -> Result<RecordedAttempt, StorageError> {
        let user = user_id_to_i64(attempt.user_id)?;

        // The event insert is the first statement so the transaction takes the
        // write lock up front; dropping `tx` on an early return rolls back.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let attempt_id = insert_event(&mut *tx, user, attempt)
            .await?
            .ok_or(StorageError::NotFound)?;
        let progress = upsert_progress(
            &mut *tx,
            user,
            &attempt.card_id,
            ProgressDelta::for_answer(attempt.correct),
            rule,
            attempt.attempted_at,
        )
        .await?
        .ok_or(StorageError::NotFound)?;

        tx.commit().await.map_err(conn)?;

        Ok(RecordedAttempt {
            attempt_id,
            progress,
        })
    }
}
