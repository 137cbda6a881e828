use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use practice_core::model::{
    AttemptEvent, CardId, CardProgress, ChildProfile, TopicId, User, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn user_id_to_i64(id: UserId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("user_id overflow".into()))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    u64::try_from(v)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization("user_id sign overflow".into()))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Parses a stored timestamp.
///
/// Columns bound from `DateTime<Utc>` hold RFC 3339 text; the space-separated
/// form is what `SQLite`'s own date functions produce.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| StorageError::Serialization(format!("invalid timestamp: {raw}")))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| StorageError::Serialization(format!("invalid date: {raw}")))
}

fn timestamp_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<DateTime<Utc>, StorageError> {
    parse_timestamp(&row.try_get::<String, _>(column).map_err(ser)?)
}

pub(crate) fn optional_timestamp_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    row.try_get::<Option<String>, _>(column)
        .map_err(ser)?
        .as_deref()
        .map(parse_timestamp)
        .transpose()
}

pub(crate) fn card_id_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<CardId, StorageError> {
    CardId::new(row.try_get::<String, _>(column).map_err(ser)?).map_err(ser)
}

pub(crate) fn topic_id_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<TopicId, StorageError> {
    TopicId::new(row.try_get::<String, _>(column).map_err(ser)?).map_err(ser)
}

pub(crate) fn map_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, StorageError> {
    let child_name: Option<String> = row.try_get("child_name").map_err(ser)?;
    let birth_year: Option<i64> = row.try_get("child_birth_year").map_err(ser)?;

    let profile = match (child_name, birth_year) {
        (Some(child_name), Some(year)) => Some(ChildProfile {
            child_name,
            birth_year: i32::try_from(year)
                .map_err(|_| StorageError::Serialization(format!("invalid birth year: {year}")))?,
            school_name: row.try_get("school_name").map_err(ser)?,
        }),
        _ => None,
    };

    Ok(User {
        id: user_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        identity_key: row.try_get("identity_key").map_err(ser)?,
        display_name: row.try_get("display_name").map_err(ser)?,
        profile,
        onboarded: row.try_get("onboarded").map_err(ser)?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CardProgress, StorageError> {
    Ok(CardProgress {
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        incorrect: u32_from_i64("incorrect", row.try_get::<i64, _>("incorrect").map_err(ser)?)?,
        last_seen: timestamp_column(row, "last_seen")?,
        mastered: row.try_get("mastered").map_err(ser)?,
    })
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<AttemptEvent, StorageError> {
    Ok(AttemptEvent {
        id: row.try_get("id").map_err(ser)?,
        card_id: card_id_column(row, "card_id")?,
        topic_id: topic_id_column(row, "topic_id")?,
        correct: row.try_get("correct").map_err(ser)?,
        attempted_at: timestamp_column(row, "attempted_at")?,
    })
}
