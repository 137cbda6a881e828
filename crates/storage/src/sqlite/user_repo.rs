use chrono::{DateTime, Utc};
use practice_core::model::{ChildProfile, User, UserId};

use super::{
    SqliteRepository,
    mapping::{conn, map_user_row, user_id_to_i64},
};
use crate::repository::{StorageError, UserRepository};

const USER_COLUMNS: &str = r"
    id, identity_key, display_name, child_name, child_birth_year,
    school_name, onboarded, created_at, updated_at
";

impl SqliteRepository {
    async fn fetch_user_by_key(&self, identity_key: &str) -> Result<Option<User>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE identity_key = ?1");
        let row = sqlx::query(&sql)
            .bind(identity_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_user_row).transpose()
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn get_or_create_user(
        &self,
        identity_key: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StorageError> {
        // Insert-if-absent keeps concurrent first sign-ins from racing.
        let res = sqlx::query(
            r"
                INSERT INTO users (identity_key, display_name, onboarded, created_at, updated_at)
                VALUES (?1, ?2, 0, ?3, ?3)
                ON CONFLICT(identity_key) DO NOTHING
            ",
        )
        .bind(identity_key)
        .bind(display_name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() > 0 {
            tracing::info!(user_id = res.last_insert_rowid(), "created user");
        }

        self.fetch_user_by_key(identity_key)
            .await?
            .ok_or(StorageError::Conflict)
    }

    async fn find_user(&self, identity_key: &str) -> Result<Option<User>, StorageError> {
        self.fetch_user_by_key(identity_key).await
    }

    async fn complete_onboarding(
        &self,
        user_id: UserId,
        profile: &ChildProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StorageError> {
        let sql = format!(
            r"
                UPDATE users
                SET child_name = ?1,
                    child_birth_year = ?2,
                    school_name = ?3,
                    onboarded = 1,
                    updated_at = ?4
                WHERE id = ?5
                RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(profile.child_name.as_str())
            .bind(i64::from(profile.birth_year))
            .bind(profile.school_name.as_deref())
            .bind(now)
            .bind(user_id_to_i64(user_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_user_row(&row)
    }
}
