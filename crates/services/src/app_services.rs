use std::sync::Arc;

use practice_core::ProgressConfig;
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// Connects and runs migrations once, before any request is served.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the config is invalid or storage
    /// initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: ProgressConfig,
    ) -> Result<Self, AppServicesError> {
        config.validate()?;
        let storage = Storage::sqlite(db_url).await?;
        tracing::info!(
            mastery_threshold = config.mastery_threshold,
            daily_goal = config.daily_goal_target,
            "progress services ready"
        );
        Ok(Self::from_storage(clock, storage, config))
    }

    /// Build services over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if the config is invalid.
    pub fn in_memory(clock: Clock, config: ProgressConfig) -> Result<Self, AppServicesError> {
        config.validate()?;
        Ok(Self::from_storage(clock, Storage::in_memory(), config))
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: Storage, config: ProgressConfig) -> Self {
        Self {
            progress: Arc::new(ProgressService::new(clock, storage, config)),
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }
}
