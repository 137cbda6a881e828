use std::sync::Arc;

use practice_core::{
    MasteryRule,
    model::{CardId, CardProgress, NewAttempt, TopicId, UserId},
    time::Clock,
};
use storage::repository::AttemptPersistence;

use crate::error::ProgressError;

/// Records answered cards: one log entry plus the per-card rollup, atomically.
#[derive(Clone)]
pub struct AttemptRecorder {
    clock: Clock,
    rule: MasteryRule,
    store: Arc<dyn AttemptPersistence>,
}

impl AttemptRecorder {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn AttemptPersistence>) -> Self {
        Self {
            clock,
            rule: MasteryRule::default(),
            store,
        }
    }

    /// Override the mastery rule (configured threshold).
    #[must_use]
    pub fn with_rule(mut self, rule: MasteryRule) -> Self {
        self.rule = rule;
        self
    }

    /// Append an attempt and update the card's progress row.
    ///
    /// Card and topic ids are not checked against any catalog.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` if the user does not exist and
    /// `ProgressError::StorageUnavailable` if the store rejects the write. In
    /// both cases nothing is recorded.
    pub async fn record_attempt(
        &self,
        user_id: UserId,
        card_id: &CardId,
        topic_id: &TopicId,
        correct: bool,
    ) -> Result<CardProgress, ProgressError> {
        let attempt = NewAttempt::new(
            user_id,
            card_id.clone(),
            topic_id.clone(),
            correct,
            self.clock.now(),
        );

        match self.store.record_attempt(&attempt, self.rule).await {
            Ok(recorded) => {
                tracing::debug!(
                    %user_id,
                    %card_id,
                    %topic_id,
                    correct,
                    attempt_id = recorded.attempt_id,
                    mastered = recorded.progress.mastered,
                    "attempt recorded"
                );
                Ok(recorded.progress)
            }
            Err(err) => {
                tracing::warn!(%user_id, %card_id, error = %err, "failed to record attempt");
                Err(err.into())
            }
        }
    }
}
