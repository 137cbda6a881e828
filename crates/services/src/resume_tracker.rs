use std::sync::Arc;

use practice_core::{
    aggregate::resume_index,
    model::{CardId, TopicId, UserId},
    time::Clock,
};
use storage::repository::ResumeRepository;

use crate::error::ProgressError;

/// Which card sequence a practice session walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    /// All cards of one topic, resumable.
    Topic(TopicId),
    /// Cards from the needs-work list. Always starts from the beginning.
    NeedsWork,
}

/// Remembers where a user left off in each topic.
#[derive(Clone)]
pub struct ResumeTracker {
    clock: Clock,
    store: Arc<dyn ResumeRepository>,
}

impl ResumeTracker {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn ResumeRepository>) -> Self {
        Self { clock, store }
    }

    /// Overwrite the resume pointer. `None` clears it (topic finished).
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for an unknown user and
    /// `ProgressError::StorageUnavailable` on store failures.
    pub async fn set_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
        next_card_id: Option<&CardId>,
    ) -> Result<(), ProgressError> {
        self.store
            .upsert_topic_resume(user_id, topic_id, next_card_id, self.clock.now())
            .await?;
        tracing::debug!(%user_id, %topic_id, next = ?next_card_id, "resume pointer stored");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn get_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
    ) -> Result<Option<CardId>, ProgressError> {
        let resume = self.store.get_topic_resume(user_id, topic_id).await?;
        Ok(resume.and_then(|r| r.next_card_id))
    }

    /// Index to start `sequence` from: the stored card's position for topic
    /// sessions, 0 otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn start_position(
        &self,
        user_id: UserId,
        session: &SessionKind,
        sequence: &[CardId],
    ) -> Result<usize, ProgressError> {
        match session {
            SessionKind::NeedsWork => Ok(0),
            SessionKind::Topic(topic_id) => {
                let stored = self.get_resume(user_id, topic_id).await?;
                Ok(resume_index(sequence, stored.as_ref()))
            }
        }
    }
}
