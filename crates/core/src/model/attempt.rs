use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::ids::{CardId, TopicId, UserId};

/// A single submitted answer, as it will be appended to the attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub user_id: UserId,
    pub card_id: CardId,
    pub topic_id: TopicId,
    pub correct: bool,
    pub attempted_at: DateTime<Utc>,
}

impl NewAttempt {
    #[must_use]
    pub fn new(
        user_id: UserId,
        card_id: CardId,
        topic_id: TopicId,
        correct: bool,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            card_id,
            topic_id,
            correct,
            attempted_at,
        }
    }
}

/// Immutable attempt log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptEvent {
    pub id: i64,
    pub card_id: CardId,
    pub topic_id: TopicId,
    pub correct: bool,
    pub attempted_at: DateTime<Utc>,
}
