use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::ids::TopicId;
use crate::model::user::User;

/// Attempt aggregates for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub topic_id: TopicId,
    pub attempts: u32,
    pub correct: u32,
    pub unique_cards: u32,
    /// `None` only for catalog topics merged in with zero attempts.
    pub last_attempt: Option<DateTime<Utc>>,
}

impl TopicStats {
    #[must_use]
    pub fn empty(topic_id: TopicId) -> Self {
        Self {
            topic_id,
            attempts: 0,
            correct: 0,
            unique_cards: 0,
            last_attempt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttemptTotals {
    pub attempts: u32,
    pub correct: u32,
}

/// One row of the admin overview: a user with their lifetime attempt counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminUserSummary {
    pub user: User,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}
