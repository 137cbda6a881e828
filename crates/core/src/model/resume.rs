use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::ids::CardId;

/// Where a user left off inside a topic session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicResume {
    pub next_card_id: Option<CardId>,
    pub updated_at: DateTime<Utc>,
}
