use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::ids::CardId;

/// Cumulative per-user statistics for one card.
///
/// Counters only ever grow. `mastered` is derived from `correct` by the
/// active `MasteryRule` and is never cleared by a later miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardProgress {
    pub correct: u32,
    pub incorrect: u32,
    pub last_seen: DateTime<Utc>,
    pub mastered: bool,
}

impl CardProgress {
    /// Total attempts recorded against the card.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }

    /// True once the card has been missed at least once.
    #[must_use]
    pub fn needs_work(&self) -> bool {
        self.incorrect > 0
    }
}

/// Progress rows for one user keyed by card.
pub type ProgressMap = BTreeMap<CardId, CardProgress>;

/// Increment applied to a progress row by a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressDelta {
    pub correct: u32,
    pub incorrect: u32,
}

impl ProgressDelta {
    #[must_use]
    pub fn for_answer(correct: bool) -> Self {
        if correct {
            Self {
                correct: 1,
                incorrect: 0,
            }
        } else {
            Self {
                correct: 0,
                incorrect: 1,
            }
        }
    }
}
