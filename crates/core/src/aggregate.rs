//! Pure computations over already-loaded progress data.
//!
//! Storage answers the grouping and date-truncation queries; everything here
//! works on their results so it can be tested without a store.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::model::{CardId, ProgressMap, TopicId, TopicStats};

//
// ─── STREAKS ───────────────────────────────────────────────────────────────────
//

/// Counts consecutive practice days walking backward from `today`.
///
/// A day without activity ends the walk, except for `today` itself: having
/// not practiced yet today keeps yesterday's run alive.
#[must_use]
pub fn streak_days(practice_dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = practice_dates.iter().copied().collect();

    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

//
// ─── RESUME ────────────────────────────────────────────────────────────────────
//

/// Position to start a freshly ordered card sequence from.
///
/// Falls back to the first card when nothing is stored or the stored card is
/// no longer part of the sequence.
#[must_use]
pub fn resume_index(sequence: &[CardId], stored: Option<&CardId>) -> usize {
    stored
        .and_then(|id| sequence.iter().position(|card| card == id))
        .unwrap_or(0)
}

//
// ─── PERCENTAGES ───────────────────────────────────────────────────────────────
//

/// `part / whole` as a whole percentage, rounded half away from zero.
///
/// Returns 0 when `whole` is 0.
#[must_use]
pub fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part);
    let whole = u64::from(whole);
    let rounded = (part * 200 + whole) / (whole * 2);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// Progress toward the daily practice goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyGoal {
    pub target: u32,
    pub progress: u32,
    pub percent: u32,
}

impl DailyGoal {
    #[must_use]
    pub fn new(target: u32, attempts_today: u32) -> Self {
        let progress = attempts_today.min(target);
        Self {
            target,
            progress,
            percent: percent(progress, target),
        }
    }

    #[must_use]
    pub fn is_met(&self) -> bool {
        self.target > 0 && self.progress >= self.target
    }
}

//
// ─── TOPIC COMPLETION ──────────────────────────────────────────────────────────
//

/// Catalog slice describing which cards belong to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCatalog {
    pub topic_id: TopicId,
    pub card_ids: Vec<CardId>,
}

/// How much of a topic a user has touched and mastered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicCompletion {
    pub topic_id: TopicId,
    pub total: u32,
    pub attempted: u32,
    pub mastered: u32,
}

impl TopicCompletion {
    #[must_use]
    pub fn mastered_percent(&self) -> u32 {
        percent(self.mastered, self.total)
    }
}

#[must_use]
pub fn topic_completion(catalog: &[TopicCatalog], progress: &ProgressMap) -> Vec<TopicCompletion> {
    catalog
        .iter()
        .map(|topic| {
            let mut attempted = 0;
            let mut mastered = 0;
            for card in &topic.card_ids {
                if let Some(row) = progress.get(card) {
                    attempted += 1;
                    if row.mastered {
                        mastered += 1;
                    }
                }
            }
            TopicCompletion {
                topic_id: topic.topic_id.clone(),
                total: u32::try_from(topic.card_ids.len()).unwrap_or(u32::MAX),
                attempted,
                mastered,
            }
        })
        .collect()
}

/// Lines stats up with the catalog order, filling untouched topics with zeros.
///
/// Stats for topics missing from the catalog are appended after it.
#[must_use]
pub fn merge_topic_stats(catalog: &[TopicId], stats: Vec<TopicStats>) -> Vec<TopicStats> {
    let mut by_topic: HashMap<TopicId, TopicStats> = stats
        .into_iter()
        .map(|s| (s.topic_id.clone(), s))
        .collect();

    let mut merged: Vec<TopicStats> = catalog
        .iter()
        .map(|topic| {
            by_topic
                .remove(topic)
                .unwrap_or_else(|| TopicStats::empty(topic.clone()))
        })
        .collect();

    let mut rest: Vec<TopicStats> = by_topic.into_values().collect();
    rest.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
    merged.extend(rest);
    merged
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
