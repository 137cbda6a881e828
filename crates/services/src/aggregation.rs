//! Read-side views over recorded attempts and card progress.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use practice_core::{
    ProgressConfig,
    aggregate::{DailyGoal, percent, streak_days},
    model::{AdminUserSummary, AttemptEvent, AttemptTotals, CardId, TopicStats, UserId},
    time::{Clock, utc_day_bounds},
};
use storage::repository::{AttemptRepository, ProgressRepository};

use crate::error::ProgressError;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// Everything the learner dashboard shows, computed in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub totals: AttemptTotals,
    pub accuracy_percent: u32,
    pub attempts_today: u32,
    pub daily_goal: DailyGoal,
    pub streak_days: u32,
    pub topic_stats: Vec<TopicStats>,
    pub recent: Vec<AttemptEvent>,
    pub mastered_cards: u32,
    pub attempted_cards: u32,
}

/// Site-wide overview for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub total_users: u32,
    pub onboarded_users: u32,
    pub total_attempts: u64,
    pub users: Vec<AdminUserSummary>,
}

impl AdminOverview {
    #[must_use]
    pub fn from_summaries(users: Vec<AdminUserSummary>) -> Self {
        let total_users = u32::try_from(users.len()).unwrap_or(u32::MAX);
        let onboarded = users.iter().filter(|s| s.user.onboarded).count();
        let total_attempts = users.iter().map(|s| u64::from(s.total_attempts)).sum();
        Self {
            total_users,
            onboarded_users: u32::try_from(onboarded).unwrap_or(u32::MAX),
            total_attempts,
            users,
        }
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Computes stats, streaks and feeds from the attempt log and progress rows.
///
/// Reads are not isolated from concurrent writes; a dashboard may mix
/// values from before and after an in-flight attempt.
#[derive(Clone)]
pub struct AggregationEngine {
    clock: Clock,
    config: ProgressConfig,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl AggregationEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: ProgressConfig,
        attempts: Arc<dyn AttemptRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            attempts,
            progress,
        }
    }

    /// Per-topic attempt aggregates; topics never attempted are omitted.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn topic_stats(&self, user_id: UserId) -> Result<Vec<TopicStats>, ProgressError> {
        Ok(self.attempts.topic_stats(user_id).await?)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn attempt_totals(&self, user_id: UserId) -> Result<AttemptTotals, ProgressError> {
        Ok(self.attempts.attempt_totals(user_id).await?)
    }

    /// Attempts within the current UTC day.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn attempts_today(&self, user_id: UserId) -> Result<u32, ProgressError> {
        let (start, end) = utc_day_bounds(self.clock.now());
        Ok(self
            .attempts
            .count_attempts_between(user_id, start, end)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn practice_dates(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, ProgressError> {
        Ok(self.attempts.practice_dates(user_id, limit).await?)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn recent_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptEvent>, ProgressError> {
        Ok(self.attempts.recent_attempts(user_id, limit).await?)
    }

    /// Cards answered wrong at least once, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn needs_work(&self, user_id: UserId) -> Result<Vec<CardId>, ProgressError> {
        Ok(self.progress.needs_work(user_id).await?)
    }

    /// Consecutive practice days ending today, or yesterday if today is idle.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn streak_days(&self, user_id: UserId) -> Result<u32, ProgressError> {
        let today = self.clock.today();
        let mut limit = self.config.practice_dates_limit.max(1);
        loop {
            let dates = self.practice_dates(user_id, limit).await?;
            let streak = streak_days(&dates, today);
            let loaded = u32::try_from(dates.len()).unwrap_or(u32::MAX);
            let past = dates.iter().filter(|day| **day <= today).count();
            let past = u32::try_from(past).unwrap_or(u32::MAX);
            // A full window with no gap may continue past its oldest day.
            if loaded < limit || streak < past || limit == u32::MAX {
                return Ok(streak);
            }
            limit = limit.saturating_mul(2);
        }
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn admin_summaries(&self) -> Result<Vec<AdminUserSummary>, ProgressError> {
        Ok(self.attempts.admin_summaries().await?)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn admin_overview(&self) -> Result<AdminOverview, ProgressError> {
        Ok(AdminOverview::from_summaries(self.admin_summaries().await?))
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` on store failures.
    pub async fn dashboard(&self, user_id: UserId) -> Result<Dashboard, ProgressError> {
        let totals = self.attempt_totals(user_id).await?;
        let attempts_today = self.attempts_today(user_id).await?;
        let streak_days = self.streak_days(user_id).await?;
        let topic_stats = self.topic_stats(user_id).await?;
        let recent = self
            .recent_attempts(user_id, self.config.recent_feed_limit)
            .await?;
        let progress = self.progress.progress_map(user_id).await?;

        let mastered = progress.values().filter(|p| p.mastered).count();

        Ok(Dashboard {
            accuracy_percent: percent(totals.correct, totals.attempts),
            totals,
            attempts_today,
            daily_goal: DailyGoal::new(self.config.daily_goal_target, attempts_today),
            streak_days,
            topic_stats,
            recent,
            mastered_cards: u32::try_from(mastered).unwrap_or(u32::MAX),
            attempted_cards: u32::try_from(progress.len()).unwrap_or(u32::MAX),
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use practice_core::MasteryRule;
    use practice_core::model::{ChildProfile, NewAttempt, TopicId};
    use practice_core::time::fixed_now;
    use storage::repository::{AttemptPersistence, InMemoryRepository, UserRepository};

    fn card(id: &str) -> CardId {
        CardId::new(id).unwrap()
    }

    fn topic(id: &str) -> TopicId {
        TopicId::new(id).unwrap()
    }

    fn engine_at(repo: &InMemoryRepository, now: chrono::DateTime<Utc>) -> AggregationEngine {
        AggregationEngine::new(
            Clock::fixed(now),
            ProgressConfig::default().with_daily_goal(4),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    async fn record(
        repo: &InMemoryRepository,
        user: UserId,
        c: &str,
        t: &str,
        correct: bool,
        at: chrono::DateTime<Utc>,
    ) {
        repo.record_attempt(
            &NewAttempt::new(user, card(c), topic(t), correct, at),
            MasteryRule::default(),
        )
        .await
        .unwrap();
    }

    async fn user(repo: &InMemoryRepository, key: &str) -> UserId {
        repo.get_or_create_user(key, "Kid", fixed_now())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn streak_spans_yesterday_when_today_is_idle() {
        let repo = InMemoryRepository::new();
        let uid = user(&repo, "email:kid@example.com").await;
        let now = fixed_now();
        for days_ago in [1, 2, 4] {
            record(&repo, uid, "c1", "algebra", true, now - Duration::days(days_ago)).await;
        }
        assert_eq!(engine_at(&repo, now).streak_days(uid).await.unwrap(), 2);

        record(&repo, uid, "c1", "algebra", true, now).await;
        assert_eq!(engine_at(&repo, now).streak_days(uid).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn streak_keeps_paging_past_the_date_limit() {
        let repo = InMemoryRepository::new();
        let uid = user(&repo, "email:kid@example.com").await;
        let now = fixed_now();
        for days_ago in 0..12 {
            record(&repo, uid, "c1", "algebra", true, now - Duration::days(days_ago)).await;
        }
        record(&repo, uid, "c1", "algebra", true, now - Duration::days(14)).await;

        let engine = AggregationEngine::new(
            Clock::fixed(now),
            ProgressConfig::default().with_practice_dates_limit(5),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        assert_eq!(engine.streak_days(uid).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn dashboard_combines_totals_goal_and_feed() {
        let repo = InMemoryRepository::new();
        let uid = user(&repo, "email:kid@example.com").await;
        let now = fixed_now();
        record(&repo, uid, "c1", "algebra", true, now - Duration::days(1)).await;
        record(&repo, uid, "c1", "algebra", true, now - Duration::minutes(3)).await;
        record(&repo, uid, "c1", "algebra", true, now - Duration::minutes(2)).await;
        record(&repo, uid, "g1", "geometry", false, now - Duration::minutes(1)).await;

        let dash = engine_at(&repo, now).dashboard(uid).await.unwrap();
        assert_eq!(dash.totals, AttemptTotals { attempts: 4, correct: 3 });
        assert_eq!(dash.accuracy_percent, 75);
        assert_eq!(dash.attempts_today, 3);
        assert_eq!(dash.daily_goal.progress, 3);
        assert_eq!(dash.daily_goal.percent, 75);
        assert_eq!(dash.streak_days, 2);
        assert_eq!(dash.topic_stats.len(), 2);
        assert_eq!(dash.recent[0].card_id, card("g1"));
        assert_eq!(dash.mastered_cards, 1);
        assert_eq!(dash.attempted_cards, 2);
    }

    #[tokio::test]
    async fn dashboard_for_new_user_is_all_zeros() {
        let repo = InMemoryRepository::new();
        let uid = user(&repo, "email:new@example.com").await;
        let dash = engine_at(&repo, fixed_now()).dashboard(uid).await.unwrap();
        assert_eq!(dash.totals, AttemptTotals::default());
        assert_eq!(dash.accuracy_percent, 0);
        assert_eq!(dash.streak_days, 0);
        assert!(dash.recent.is_empty());
        assert!(dash.topic_stats.is_empty());
    }

    #[tokio::test]
    async fn dashboard_serializes_with_camel_case_keys() {
        let repo = InMemoryRepository::new();
        let uid = user(&repo, "email:kid@example.com").await;
        let dash = engine_at(&repo, fixed_now()).dashboard(uid).await.unwrap();
        let json = serde_json::to_value(&dash).unwrap();
        assert!(json.get("accuracyPercent").is_some());
        assert_eq!(json["dailyGoal"]["target"], 4);
    }

    #[tokio::test]
    async fn admin_overview_counts_onboarded_and_idle_users() {
        let repo = InMemoryRepository::new();
        let busy = user(&repo, "email:busy@example.com").await;
        let _idle = user(&repo, "legacy:sam:1234").await;
        let profile = ChildProfile::new("Ada", 2015, None, fixed_now()).unwrap();
        repo.complete_onboarding(busy, &profile, fixed_now())
            .await
            .unwrap();
        record(&repo, busy, "c1", "algebra", true, fixed_now()).await;
        record(&repo, busy, "c2", "algebra", false, fixed_now()).await;

        let overview = engine_at(&repo, fixed_now()).admin_overview().await.unwrap();
        assert_eq!(overview.total_users, 2);
        assert_eq!(overview.onboarded_users, 1);
        assert_eq!(overview.total_attempts, 2);
        let idle = overview
            .users
            .iter()
            .find(|s| s.user.id != busy)
            .unwrap();
        assert_eq!(idle.total_attempts, 0);
        assert_eq!(idle.last_attempt_at, None);
    }
}
