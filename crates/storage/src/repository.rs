use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use practice_core::MasteryRule;
use practice_core::model::{
    AdminUserSummary, AttemptEvent, AttemptTotals, CardId, CardProgress, ChildProfile, NewAttempt,
    ProgressDelta, ProgressMap, TopicId, TopicResume, TopicStats, User, UserId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Outcome of persisting one attempt: the log row id and the updated rollup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAttempt {
    pub attempt_id: i64,
    pub progress: CardProgress,
}

/// Repository contract for users and their identity keys.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch the user for `identity_key`, creating it on first sign-in.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the user cannot be read or stored.
    async fn get_or_create_user(
        &self,
        identity_key: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StorageError>;

    /// Look up a user by identity key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_user(&self, identity_key: &str) -> Result<Option<User>, StorageError>;

    /// Store the child profile and mark the user onboarded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn complete_onboarding(
        &self,
        user_id: UserId,
        profile: &ChildProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StorageError>;
}

/// Per-card rollups.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Atomically increment-or-create the row for `(user_id, card_id)`.
    ///
    /// `mastered` and `last_seen` are computed by the store from `rule` and `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn upsert_card_progress(
        &self,
        user_id: UserId,
        card_id: &CardId,
        delta: ProgressDelta,
        rule: MasteryRule,
        now: DateTime<Utc>,
    ) -> Result<CardProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn progress_map(&self, user_id: UserId) -> Result<ProgressMap, StorageError>;

    /// Cards missed at least once, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn needs_work(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError>;
}

/// Append-only attempt log and the aggregates computed from it.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn insert_attempt(&self, attempt: &NewAttempt) -> Result<i64, StorageError>;

    /// Per-topic aggregates ordered by topic id; topics without attempts are absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn topic_stats(&self, user_id: UserId) -> Result<Vec<TopicStats>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn attempt_totals(&self, user_id: UserId) -> Result<AttemptTotals, StorageError>;

    /// Attempts with `from <= attempted_at < until`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_attempts_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Distinct UTC dates with at least one attempt, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn practice_dates(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn recent_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptEvent>, StorageError>;

    /// Every user with lifetime attempt counts, newest users first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn admin_summaries(&self) -> Result<Vec<AdminUserSummary>, StorageError>;
}

/// Writes an attempt event and its progress rollup as one unit.
#[async_trait]
pub trait AttemptPersistence: Send + Sync {
    /// Append the event and upsert the card row; either both land or neither does.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist, or other
    /// storage errors if the transaction fails.
    async fn record_attempt(
        &self,
        attempt: &NewAttempt,
        rule: MasteryRule,
    ) -> Result<RecordedAttempt, StorageError>;
}

/// Per-topic resume pointers.
#[async_trait]
pub trait ResumeRepository: Send + Sync {
    /// Overwrite the resume pointer for `(user_id, topic_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn upsert_topic_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
        next_card_id: Option<&CardId>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_topic_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
    ) -> Result<Option<TopicResume>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    next_user_id: u64,
    next_attempt_id: i64,
    users: BTreeMap<UserId, User>,
    keys: HashMap<String, UserId>,
    progress: HashMap<(UserId, CardId), CardProgress>,
    attempts: Vec<(UserId, AttemptEvent)>,
    resumes: HashMap<(UserId, TopicId), TopicResume>,
}

impl MemoryState {
    fn require_user(&self, user_id: UserId) -> Result<(), StorageError> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    fn attempts_for(&self, user_id: UserId) -> impl Iterator<Item = &AttemptEvent> {
        self.attempts
            .iter()
            .filter(move |(owner, _)| *owner == user_id)
            .map(|(_, event)| event)
    }

    fn push_attempt(&mut self, attempt: &NewAttempt) -> i64 {
        self.next_attempt_id += 1;
        let id = self.next_attempt_id;
        self.attempts.push((
            attempt.user_id,
            AttemptEvent {
                id,
                card_id: attempt.card_id.clone(),
                topic_id: attempt.topic_id.clone(),
                correct: attempt.correct,
                attempted_at: attempt.attempted_at,
            },
        ));
        id
    }

    fn bump_progress(
        &mut self,
        user_id: UserId,
        card_id: &CardId,
        delta: ProgressDelta,
        rule: MasteryRule,
        now: DateTime<Utc>,
    ) -> CardProgress {
        let key = (user_id, card_id.clone());
        let updated = rule.apply_delta(self.progress.get(&key), delta, now);
        self.progress.insert(key, updated.clone());
        updated
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All tables sit behind one lock so multi-row writes are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn get_or_create_user(
        &self,
        identity_key: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StorageError> {
        let mut guard = self.lock()?;
        if let Some(id) = guard.keys.get(identity_key).copied() {
            return guard.users.get(&id).cloned().ok_or(StorageError::Conflict);
        }

        guard.next_user_id += 1;
        let id = UserId::new(guard.next_user_id);
        let user = User {
            id,
            identity_key: identity_key.to_owned(),
            display_name: display_name.to_owned(),
            profile: None,
            onboarded: false,
            created_at: now,
            updated_at: now,
        };
        guard.keys.insert(identity_key.to_owned(), id);
        guard.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, identity_key: &str) -> Result<Option<User>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .keys
            .get(identity_key)
            .and_then(|id| guard.users.get(id))
            .cloned())
    }

    async fn complete_onboarding(
        &self,
        user_id: UserId,
        profile: &ChildProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StorageError> {
        let mut guard = self.lock()?;
        let user = guard
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::NotFound)?;
        user.profile = Some(profile.clone());
        user.onboarded = true;
        user.updated_at = now;
        Ok(user.clone())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_card_progress(
        &self,
        user_id: UserId,
        card_id: &CardId,
        delta: ProgressDelta,
        rule: MasteryRule,
        now: DateTime<Utc>,
    ) -> Result<CardProgress, StorageError> {
        let mut guard = self.lock()?;
        guard.require_user(user_id)?;
        Ok(guard.bump_progress(user_id, card_id, delta, rule, now))
    }

    async fn progress_map(&self, user_id: UserId) -> Result<ProgressMap, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .progress
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|((_, card), row)| (card.clone(), row.clone()))
            .collect())
    }

    async fn needs_work(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<(&CardId, &CardProgress)> = guard
            .progress
            .iter()
            .filter(|((owner, _), row)| *owner == user_id && row.needs_work())
            .map(|((_, card), row)| (card, row))
            .collect();
        rows.sort_by(|a, b| b.1.last_seen.cmp(&a.1.last_seen).then_with(|| a.0.cmp(b.0)));
        Ok(rows.into_iter().map(|(card, _)| card.clone()).collect())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, attempt: &NewAttempt) -> Result<i64, StorageError> {
        let mut guard = self.lock()?;
        guard.require_user(attempt.user_id)?;
        Ok(guard.push_attempt(attempt))
    }

    async fn topic_stats(&self, user_id: UserId) -> Result<Vec<TopicStats>, StorageError> {
        let guard = self.lock()?;
        let mut groups: BTreeMap<TopicId, (TopicStats, BTreeSet<CardId>)> = BTreeMap::new();
        for event in guard.attempts_for(user_id) {
            let (stats, cards) = groups
                .entry(event.topic_id.clone())
                .or_insert_with(|| (TopicStats::empty(event.topic_id.clone()), BTreeSet::new()));
            stats.attempts += 1;
            if event.correct {
                stats.correct += 1;
            }
            cards.insert(event.card_id.clone());
            stats.last_attempt = stats.last_attempt.max(Some(event.attempted_at));
        }
        Ok(groups
            .into_values()
            .map(|(mut stats, cards)| {
                stats.unique_cards = count_u32(cards.len());
                stats
            })
            .collect())
    }

    async fn attempt_totals(&self, user_id: UserId) -> Result<AttemptTotals, StorageError> {
        let guard = self.lock()?;
        let mut totals = AttemptTotals::default();
        for event in guard.attempts_for(user_id) {
            totals.attempts += 1;
            if event.correct {
                totals.correct += 1;
            }
        }
        Ok(totals)
    }

    async fn count_attempts_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let guard = self.lock()?;
        Ok(count_u32(
            guard
                .attempts_for(user_id)
                .filter(|e| e.attempted_at >= from && e.attempted_at < until)
                .count(),
        ))
    }

    async fn practice_dates(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let guard = self.lock()?;
        let days: BTreeSet<NaiveDate> = guard
            .attempts_for(user_id)
            .map(|e| e.attempted_at.date_naive())
            .collect();
        Ok(days
            .into_iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn recent_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptEvent>, StorageError> {
        let guard = self.lock()?;
        let mut events: Vec<AttemptEvent> = guard.attempts_for(user_id).cloned().collect();
        events.sort_by(|a, b| {
            b.attempted_at
                .cmp(&a.attempted_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        events.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(events)
    }

    async fn admin_summaries(&self) -> Result<Vec<AdminUserSummary>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<AdminUserSummary> = guard
            .users
            .values()
            .map(|user| {
                let mut summary = AdminUserSummary {
                    user: user.clone(),
                    total_attempts: 0,
                    correct_attempts: 0,
                    last_attempt_at: None,
                };
                for event in guard.attempts_for(user.id) {
                    summary.total_attempts += 1;
                    if event.correct {
                        summary.correct_attempts += 1;
                    }
                    summary.last_attempt_at = summary.last_attempt_at.max(Some(event.attempted_at));
                }
                summary
            })
            .collect();
        out.sort_by(|a, b| {
            b.user
                .created_at
                .cmp(&a.user.created_at)
                .then_with(|| b.user.id.cmp(&a.user.id))
        });
        Ok(out)
    }
}

#[async_trait]
impl AttemptPersistence for InMemoryRepository {
    async fn record_attempt(
        &self,
        attempt: &NewAttempt,
        rule: MasteryRule,
    ) -> Result<RecordedAttempt, StorageError> {
        let mut guard = self.lock()?;
        guard.require_user(attempt.user_id)?;
        let attempt_id = guard.push_attempt(attempt);
        let progress = guard.bump_progress(
            attempt.user_id,
            &attempt.card_id,
            ProgressDelta::for_answer(attempt.correct),
            rule,
            attempt.attempted_at,
        );
        Ok(RecordedAttempt {
            attempt_id,
            progress,
        })
    }
}

#[async_trait]
impl ResumeRepository for InMemoryRepository {
    async fn upsert_topic_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
        next_card_id: Option<&CardId>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.require_user(user_id)?;
        guard.resumes.insert(
            (user_id, topic_id.clone()),
            TopicResume {
                next_card_id: next_card_id.cloned(),
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get_topic_resume(
        &self,
        user_id: UserId,
        topic_id: &TopicId,
    ) -> Result<Option<TopicResume>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.resumes.get(&(user_id, topic_id.clone())).cloned())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub recorder: Arc<dyn AttemptPersistence>,
    pub resumes: Arc<dyn ResumeRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository handle to one backend value.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: UserRepository
            + ProgressRepository
            + AttemptRepository
            + AttemptPersistence
            + ResumeRepository
            + Clone
            + 'static,
    {
        Self {
            users: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            recorder: Arc::new(repo.clone()),
            resumes: Arc::new(repo),
        }
    }
}
