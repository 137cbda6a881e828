use std::sync::Arc;

use practice_core::{
    ProgressConfig,
    aggregate::{TopicCatalog, TopicCompletion, topic_completion},
    model::{
        AdminUserSummary, CardId, CardProgress, ChildProfile, Identity, ProgressMap, TopicId,
        User,
    },
    time::Clock,
};
use storage::repository::{ProgressRepository, Storage};

use crate::aggregation::{AdminOverview, AggregationEngine, Dashboard};
use crate::attempt_recorder::AttemptRecorder;
use crate::error::ProgressError;
use crate::identity::IdentityResolver;
use crate::resume_tracker::{ResumeTracker, SessionKind};

//
// ─── INPUTS ────────────────────────────────────────────────────────────────────
//

/// One answered card as submitted by a practice session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSubmission {
    pub card_id: CardId,
    pub topic_id: TopicId,
    pub correct: bool,
    /// Card the session moves on to; `None` once the topic is finished.
    pub next_card_id: Option<CardId>,
}

impl AnswerSubmission {
    /// Validate raw identifiers from the caller.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidInput` for blank or oversized ids.
    pub fn parse(
        card_id: &str,
        topic_id: &str,
        correct: bool,
        next_card_id: Option<&str>,
    ) -> Result<Self, ProgressError> {
        Ok(Self {
            card_id: CardId::new(card_id)?,
            topic_id: TopicId::new(topic_id)?,
            correct,
            next_card_id: next_card_id.map(CardId::new).transpose()?,
        })
    }
}

/// Raw onboarding answers; validated against the service clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingForm {
    pub child_name: String,
    pub birth_year: i32,
    pub school_name: Option<String>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Caller-facing entry point: resolves identities, then delegates to the
/// recorder, resume tracker and aggregation engine.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    config: ProgressConfig,
    identities: IdentityResolver,
    recorder: AttemptRecorder,
    resumes: ResumeTracker,
    aggregation: AggregationEngine,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage, config: ProgressConfig) -> Self {
        let identities = IdentityResolver::new(clock, Arc::clone(&storage.users));
        let recorder = AttemptRecorder::new(clock, Arc::clone(&storage.recorder))
            .with_rule(config.mastery_rule());
        let resumes = ResumeTracker::new(clock, Arc::clone(&storage.resumes));
        let aggregation = AggregationEngine::new(
            clock,
            config.clone(),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        );

        Self {
            clock,
            config,
            identities,
            recorder,
            resumes,
            aggregation,
            progress: storage.progress,
        }
    }

    #[must_use]
    pub fn aggregation(&self) -> &AggregationEngine {
        &self.aggregation
    }

    /// # Errors
    ///
    /// Returns `ProgressError::InvalidInput` for malformed identities.
    pub async fn sign_in(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<User, ProgressError> {
        self.identities.sign_in(identity, display_name).await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::InvalidInput` if the form fails validation and
    /// `ProgressError::NotFound` for unknown identities.
    pub async fn complete_onboarding(
        &self,
        identity: &Identity,
        form: &OnboardingForm,
    ) -> Result<User, ProgressError> {
        let profile = ChildProfile::new(
            &form.child_name,
            form.birth_year,
            form.school_name.as_deref(),
            self.clock.now(),
        )?;
        self.identities.complete_onboarding(identity, &profile).await
    }

    /// Record an answer and move the topic's resume pointer.
    ///
    /// The attempt and its progress row are written atomically. The resume
    /// pointer is written afterwards; if that write fails the attempt stays
    /// recorded and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities and
    /// `ProgressError::StorageUnavailable` on store failures.
    pub async fn record_answer(
        &self,
        identity: &Identity,
        answer: &AnswerSubmission,
    ) -> Result<CardProgress, ProgressError> {
        let user_id = self.identities.resolve(identity).await?;
        let progress = self
            .recorder
            .record_attempt(user_id, &answer.card_id, &answer.topic_id, answer.correct)
            .await?;
        self.resumes
            .set_resume(user_id, &answer.topic_id, answer.next_card_id.as_ref())
            .await?;
        Ok(progress)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn progress_map(&self, identity: &Identity) -> Result<ProgressMap, ProgressError> {
        let user_id = self.identities.resolve(identity).await?;
        Ok(self.progress.progress_map(user_id).await?)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn topic_resume(
        &self,
        identity: &Identity,
        topic_id: &TopicId,
    ) -> Result<Option<CardId>, ProgressError> {
        let user_id = self.identities.resolve(identity).await?;
        self.resumes.get_resume(user_id, topic_id).await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn start_position(
        &self,
        identity: &Identity,
        session: &SessionKind,
        sequence: &[CardId],
    ) -> Result<usize, ProgressError> {
        let user_id = self.identities.resolve(identity).await?;
        self.resumes.start_position(user_id, session, sequence).await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn needs_work(&self, identity: &Identity) -> Result<Vec<CardId>, ProgressError> {
        let user_id = self.identities.resolve(identity).await?;
        self.aggregation.needs_work(user_id).await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn dashboard(&self, identity: &Identity) -> Result<Dashboard, ProgressError> {
        let user_id = self.identities.resolve(identity).await?;
        self.aggregation.dashboard(user_id).await
    }

    /// Completion per catalog topic, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn topic_completion(
        &self,
        identity: &Identity,
        catalog: &[TopicCatalog],
    ) -> Result<Vec<TopicCompletion>, ProgressError> {
        let map = self.progress_map(identity).await?;
        Ok(topic_completion(catalog, &map))
    }

    /// Per-user totals for the admin view.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Forbidden` unless `requester` is an email
    /// identity on the configured admin list.
    pub async fn admin_summaries(
        &self,
        requester: &Identity,
    ) -> Result<Vec<AdminUserSummary>, ProgressError> {
        self.authorize_admin(requester)?;
        self.aggregation.admin_summaries().await
    }

    /// # Errors
    ///
    /// Same as [`ProgressService::admin_summaries`].
    pub async fn admin_overview(
        &self,
        requester: &Identity,
    ) -> Result<AdminOverview, ProgressError> {
        self.authorize_admin(requester)?;
        self.aggregation.admin_overview().await
    }

    fn authorize_admin(&self, requester: &Identity) -> Result<(), ProgressError> {
        match requester.normalized_email() {
            Some(email) if self.config.is_admin_email(&email) => Ok(()),
            _ => {
                tracing::warn!("admin view requested by non-admin identity");
                Err(ProgressError::Forbidden)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::time::fixed_now;

    fn service() -> ProgressService {
        ProgressService::new(
            Clock::fixed(fixed_now()),
            Storage::in_memory(),
            ProgressConfig::default().with_admin_email("boss@example.com"),
        )
    }

    #[test]
    fn answer_submission_rejects_blank_ids() {
        let err = AnswerSubmission::parse("  ", "algebra", true, None).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidInput(_)));

        let err = AnswerSubmission::parse("c1", "algebra", true, Some("")).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidInput(_)));

        let ok = AnswerSubmission::parse("c1", "algebra", false, Some("c2")).unwrap();
        assert_eq!(ok.next_card_id, Some(CardId::new("c2").unwrap()));
    }

    #[tokio::test]
    async fn record_answer_requires_signed_in_user() {
        let svc = service();
        let answer = AnswerSubmission::parse("c1", "algebra", true, None).unwrap();
        let err = svc
            .record_answer(&Identity::email("ghost@example.com"), &answer)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotFound("user")));
    }

    #[tokio::test]
    async fn record_answer_moves_resume_pointer() {
        let svc = service();
        let kid = Identity::email("kid@example.com");
        svc.sign_in(&kid, "Kid").await.unwrap();

        let algebra = TopicId::new("algebra").unwrap();
        let answer = AnswerSubmission::parse("c1", "algebra", true, Some("c2")).unwrap();
        svc.record_answer(&kid, &answer).await.unwrap();
        assert_eq!(
            svc.topic_resume(&kid, &algebra).await.unwrap(),
            Some(CardId::new("c2").unwrap())
        );

        let last = AnswerSubmission::parse("c2", "algebra", true, None).unwrap();
        svc.record_answer(&kid, &last).await.unwrap();
        assert_eq!(svc.topic_resume(&kid, &algebra).await.unwrap(), None);
    }

    #[tokio::test]
    async fn onboarding_form_is_validated() {
        let svc = service();
        let kid = Identity::email("kid@example.com");
        svc.sign_in(&kid, "Kid").await.unwrap();

        let form = OnboardingForm {
            child_name: "Ada".into(),
            birth_year: 1850,
            school_name: None,
        };
        let err = svc.complete_onboarding(&kid, &form).await.unwrap_err();
        assert!(matches!(err, ProgressError::InvalidInput(_)));

        let form = OnboardingForm {
            birth_year: 2015,
            ..form
        };
        assert!(svc.complete_onboarding(&kid, &form).await.unwrap().onboarded);
    }

    #[tokio::test]
    async fn admin_views_are_restricted() {
        let svc = service();
        svc.sign_in(&Identity::email("kid@example.com"), "Kid")
            .await
            .unwrap();

        let err = svc
            .admin_summaries(&Identity::email("kid@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Forbidden));

        let err = svc
            .admin_summaries(&Identity::legacy("boss", "1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Forbidden));

        let rows = svc
            .admin_summaries(&Identity::email("Boss@Example.com"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
