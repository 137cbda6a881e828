use std::sync::Arc;

use practice_core::{
    model::{ChildProfile, Identity, User, UserId},
    time::Clock,
};
use storage::repository::UserRepository;

use crate::error::ProgressError;

/// Maps external identities (email or legacy name + PIN) onto stored users.
#[derive(Clone)]
pub struct IdentityResolver {
    clock: Clock,
    users: Arc<dyn UserRepository>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(clock: Clock, users: Arc<dyn UserRepository>) -> Self {
        Self { clock, users }
    }

    /// Fetch the user for `identity`, creating it on first sign-in.
    ///
    /// A blank `display_name` falls back to one derived from the identity.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidInput` for a malformed identity and
    /// `ProgressError::StorageUnavailable` on store failures.
    pub async fn sign_in(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<User, ProgressError> {
        let key = identity.key()?;
        let display_name = match display_name.trim() {
            "" => identity.fallback_display_name(),
            name => name.to_owned(),
        };
        let user = self
            .users
            .get_or_create_user(&key, &display_name, self.clock.now())
            .await?;
        tracing::debug!(user_id = %user.id, onboarded = user.onboarded, "signed in");
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` if no user has signed in with
    /// `identity` yet.
    pub async fn user(&self, identity: &Identity) -> Result<User, ProgressError> {
        let key = identity.key()?;
        self.users
            .find_user(&key)
            .await?
            .ok_or(ProgressError::NotFound("user"))
    }

    /// Internal id for `identity`.
    ///
    /// # Errors
    ///
    /// Same as [`IdentityResolver::user`].
    pub async fn resolve(&self, identity: &Identity) -> Result<UserId, ProgressError> {
        Ok(self.user(identity).await?.id)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for unknown identities.
    pub async fn complete_onboarding(
        &self,
        identity: &Identity,
        profile: &ChildProfile,
    ) -> Result<User, ProgressError> {
        let user_id = self.resolve(identity).await?;
        let user = self
            .users
            .complete_onboarding(user_id, profile, self.clock.now())
            .await?;
        tracing::info!(%user_id, "onboarding completed");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(Clock::fixed(fixed_now()), Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn email_case_variants_resolve_to_one_user() {
        let ids = resolver();
        let a = ids
            .sign_in(&Identity::email("Parent@Example.com"), "Parent")
            .await
            .unwrap();
        let b = ids
            .sign_in(&Identity::email(" parent@example.com"), "")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.display_name, "Parent");
    }

    #[tokio::test]
    async fn legacy_and_email_identities_are_distinct_users() {
        let ids = resolver();
        let legacy = ids
            .sign_in(&Identity::legacy("Sam", "1234"), "")
            .await
            .unwrap();
        let email = ids
            .sign_in(&Identity::email("sam@example.com"), "")
            .await
            .unwrap();
        assert_ne!(legacy.id, email.id);
        assert_eq!(legacy.display_name, "Sam");
        assert_eq!(email.display_name, "sam");
    }

    #[tokio::test]
    async fn resolving_unknown_identity_is_not_found() {
        let err = resolver()
            .resolve(&Identity::email("ghost@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotFound("user")));
    }

    #[tokio::test]
    async fn malformed_identity_is_invalid_input() {
        let err = resolver()
            .sign_in(&Identity::legacy("Sam", "12a4"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn onboarding_marks_user() {
        let ids = resolver();
        let identity = Identity::email("parent@example.com");
        ids.sign_in(&identity, "Parent").await.unwrap();

        let profile = ChildProfile::new("Ada", 2016, Some("  "), fixed_now()).unwrap();
        let user = ids.complete_onboarding(&identity, &profile).await.unwrap();
        assert!(user.onboarded);
        assert_eq!(user.profile.unwrap().school_name, None);
    }
}
