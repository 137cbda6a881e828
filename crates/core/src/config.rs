use serde::Deserialize;
use thiserror::Error;

use crate::mastery::{MASTERY_THRESHOLD, MasteryRule};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {raw:?}")]
    InvalidNumber { key: &'static str, raw: String },

    #[error("{key} must be > 0")]
    Zero { key: &'static str },
}

pub const DEFAULT_DAILY_GOAL: u32 = 10;
pub const DEFAULT_RECENT_FEED_LIMIT: u32 = 8;
pub const DEFAULT_PRACTICE_DATES_LIMIT: u32 = 60;

/// Tunables for progress tracking and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub mastery_threshold: u32,
    pub daily_goal_target: u32,
    pub recent_feed_limit: u32,
    /// Distinct days loaded per page when walking a streak back.
    pub practice_dates_limit: u32,
    pub admin_emails: Vec<String>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mastery_threshold: MASTERY_THRESHOLD,
            daily_goal_target: DEFAULT_DAILY_GOAL,
            recent_feed_limit: DEFAULT_RECENT_FEED_LIMIT,
            practice_dates_limit: DEFAULT_PRACTICE_DATES_LIMIT,
            admin_emails: Vec::new(),
        }
    }
}

impl ProgressConfig {
    /// Builds a config from `PRACTICE_*` environment variables, falling back
    /// to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let number = |key: &'static str, default: u32| -> Result<u32, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidNumber { key, raw: raw.clone() }),
            }
        };

        let config = Self {
            mastery_threshold: number("PRACTICE_MASTERY_THRESHOLD", defaults.mastery_threshold)?,
            daily_goal_target: number("PRACTICE_DAILY_GOAL", defaults.daily_goal_target)?,
            recent_feed_limit: number("PRACTICE_RECENT_LIMIT", defaults.recent_feed_limit)?,
            practice_dates_limit: number("PRACTICE_DATES_LIMIT", defaults.practice_dates_limit)?,
            admin_emails: lookup("PRACTICE_ADMIN_EMAILS")
                .map(|raw| parse_admin_emails(&raw))
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Zero` for a zero threshold or zero limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mastery_threshold == 0 {
            return Err(ConfigError::Zero {
                key: "mastery_threshold",
            });
        }
        if self.recent_feed_limit == 0 {
            return Err(ConfigError::Zero {
                key: "recent_feed_limit",
            });
        }
        if self.practice_dates_limit == 0 {
            return Err(ConfigError::Zero {
                key: "practice_dates_limit",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_mastery_threshold(mut self, threshold: u32) -> Self {
        self.mastery_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_daily_goal(mut self, target: u32) -> Self {
        self.daily_goal_target = target;
        self
    }

    #[must_use]
    pub fn with_practice_dates_limit(mut self, limit: u32) -> Self {
        self.practice_dates_limit = limit;
        self
    }

    #[must_use]
    pub fn with_admin_email(mut self, email: &str) -> Self {
        self.admin_emails.extend(parse_admin_emails(email));
        self
    }

    #[must_use]
    pub fn mastery_rule(&self) -> MasteryRule {
        MasteryRule::new(self.mastery_threshold)
    }

    /// Case-insensitive membership check against the admin list.
    #[must_use]
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

fn parse_admin_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
