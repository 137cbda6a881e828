use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest catalog identifier accepted for cards and topics.
pub const MAX_CATALOG_ID_LEN: usize = 128;

/// Errors produced when constructing catalog identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} exceeds {MAX_CATALOG_ID_LEN} characters")]
    TooLong { kind: &'static str },
}

fn validate_catalog_id(kind: &'static str, raw: String) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if trimmed.chars().count() > MAX_CATALOG_ID_LEN {
        return Err(IdError::TooLong { kind });
    }
    if trimmed.len() == raw.len() {
        Ok(raw)
    } else {
        Ok(trimmed.to_owned())
    }
}

/// Internal identifier for a user, assigned by storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Creates a new `UserId`
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Identifier of a flashcard in the static catalog.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardId(String);

impl CardId {
    /// Creates a `CardId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if the identifier is blank or too long.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        validate_catalog_id("card id", raw.into()).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a topic (curriculum unit) in the static catalog.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicId(String);

impl TopicId {
    /// Creates a `TopicId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if the identifier is blank or too long.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        validate_catalog_id("topic id", raw.into()).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Debug for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardId({:?})", self.0)
    }
}

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId({:?})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Conversions ───────────────────────────────────────────────────────────────

impl TryFrom<String> for CardId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CardId> for String {
    fn from(id: CardId) -> Self {
        id.0
    }
}

impl TryFrom<String> for TopicId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TopicId> for String {
    fn from(id: TopicId) -> Self {
        id.0
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_displays_raw_value() {
        let id = UserId::new(123);
        assert_eq!(id.value(), 123);
        assert_eq!(id.to_string(), "123");
        assert_eq!(format!("{id:?}"), "UserId(123)");
    }

    #[test]
    fn card_id_trims_whitespace() {
        let id = CardId::new("  ns-1 ").unwrap();
        assert_eq!(id.as_str(), "ns-1");
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert_eq!(
            CardId::new("   ").unwrap_err(),
            IdError::Empty { kind: "card id" }
        );
        assert_eq!(
            TopicId::new("").unwrap_err(),
            IdError::Empty { kind: "topic id" }
        );
    }

    #[test]
    fn oversized_ids_are_rejected() {
        let raw = "x".repeat(MAX_CATALOG_ID_LEN + 1);
        assert!(matches!(
            TopicId::new(raw).unwrap_err(),
            IdError::TooLong { .. }
        ));
    }

    #[test]
    fn catalog_ids_deserialize_through_validation() {
        let id: CardId = serde_json::from_str("\"alg-3\"").unwrap();
        assert_eq!(id.as_str(), "alg-3");
        assert!(serde_json::from_str::<CardId>("\"  \"").is_err());
    }
}
