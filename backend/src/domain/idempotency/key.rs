//! Client-supplied idempotency keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest accepted key.
pub const MAX_KEY_LEN: usize = 255;

/// Validation errors for [`IdempotencyKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyKeyValidationError {
    #[error("idempotency key must not be empty")]
    Empty,
    #[error("idempotency key must be at most {max} characters")]
    TooLong { max: usize },
    #[error("idempotency key must not contain whitespace or control characters")]
    InvalidCharacters,
}

/// Key sent by clients in the `Idempotency-Key` header.
///
/// Any printable token is accepted; UUIDs are the common case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate and construct a key.
    ///
    /// # Examples
    /// ```
    /// use lending::domain::idempotency::IdempotencyKey;
    ///
    /// let key = IdempotencyKey::new("550e8400-e29b-41d4-a716-446655440000").unwrap();
    /// assert_eq!(key.as_ref(), "550e8400-e29b-41d4-a716-446655440000");
    /// assert!(IdempotencyKey::new("two words").is_err());
    /// ```
    pub fn new(key: impl Into<String>) -> Result<Self, IdempotencyKeyValidationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(IdempotencyKeyValidationError::Empty);
        }
        if key.chars().count() > MAX_KEY_LEN {
            return Err(IdempotencyKeyValidationError::TooLong { max: MAX_KEY_LEN });
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdempotencyKeyValidationError::InvalidCharacters);
        }
        Ok(Self(key))
    }

    /// Generate a random key.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IdempotencyKey> for String {
    fn from(value: IdempotencyKey) -> Self {
        value.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = IdempotencyKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
