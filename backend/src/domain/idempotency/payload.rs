//! Canonical payload fingerprints.
//!
//! Retries of the same request must fingerprint identically even when a
//! client reorders JSON keys, so objects are sorted recursively before the
//! compact serialization is hashed with SHA-256.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Errors raised while fingerprinting a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadHashError {
    #[error("failed to serialise canonical JSON payload: {message}")]
    Serialization { message: String },
}

/// SHA-256 digest of a canonical request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadHash([u8; 32]);

impl PayloadHash {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Fingerprint any serializable request body.
    pub fn of<T: Serialize>(payload: &T) -> Result<Self, PayloadHashError> {
        let value = serde_json::to_value(payload).map_err(|err| PayloadHashError::Serialization {
            message: err.to_string(),
        })?;
        canonicalize_and_hash(&value)
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonicalize a JSON value and compute its SHA-256 digest.
///
/// # Examples
/// ```
/// use lending::domain::idempotency::canonicalize_and_hash;
/// use serde_json::json;
///
/// let a = canonicalize_and_hash(&json!({"b": 2, "a": 1})).unwrap();
/// let b = canonicalize_and_hash(&json!({"a": 1, "b": 2})).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn canonicalize_and_hash(value: &Value) -> Result<PayloadHash, PayloadHashError> {
    let bytes = serde_json::to_vec(&canonicalize(value)).map_err(|err| {
        PayloadHashError::Serialization {
            message: err.to_string(),
        }
    })?;
    Ok(PayloadHash::from_bytes(Sha256::digest(&bytes).into()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
