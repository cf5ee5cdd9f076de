//! `Idempotency-Key` header parsing.

use actix_web::http::header::HeaderMap;

use crate::domain::Error;
use crate::domain::idempotency::{
    IDEMPOTENCY_KEY_HEADER, IdempotencyKey, IdempotencyKeyValidationError,
};

/// Extract the mandatory idempotency key.
pub fn require_idempotency_key(headers: &HeaderMap) -> Result<IdempotencyKey, Error> {
    let value = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .ok_or_else(|| Error::invalid_request("Idempotency-Key header is required"))?;
    let raw = value
        .to_str()
        .map_err(|_| map_idempotency_key_error(IdempotencyKeyValidationError::InvalidCharacters))?;
    IdempotencyKey::new(raw).map_err(map_idempotency_key_error)
}

fn map_idempotency_key_error(err: IdempotencyKeyValidationError) -> Error {
    match err {
        IdempotencyKeyValidationError::Empty => {
            Error::invalid_request("Idempotency-Key header must not be empty")
        }
        IdempotencyKeyValidationError::TooLong { max } => Error::invalid_request(format!(
            "Idempotency-Key header must be at most {max} characters"
        )),
        IdempotencyKeyValidationError::InvalidCharacters => Error::invalid_request(
            "Idempotency-Key header must not contain whitespace or control characters",
        ),
    }
}
