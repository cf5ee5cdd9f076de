//! Tests for domain error construction and serialisation.

use std::time::Duration;

use super::*;
use rstest::{fixture, rstest};
use serde_json::json;

const TRACE_ID: &str = "00000000-0000-0000-0000-000000000000";

#[fixture]
fn base_error() -> Error {
    Error::invalid_request("bad")
}

#[rstest]
fn invalid_request_constructor_sets_code(base_error: Error) {
    assert_eq!(base_error.code(), ErrorCode::InvalidRequest);
    assert_eq!(base_error.message(), "bad");
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert_eq!(result, Err(ErrorValidationError::EmptyMessage));
}

#[rstest]
fn new_substitutes_blank_messages() {
    let error = Error::new(ErrorCode::Conflict, " ");
    assert_eq!(error.message(), "unspecified error");
}

#[rstest]
fn new_returns_none_when_trace_id_out_of_scope() {
    let error = Error::internal("boom");
    assert!(error.trace_id().is_none());
}

#[tokio::test]
async fn new_captures_scoped_trace_id() {
    let trace_id: TraceId = TRACE_ID.parse().expect("valid uuid");
    let error = TraceId::scope(trace_id, async { Error::conflict("dup") }).await;
    assert_eq!(error.trace_id(), Some(TRACE_ID));
}

#[rstest]
fn validation_lists_every_field() {
    let error = Error::validation(vec![
        FieldViolation::new("email", "already registered"),
        FieldViolation::new("nis", "already registered"),
    ]);
    assert_eq!(
        error.details(),
        Some(&json!({
            "fields": [
                { "field": "email", "reason": "already registered" },
                { "field": "nis", "reason": "already registered" }
            ]
        }))
    );
}

#[rstest]
#[case(Duration::from_millis(1), 1)]
#[case(Duration::from_secs(0), 1)]
#[case(Duration::from_millis(1500), 2)]
#[case(Duration::from_secs(30), 30)]
fn retry_after_rounds_up_to_whole_seconds(#[case] wait: Duration, #[case] expected: u64) {
    assert_eq!(retry_after_seconds(wait), expected);
}

#[rstest]
fn rate_limited_keeps_wait_out_of_the_payload() {
    let error = Error::rate_limited(Duration::from_secs(12));
    assert_eq!(error.retry_after(), Some(Duration::from_secs(12)));
    let value = serde_json::to_value(&error).expect("serialise");
    assert_eq!(value["code"], "rate_limited");
    assert_eq!(value["details"]["retryAfterSeconds"], 12);
    assert!(value.get("retryAfter").is_none());
}

#[rstest]
fn serialises_camel_case_with_trace_id(base_error: Error) {
    let value = serde_json::to_value(base_error.with_trace_id(TRACE_ID)).expect("serialise");
    assert_eq!(
        value,
        json!({ "code": "invalid_request", "message": "bad", "traceId": TRACE_ID })
    );
}
