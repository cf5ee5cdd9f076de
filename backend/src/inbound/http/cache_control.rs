//! Cache-control policies for HTTP responses.

/// Responses carrying credentials or per-user data must never be stored.
pub const NO_STORE: &str = "no-store";

/// Header tuple for [`NO_STORE`].
pub const fn no_store_header() -> (&'static str, &'static str) {
    ("Cache-Control", NO_STORE)
}
