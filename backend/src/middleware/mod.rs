//! Request middleware: tracing, rate limiting, deadlines and the panic
//! boundary.

pub mod deadline;
pub mod error_boundary;
pub mod rate_limit;
pub mod trace;

pub use deadline::Deadline;
pub use error_boundary::ErrorBoundary;
pub use rate_limit::RateLimit;
pub use trace::Trace;
