//! Test doubles shared by unit tests (in `src/`) and integration tests (in
//! `tests/`). Compiled for `cfg(test)` and the `test-support` feature.

mod admin;
mod cache;
mod catalogue;
mod clock;
mod harness;
mod ledger;
mod students;

pub use admin::InMemoryAdmin;
pub use cache::InMemorySharedCache;
pub use catalogue::InMemoryCatalogue;
pub use clock::MutableClock;
pub use harness::TestHarness;
pub use ledger::InMemoryLedger;
pub use students::{InMemoryStudents, PlainPasswordHasher};
