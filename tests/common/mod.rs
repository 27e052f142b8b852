//! Common test utilities for tracefs integration tests.

pub mod fake_tracefs;
#[allow(unused_imports)]
pub use fake_tracefs::FakeTracefs;
