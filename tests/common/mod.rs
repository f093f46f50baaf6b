#![allow(dead_code)]

pub use execlane_test_utils::builders::{NodeConfigBuilder, TestEngine};
pub use execlane_test_utils::recorders::{FakeHandler, RecordingSink, RecordingStatus};
pub use execlane_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
