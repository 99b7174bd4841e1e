// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # callscope-test
//!
//! Testing infrastructure for callscope.
//!
//! This crate provides:
//! - **Event recorder**: captures every event delivered on a channel
//! - **Mock objects**: dynamic objects with read and call counters
//! - **Falsification tests**: attempts to refute the instrumentation's claims
//!
//! ## Example
//!
//! ```rust,ignore
//! use callscope_core::Instrumentation;
//! use callscope_test::{EventRecorder, MockObject};
//!
//! let instrumentation = Instrumentation::new()?;
//! let recorder = EventRecorder::attach(instrumentation.events());
//! let mock = MockObject::new().with_method("foo", |_| Ok("foo".into()));
//!
//! let object = instrumentation.track_object("test", mock.into_shared())?;
//! object.call("foo", vec![])??;
//! assert_eq!(recorder.flush_and_take().await.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mock;
pub mod recorder;

pub use error::{Result, TestError};
pub use mock::MockObject;
pub use recorder::EventRecorder;

/// Installs a `tracing` subscriber for tests, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
