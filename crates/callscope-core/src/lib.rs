// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # callscope-core
//!
//! Transparent call instrumentation. Wrapped callables and objects behave
//! exactly like the originals while lifecycle events and wall-clock timing are
//! published on a side channel.
//!
//! - [`Instrumentation`] is the entry point: `track`, `track_fn`,
//!   `track_object` and `events`
//! - [`TrackedFn`] wraps a typed callable of up to eight arguments;
//!   `call_async` covers callables that return a future
//! - [`InstrumentedObject`] wraps an [`Object`], instrumenting its methods on
//!   first read and caching the wrappers
//! - [`EventChannel`] delivers [`CallEvent`]s to listeners on a dispatcher task
//! - [`Outcome`] decides whether a return value settles now or later
//!
//! ## Example
//!
//! ```rust,ignore
//! use callscope_core::{EventKind, Instrumentation};
//!
//! let instrumentation = Instrumentation::new()?;
//! instrumentation.events().on(EventKind::CallResolved, |event| {
//!     println!("{} took {:?}ms", event.name(), event.elapsed_ms());
//! });
//!
//! let add = instrumentation.track_fn_named("add", |a: i32, b: i32| a + b);
//! assert_eq!(add.call((2, 3)), 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Allow significant_drop_tightening - noisy for short parking_lot guard scopes
#![allow(clippy::significant_drop_tightening)]

pub mod callable;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod instrumentation;
pub mod object;
pub mod outcome;

pub use callable::{Callable, TrackedFn, declared_name};
pub use clock::{Clock, ElapsedReader, ManualClock, MonotonicClock};
pub use config::InstrumentationConfig;
pub use error::{InstrumentError, Result};
pub use events::{CallEvent, DispatchOptions, EventChannel, EventKind, Listener, ListenerId};
pub use instrumentation::{Instrumentation, Target, Tracked, TrackingOptions};
pub use object::{Args, BoxFuture, InstrumentedObject, Method, Object, Property, Record, Reply};
pub use outcome::{Completion, Deferred, InstrumentedFuture, Outcome};
