//! callscope: transparent call instrumentation
//!
//! Wrap callables and objects so every call reports `call`, `call_resolved`
//! or `call_rejected` events with wall-clock timing, without touching the
//! call sites.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use callscope::prelude::*;
//!
//! # async fn run() -> callscope::core::Result<()> {
//! let instrumentation = Instrumentation::new()?;
//! instrumentation.events().on(EventKind::CallResolved, |event| {
//!     println!("{} took {:?}ms", event.name(), event.elapsed_ms());
//! });
//!
//! let add = instrumentation.track_fn_named("add", |a: i32, b: i32| a + b);
//! assert_eq!(add.call((2, 3)), 5);
//! instrumentation.events().flush().await;
//! # Ok(())
//! # }
//! ```

pub use callscope_core as core;

/// Prelude module for common imports.
pub mod prelude {
    pub use callscope_core::{
        CallEvent, Deferred, EventChannel, EventKind, InstrumentError, InstrumentedObject,
        Instrumentation, InstrumentationConfig, Method, Object, Property, Record, Reply, Target,
        Tracked, TrackedFn, TrackingOptions,
    };
}
