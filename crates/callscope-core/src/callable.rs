//! Single-callable instrumentation.
//!
//! [`TrackedFn`] decorates any closure or function of up to eight arguments.
//! Arguments are passed as a tuple:
//!
//! ```rust,ignore
//! let add = instrumentation.track_fn_named("add", |a: i32, b: i32| a + b);
//! assert_eq!(add.call((2, 3)), 5);
//! ```
//!
//! Per invocation the wrapper starts the clock, publishes `Call`, runs the
//! callable, then settles through [`Outcome`]. A panic inside the callable
//! publishes `CallRejected` and resumes unwinding with the original payload.
//! [`TrackedFn::call_async`] does the same for callables returning a future
//! and settles when that future completes.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;

use crate::clock::Clock;
use crate::events::{CallEvent, EventChannel};
use crate::outcome::{Completion, InstrumentedFuture, Outcome};

/// Anything that can be invoked with an argument tuple.
///
/// Implemented for every `Fn` of arity 0 through 8.
pub trait Callable<Args> {
    /// Return type.
    type Output;

    /// Invokes the callable.
    fn invoke(&self, args: Args) -> Self::Output;
}

macro_rules! impl_callable {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg,)*> Callable<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Ret,
        {
            type Output = Ret;

            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> Ret {
                (self)($($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A1);
impl_callable!(A1, A2);
impl_callable!(A1, A2, A3);
impl_callable!(A1, A2, A3, A4);
impl_callable!(A1, A2, A3, A4, A5);
impl_callable!(A1, A2, A3, A4, A5, A6);
impl_callable!(A1, A2, A3, A4, A5, A6, A7);
impl_callable!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Returns the declared name of a function type.
///
/// The last path segment of the type name, skipping closure markers, so
/// `app::handlers::get_user` gives `get_user` and a closure defined in
/// `app::main` gives `main`.
#[must_use]
pub fn declared_name<F: ?Sized>() -> &'static str {
    let full = std::any::type_name::<F>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with("{{"))
        .unwrap_or(full)
}

/// An instrumented callable.
pub struct TrackedFn<F> {
    func: F,
    name: Arc<str>,
    clock: Arc<dyn Clock>,
    events: EventChannel,
}

impl<F> TrackedFn<F> {
    /// Wraps `func`, reporting under `name` on `events`.
    pub fn new(
        func: F,
        name: impl Into<Arc<str>>,
        clock: Arc<dyn Clock>,
        events: EventChannel,
    ) -> Self {
        Self {
            func,
            name: name.into(),
            clock,
            events,
        }
    }

    /// Replaces the clock used to time invocations.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the name events are published under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the wrapped callable.
    #[must_use]
    pub const fn inner(&self) -> &F {
        &self.func
    }

    /// Invokes the wrapped callable with an argument tuple.
    pub fn call<Args>(&self, args: Args) -> <F::Output as Outcome>::Observed
    where
        F: Callable<Args>,
        F::Output: Outcome,
    {
        let (result, completion) = self.begin(args);
        result.observe(completion)
    }

    /// Invokes a callable that returns a future, settling when it completes.
    ///
    /// Covers `async fn` items, closures returning `async` blocks, and any
    /// other future type such as a `JoinHandle` or a oneshot receiver. The
    /// future's output is classified like a synchronous return value.
    pub fn call_async<Args>(&self, args: Args) -> InstrumentedFuture<F::Output>
    where
        F: Callable<Args>,
        F::Output: Future,
        <F::Output as Future>::Output: Outcome,
    {
        let (future, completion) = self.begin(args);
        completion.defer(future)
    }

    fn begin<Args>(&self, args: Args) -> (F::Output, Completion)
    where
        F: Callable<Args>,
    {
        let reader = self.clock.start();
        self.events.publish(CallEvent::call(Arc::clone(&self.name)));

        match catch_unwind(AssertUnwindSafe(|| self.func.invoke(args))) {
            Ok(result) => (
                result,
                Completion::new(Arc::clone(&self.name), reader, self.events.clone()),
            ),
            Err(payload) => {
                self.events
                    .publish(CallEvent::rejected(Arc::clone(&self.name), reader.read()));
                resume_unwind(payload)
            }
        }
    }
}

impl<F: Clone> Clone for TrackedFn<F> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            name: Arc::clone(&self.name),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
        }
    }
}

impl<F> fmt::Debug for TrackedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedFn")
            .field("name", &self.name)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
