//! Result classification: immediate versus deferred, success versus failure.
//!
//! Every value returned through an instrumented callable goes through
//! [`Outcome::observe`], which receives the invocation's [`Completion`] and
//! must settle it exactly once:
//!
//! - immediate values resolve on the spot and are handed back unchanged;
//! - `Result::Err` rejects; `Ok` delegates to the inner value, so an
//!   `Ok(future)` is still treated as deferred;
//! - future-shaped values ([`Deferred`], `Pin<Box<F>>`, `Box<F>` for an
//!   `Unpin` future) are wrapped in an
//!   [`InstrumentedFuture`] that settles when the inner future completes, by
//!   classifying the future's output the same way.
//!
//! A value is deferred only if its type says so. An unrelated field or method
//! that merely looks like a continuation hook is never mistaken for one.
//!
//! Custom immediate types opt in with [`immediate_outcome!`](crate::immediate_outcome).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project::pin_project;

use crate::clock::ElapsedReader;
use crate::events::{CallEvent, EventChannel};

/// The pending completion of one invocation.
///
/// Consumed by [`resolve`](Self::resolve), [`reject`](Self::reject) or
/// [`defer`](Self::defer), so an invocation can settle at most once.
#[derive(Debug)]
pub struct Completion {
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    name: Arc<str>,
    reader: ElapsedReader,
    events: EventChannel,
}

impl Completion {
    pub(crate) fn new(name: Arc<str>, reader: ElapsedReader, events: EventChannel) -> Self {
        Self {
            pending: Some(Pending {
                name,
                reader,
                events,
            }),
        }
    }

    /// A completion that publishes nothing.
    pub(crate) const fn detached() -> Self {
        Self { pending: None }
    }

    /// Returns the tracked name, if this completion will publish.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.name.as_ref())
    }

    /// Publishes `CallResolved` with the elapsed time.
    pub fn resolve(self) {
        if let Some(p) = self.pending {
            p.events.publish(CallEvent::resolved(p.name, p.reader.read()));
        }
    }

    /// Publishes `CallRejected` with the elapsed time.
    pub fn reject(self) {
        if let Some(p) = self.pending {
            p.events.publish(CallEvent::rejected(p.name, p.reader.read()));
        }
    }

    /// Hands the completion to a future; it settles when the future does.
    pub fn defer<F>(self, inner: F) -> InstrumentedFuture<F>
    where
        F: Future,
        F::Output: Outcome,
    {
        InstrumentedFuture {
            inner,
            completion: Some(self),
        }
    }
}

/// A value whose completion can be observed.
pub trait Outcome: Sized {
    /// What the caller receives in place of `Self`.
    type Observed;

    /// Settles `completion` (now or later) and returns the caller's value.
    fn observe(self, completion: Completion) -> Self::Observed;
}

/// Implements [`Outcome`] for types that are complete as soon as they exist.
///
/// ```rust,ignore
/// struct Row { id: u64 }
/// callscope_core::immediate_outcome!(Row);
/// ```
#[macro_export]
macro_rules! immediate_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::Outcome for $ty {
                type Observed = Self;

                fn observe(self, completion: $crate::Completion) -> Self {
                    completion.resolve();
                    self
                }
            }
        )*
    };
}

immediate_outcome!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    serde_json::Value,
);

macro_rules! immediate_outcome_generic {
    ($($ty:ident < $($param:ident),+ >),* $(,)?) => {
        $(
            impl<$($param),+> Outcome for $ty<$($param),+> {
                type Observed = Self;

                fn observe(self, completion: Completion) -> Self {
                    completion.resolve();
                    self
                }
            }
        )*
    };
}

immediate_outcome_generic!(
    Option<T>,
    Vec<T>,
    VecDeque<T>,
    HashSet<T, S>,
    HashMap<K, V, S>,
    BTreeMap<K, V>,
);

macro_rules! immediate_outcome_tuple {
    ($(($($param:ident),+)),* $(,)?) => {
        $(
            impl<$($param),+> Outcome for ($($param,)+) {
                type Observed = Self;

                fn observe(self, completion: Completion) -> Self {
                    completion.resolve();
                    self
                }
            }
        )*
    };
}

immediate_outcome_tuple!(
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
    (A, B, C, D, E),
    (A, B, C, D, E, F),
    (A, B, C, D, E, F, G),
    (A, B, C, D, E, F, G, H),
);

impl<T: ?Sized> Outcome for &T {
    type Observed = Self;

    fn observe(self, completion: Completion) -> Self {
        completion.resolve();
        self
    }
}

impl<T: ?Sized> Outcome for Arc<T> {
    type Observed = Self;

    fn observe(self, completion: Completion) -> Self {
        completion.resolve();
        self
    }
}

impl<T: Outcome, E> Outcome for Result<T, E> {
    type Observed = Result<T::Observed, E>;

    fn observe(self, completion: Completion) -> Self::Observed {
        match self {
            Ok(value) => Ok(value.observe(completion)),
            Err(err) => {
                completion.reject();
                Err(err)
            }
        }
    }
}

impl<F> Outcome for Pin<Box<F>>
where
    F: Future + ?Sized,
    F::Output: Outcome,
{
    type Observed = InstrumentedFuture<Self>;

    fn observe(self, completion: Completion) -> Self::Observed {
        completion.defer(self)
    }
}

impl<F> Outcome for Box<F>
where
    F: Future + Unpin + ?Sized,
    F::Output: Outcome,
{
    type Observed = InstrumentedFuture<Self>;

    fn observe(self, completion: Completion) -> Self::Observed {
        completion.defer(self)
    }
}

/// Marks a future as a deferred result.
///
/// Return `Deferred(async { .. })` from a callable so the instrumented
/// version reports completion when the future settles. Uninstrumented,
/// `Deferred` is just the future it holds.
#[pin_project]
#[derive(Debug)]
pub struct Deferred<F>(#[pin] pub F);

impl<F: Future> Future for Deferred<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().0.poll(cx)
    }
}

impl<F> Outcome for Deferred<F>
where
    F: Future,
    F::Output: Outcome,
{
    type Observed = InstrumentedFuture<F>;

    fn observe(self, completion: Completion) -> Self::Observed {
        completion.defer(self.0)
    }
}

/// A future that settles its invocation's completion when it finishes.
///
/// Yields exactly what the inner future yields. A panic while polling the
/// inner future publishes `CallRejected` and keeps unwinding with the
/// original payload. Dropping it before completion publishes nothing.
#[pin_project]
#[derive(Debug)]
pub struct InstrumentedFuture<F> {
    #[pin]
    inner: F,
    completion: Option<Completion>,
}

impl<F> Future for InstrumentedFuture<F>
where
    F: Future,
    F::Output: Outcome,
{
    type Output = <F::Output as Outcome>::Observed;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let inner = this.inner;

        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => {
                let completion = this.completion.take().unwrap_or_else(Completion::detached);
                Poll::Ready(output.observe(completion))
            }
            Err(payload) => {
                if let Some(completion) = this.completion.take() {
                    completion.reject();
                }
                resume_unwind(payload)
            }
        }
    }
}
