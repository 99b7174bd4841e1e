//! Mock objects for instrumentation tests.
//!
//! A [`MockObject`] is a [`Record`] that counts property reads and method
//! invocations, so tests can check that instrumentation forwards to the
//! original exactly once per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use callscope_core::{Args, Method, Object, Property, Record};
use serde_json::Value;

/// A dynamic object with call and read counters.
#[derive(Debug, Default)]
pub struct MockObject {
    record: Record,
    reads: AtomicUsize,
    calls: HashMap<String, Arc<AtomicUsize>>,
}

impl MockObject {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain value.
    #[must_use]
    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.record = self.record.with_value(key, value);
        self
    }

    /// Adds a method that answers immediately.
    #[must_use]
    pub fn with_method(
        self,
        key: &str,
        func: impl Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let method = Method::immediate(func);
        self.counted(key, method)
    }

    /// Adds a method that answers after `delay`.
    #[must_use]
    pub fn with_async_method(
        self,
        key: &str,
        delay: Duration,
        func: impl Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let func = Arc::new(func);
        let method = Method::deferred(move |args| {
            let func = Arc::clone(&func);
            async move {
                tokio::time::sleep(delay).await;
                func(args)
            }
        });
        self.counted(key, method)
    }

    /// Adds a method that always fails with `message`.
    #[must_use]
    pub fn with_failing_method(self, key: &str, message: &str) -> Self {
        let message = message.to_string();
        self.with_method(key, move |_| Err(anyhow::anyhow!(message.clone())))
    }

    /// Adds a method that fails with `message` after `delay`.
    #[must_use]
    pub fn with_async_failing_method(self, key: &str, delay: Duration, message: &str) -> Self {
        let message = message.to_string();
        self.with_async_method(key, delay, move |_| Err(anyhow::anyhow!(message.clone())))
    }

    /// Adds a method that panics with `message`.
    #[must_use]
    pub fn with_panicking_method(self, key: &str, message: &'static str) -> Self {
        self.counted(
            key,
            Method::new(move |_| std::panic::panic_any(message)),
        )
    }

    /// Returns how many properties were read.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns how many times a method ran.
    #[must_use]
    pub fn calls(&self, key: &str) -> usize {
        self.calls
            .get(key)
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }

    /// Replaces a property on the underlying record.
    pub fn set(&self, key: &str, property: impl Into<Property>) {
        self.record.set(key, property);
    }

    /// Moves the mock behind an `Arc`.
    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn counted(mut self, key: &str, method: Method) -> Self {
        let counter = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&counter);
        let counted = Method::new(move |args| {
            hits.fetch_add(1, Ordering::SeqCst);
            method.call(args)
        });
        self.calls.insert(key.to_string(), counter);
        self.record = self.record.with_method(key, counted);
        self
    }
}

impl Object for MockObject {
    fn get(&self, key: &str) -> Option<Property> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.record.get(key)
    }

    fn keys(&self) -> Vec<String> {
        self.record.keys()
    }
}
