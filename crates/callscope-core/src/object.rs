//! Dynamic objects and their instrumented forwarding view.
//!
//! An [`Object`] exposes named properties, each either a plain
//! [`serde_json::Value`] or a callable [`Method`]. [`InstrumentedObject`]
//! forwards every property read to the underlying object, replacing methods
//! with instrumented wrappers named `{object}{separator}{key}`.
//!
//! # Wrap cache
//!
//! Wrappers are cached per instrumented object, keyed by the identity of the
//! original method's allocation. Reading the same method twice returns the
//! same wrapper (`Method::ptr_eq`). The cache is owned by the instrumented
//! object and dropped with it. An entry whose original method is referenced
//! by nothing but its own wrapper can never be hit again and is pruned on the
//! next miss.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::callable::TrackedFn;
use crate::clock::Clock;
use crate::error::{InstrumentError, Result};
use crate::events::EventChannel;
use crate::outcome::{Completion, Outcome};

/// Positional arguments of a dynamic method call.
pub type Args = Vec<Value>;

/// Boxed future returned by deferred methods.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type MethodFn = dyn Fn(Args) -> anyhow::Result<Reply> + Send + Sync;

/// Successful return of a dynamic method: a value now, or a future of one.
pub enum Reply {
    /// The value is available immediately.
    Ready(Value),
    /// The value will be available when the future settles.
    Deferred(BoxFuture<anyhow::Result<Value>>),
}

impl Reply {
    /// Creates an immediate reply.
    pub fn ready(value: impl Into<Value>) -> Self {
        Self::Ready(value.into())
    }

    /// Creates a deferred reply.
    pub fn deferred(fut: impl Future<Output = anyhow::Result<Value>> + Send + 'static) -> Self {
        Self::Deferred(Box::pin(fut))
    }

    /// Returns true for a deferred reply.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Waits for the value.
    pub async fn resolve(self) -> anyhow::Result<Value> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Deferred(fut) => fut.await,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl Outcome for Reply {
    type Observed = Self;

    fn observe(self, completion: Completion) -> Self {
        match self {
            Self::Ready(value) => {
                completion.resolve();
                Self::Ready(value)
            }
            Self::Deferred(fut) => Self::Deferred(Box::pin(completion.defer(fut))),
        }
    }
}

/// A dynamically invocable method.
///
/// Clones share the same underlying callable and therefore the same identity.
#[derive(Clone)]
pub struct Method {
    func: Arc<MethodFn>,
    name: Option<Arc<str>>,
}

impl Method {
    /// Creates an anonymous method.
    pub fn new(func: impl Fn(Args) -> anyhow::Result<Reply> + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
            name: None,
        }
    }

    /// Creates a method with a declared name.
    pub fn named(
        name: impl Into<Arc<str>>,
        func: impl Fn(Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            func: Arc::new(func),
            name: Some(name.into()),
        }
    }

    /// Creates a method that always answers immediately.
    pub fn immediate(func: impl Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static) -> Self {
        Self::new(move |args| func(args).map(Reply::Ready))
    }

    /// Creates a method that always answers with a future.
    pub fn deferred<Fut>(func: impl Fn(Args) -> Fut + Send + Sync + 'static) -> Self
    where
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(move |args| Ok(Reply::deferred(func(args))))
    }

    /// Sets the declared name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the declared name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Invokes the method.
    pub fn call(&self, args: Args) -> anyhow::Result<Reply> {
        (self.func)(args)
    }

    /// Returns true if both handles share the same underlying callable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.func).cast::<()>() as usize
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("identity", &format_args!("{:#x}", self.identity()))
            .finish()
    }
}

/// A property read from an [`Object`].
#[derive(Debug, Clone)]
pub enum Property {
    /// A plain value.
    Value(Value),
    /// A callable.
    Method(Method),
}

impl Property {
    /// Returns true for methods.
    #[must_use]
    pub const fn is_callable(&self) -> bool {
        matches!(self, Self::Method(_))
    }

    /// Returns the plain value, if this is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Method(_) => None,
        }
    }

    /// Returns the method, if this is one.
    #[must_use]
    pub const fn as_method(&self) -> Option<&Method> {
        match self {
            Self::Method(method) => Some(method),
            Self::Value(_) => None,
        }
    }

    /// Converts into the method, if this is one.
    #[must_use]
    pub fn into_method(self) -> Option<Method> {
        match self {
            Self::Method(method) => Some(method),
            Self::Value(_) => None,
        }
    }
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Method> for Property {
    fn from(method: Method) -> Self {
        Self::Method(method)
    }
}

/// An object with named properties.
pub trait Object: Send + Sync + 'static {
    /// Reads a property.
    fn get(&self, key: &str) -> Option<Property>;

    /// Lists the property names.
    fn keys(&self) -> Vec<String>;
}

/// A mutable property map implementing [`Object`].
#[derive(Debug, Default)]
pub struct Record {
    properties: RwLock<BTreeMap<String, Property>>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain value.
    #[must_use]
    pub fn with_value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, Property::Value(value.into()));
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method(self, key: impl Into<String>, method: Method) -> Self {
        self.set(key, Property::Method(method));
        self
    }

    /// Inserts or replaces a property.
    pub fn set(&self, key: impl Into<String>, property: impl Into<Property>) {
        self.properties.write().insert(key.into(), property.into());
    }

    /// Removes a property.
    pub fn remove(&self, key: &str) -> Option<Property> {
        self.properties.write().remove(key)
    }
}

impl From<serde_json::Map<String, Value>> for Record {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self {
            properties: RwLock::new(
                map.into_iter()
                    .map(|(key, value)| (key, Property::Value(value)))
                    .collect(),
            ),
        }
    }
}

impl Object for Record {
    fn get(&self, key: &str) -> Option<Property> {
        self.properties.read().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }
}

struct CacheEntry {
    original: Weak<MethodFn>,
    wrapped: Method,
}

#[derive(Default)]
struct WrapCache {
    entries: HashMap<usize, CacheEntry>,
}

impl WrapCache {
    fn get(&self, original: &Method) -> Option<Method> {
        self.entries
            .get(&original.identity())
            .map(|entry| entry.wrapped.clone())
    }

    fn insert(&mut self, original: &Method, wrapped: Method) {
        // The wrapper holds one strong reference; anything above that means
        // the original is still reachable from outside the cache.
        self.entries
            .retain(|_, entry| entry.original.strong_count() > 1);
        self.entries.insert(
            original.identity(),
            CacheEntry {
                original: Arc::downgrade(&original.func),
                wrapped,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Forwarding view of an [`Object`] whose methods are instrumented.
///
/// Clones share the wrap cache.
#[derive(Clone)]
pub struct InstrumentedObject {
    target: Arc<dyn Object>,
    name: Arc<str>,
    separator: Arc<str>,
    clock: Arc<dyn Clock>,
    events: EventChannel,
    cache: Arc<Mutex<WrapCache>>,
}

impl InstrumentedObject {
    /// Wraps `target`, naming members `{name}{separator}{key}`.
    pub fn new(
        target: Arc<dyn Object>,
        name: impl Into<Arc<str>>,
        separator: impl Into<Arc<str>>,
        clock: Arc<dyn Clock>,
        events: EventChannel,
    ) -> Self {
        Self {
            target,
            name: name.into(),
            separator: separator.into(),
            clock,
            events,
            cache: Arc::new(Mutex::new(WrapCache::default())),
        }
    }

    /// Returns the object's namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the underlying object.
    #[must_use]
    pub fn target(&self) -> &Arc<dyn Object> {
        &self.target
    }

    /// Reads a property; methods come back instrumented.
    pub fn get(&self, key: &str) -> Option<Property> {
        match self.target.get(key)? {
            Property::Value(value) => Some(Property::Value(value)),
            Property::Method(method) => Some(Property::Method(self.wrapper_for(key, &method))),
        }
    }

    /// Reads a property that must be a method.
    ///
    /// # Errors
    /// Returns [`InstrumentError::UnknownProperty`] or
    /// [`InstrumentError::NotCallable`].
    pub fn method(&self, key: &str) -> Result<Method> {
        match self.get(key) {
            Some(Property::Method(method)) => Ok(method),
            Some(Property::Value(_)) => Err(InstrumentError::NotCallable(self.member_name(key))),
            None => Err(InstrumentError::UnknownProperty(self.member_name(key))),
        }
    }

    /// Reads a method and invokes it.
    ///
    /// The outer error covers bad keys; the inner one is the method's own
    /// failure, passed through untouched.
    pub fn call(&self, key: &str, args: Args) -> Result<anyhow::Result<Reply>> {
        Ok(self.method(key)?.call(args))
    }

    /// Lists the underlying object's property names.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.target.keys()
    }

    /// Returns how many wrappers are currently cached.
    #[must_use]
    pub fn cached_wrappers(&self) -> usize {
        self.cache.lock().len()
    }

    fn member_name(&self, key: &str) -> String {
        format!("{}{}{}", self.name, self.separator, key)
    }

    fn wrapper_for(&self, key: &str, original: &Method) -> Method {
        // Lookup and insert under one lock: concurrent readers agree on one wrapper.
        let mut cache = self.cache.lock();
        if let Some(wrapped) = cache.get(original) {
            return wrapped;
        }

        let name: Arc<str> = self.member_name(key).into();
        tracing::debug!(member = %name, "instrumenting object member");

        let func = Arc::clone(&original.func);
        let tracked = TrackedFn::new(
            move |args: Args| func(args),
            Arc::clone(&name),
            Arc::clone(&self.clock),
            self.events.clone(),
        );
        let wrapped = Method::named(name, move |args| tracked.call((args,)));
        cache.insert(original, wrapped.clone());
        wrapped
    }
}

impl fmt::Debug for InstrumentedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedObject")
            .field("name", &self.name)
            .field("separator", &self.separator)
            .field("cached_wrappers", &self.cached_wrappers())
            .finish_non_exhaustive()
    }
}
