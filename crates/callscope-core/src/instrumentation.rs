//! The instrumentation facade.
//!
//! One [`Instrumentation`] owns one [`EventChannel`]; every target tracked
//! through it reports on that channel.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::callable::{TrackedFn, declared_name};
use crate::clock::{Clock, MonotonicClock};
use crate::config::InstrumentationConfig;
use crate::error::{InstrumentError, Result};
use crate::events::EventChannel;
use crate::object::{Args, InstrumentedObject, Method, Object, Record};

/// Name used for callables that declare none.
const ANONYMOUS: &str = "anonymous";

/// Something handed to [`Instrumentation::track`].
pub enum Target {
    /// A dynamic callable.
    Callable(Method),
    /// An object whose methods get instrumented.
    Object(Arc<dyn Object>),
    /// A plain value. JSON objects are tracked as records; anything else is
    /// rejected.
    Value(Value),
}

impl Target {
    /// Creates an object target.
    pub fn object(object: impl Object) -> Self {
        Self::Object(Arc::new(object))
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Callable(_) => "callable",
            Self::Object(_) => "object",
            Self::Value(Value::Null) => "null",
            Self::Value(Value::Bool(_)) => "boolean",
            Self::Value(Value::Number(_)) => "number",
            Self::Value(Value::String(_)) => "string",
            Self::Value(Value::Array(_)) => "array",
            Self::Value(Value::Object(_)) => "map",
        }
    }
}

impl From<Method> for Target {
    fn from(method: Method) -> Self {
        Self::Callable(method)
    }
}

impl From<Arc<dyn Object>> for Target {
    fn from(object: Arc<dyn Object>) -> Self {
        Self::Object(object)
    }
}

impl From<Value> for Target {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callable(method) => f.debug_tuple("Callable").field(method).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// Options for [`Instrumentation::track`].
pub struct TrackingOptions {
    target: Target,
    name: Option<String>,
    clock: Option<Arc<dyn Clock>>,
}

impl TrackingOptions {
    /// Creates options for a target.
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            target: target.into(),
            name: None,
            clock: None,
        }
    }

    /// Sets the name events are reported under.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the clock used to time calls.
    #[must_use]
    pub fn clock(self, clock: impl Clock) -> Self {
        self.shared_clock(Arc::new(clock))
    }

    /// Sets a shared clock used to time calls.
    #[must_use]
    pub fn shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl fmt::Debug for TrackingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingOptions")
            .field("target", &self.target)
            .field("name", &self.name)
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}

/// Result of [`Instrumentation::track`].
#[derive(Debug, Clone)]
pub enum Tracked {
    /// An instrumented callable.
    Callable(Method),
    /// An instrumented object.
    Object(InstrumentedObject),
}

impl Tracked {
    /// Returns the callable, if one was tracked.
    #[must_use]
    pub fn into_method(self) -> Option<Method> {
        match self {
            Self::Callable(method) => Some(method),
            Self::Object(_) => None,
        }
    }

    /// Returns the object, if one was tracked.
    #[must_use]
    pub fn into_object(self) -> Option<InstrumentedObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Callable(_) => None,
        }
    }
}

/// Entry point for instrumenting callables and objects.
#[derive(Clone)]
pub struct Instrumentation {
    events: EventChannel,
    config: Arc<InstrumentationConfig>,
    clock: Arc<dyn Clock>,
}

impl Instrumentation {
    /// Creates a facade with the default configuration.
    ///
    /// # Errors
    /// Returns [`InstrumentError::NoRuntime`] outside a tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(InstrumentationConfig::default())
    }

    /// Creates a facade with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or no tokio runtime is
    /// available.
    pub fn with_config(config: InstrumentationConfig) -> Result<Self> {
        config.validate()?;
        let events = EventChannel::with_options(config.dispatch_options())?;
        Ok(Self {
            events,
            config: Arc::new(config),
            clock: Arc::new(MonotonicClock),
        })
    }

    /// Replaces the default clock for targets tracked afterwards.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the shared event channel.
    #[must_use]
    pub const fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Instruments a dynamic target.
    ///
    /// # Errors
    /// Returns [`InstrumentError::InvalidTarget`] for values that are neither
    /// callable nor objects, and [`InstrumentError::MissingName`] for objects
    /// without a name.
    pub fn track(&self, options: TrackingOptions) -> Result<Tracked> {
        let TrackingOptions {
            target,
            name,
            clock,
        } = options;
        let clock = clock.unwrap_or_else(|| Arc::clone(&self.clock));

        match target {
            Target::Callable(method) => {
                let declared = name
                    .or_else(|| method.name().map(str::to_string))
                    .unwrap_or_else(|| ANONYMOUS.to_string());
                Ok(Tracked::Callable(self.wrap_method(method, &declared, clock)))
            }
            Target::Object(object) => {
                let name = name.filter(|n| !n.is_empty()).ok_or(InstrumentError::MissingName)?;
                Ok(Tracked::Object(self.wrap_object(object, &name, clock)))
            }
            Target::Value(Value::Object(map)) => {
                let name = name.filter(|n| !n.is_empty()).ok_or(InstrumentError::MissingName)?;
                Ok(Tracked::Object(self.wrap_object(
                    Arc::new(Record::from(map)),
                    &name,
                    clock,
                )))
            }
            other @ Target::Value(_) => Err(InstrumentError::invalid_target(format!(
                "cannot instrument a {}",
                other.describe()
            ))),
        }
    }

    /// Instruments a typed callable under its declared name.
    pub fn track_fn<F>(&self, func: F) -> TrackedFn<F> {
        self.track_fn_named(declared_name::<F>(), func)
    }

    /// Instruments a typed callable under an explicit name.
    pub fn track_fn_named<F>(&self, name: &str, func: F) -> TrackedFn<F> {
        let name = self.config.qualify(name);
        tracing::debug!(name = %name, "tracking callable");
        TrackedFn::new(func, name, Arc::clone(&self.clock), self.events.clone())
    }

    /// Instruments an object under a namespace name.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::MissingName`] if `name` is empty.
    pub fn track_object(&self, name: &str, object: Arc<dyn Object>) -> Result<InstrumentedObject> {
        if name.is_empty() {
            return Err(InstrumentError::MissingName);
        }
        Ok(self.wrap_object(object, name, Arc::clone(&self.clock)))
    }

    fn wrap_method(&self, method: Method, name: &str, clock: Arc<dyn Clock>) -> Method {
        let name: Arc<str> = self.config.qualify(name).into();
        tracing::debug!(name = %name, "tracking callable");

        let tracked = TrackedFn::new(
            move |args: Args| method.call(args),
            Arc::clone(&name),
            clock,
            self.events.clone(),
        );
        Method::named(name, move |args| tracked.call((args,)))
    }

    fn wrap_object(&self, object: Arc<dyn Object>, name: &str, clock: Arc<dyn Clock>) -> InstrumentedObject {
        let name = self.config.qualify(name);
        tracing::debug!(name = %name, "tracking object");
        InstrumentedObject::new(
            object,
            name,
            self.config.separator.as_str(),
            clock,
            self.events.clone(),
        )
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
