//! Instrumented cache demo.
//!
//! Tracks an asynchronous key/value cache as `default_cache` and forwards
//! every lifecycle event to `tracing`.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --example cache
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use callscope::prelude::*;
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Default)]
struct Store {
    entries: Mutex<HashMap<String, (Value, Option<Instant>)>>,
}

impl Store {
    fn set(&self, key: String, value: Value, ttl: Option<Duration>) {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().insert(key, (value, expires));
    }

    fn get(&self, key: &str) -> Value {
        match self.entries.lock().get(key) {
            Some((_, Some(expires))) if *expires < Instant::now() => Value::Null,
            Some((value, _)) => value.clone(),
            None => Value::Null,
        }
    }
}

/// A cache whose `get` and `set` answer asynchronously.
struct Cache {
    get: Method,
    set: Method,
}

impl Cache {
    fn new(latency: Duration) -> Self {
        let store = Arc::new(Store::default());

        let reader = Arc::clone(&store);
        let get = Method::deferred(move |args| {
            let store = Arc::clone(&reader);
            async move {
                tokio::time::sleep(latency).await;
                let key = key_arg(&args)?;
                Ok(store.get(&key))
            }
        });

        let set = Method::deferred(move |args| {
            let store = Arc::clone(&store);
            async move {
                tokio::time::sleep(latency * 2).await;
                let key = key_arg(&args)?;
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                let ttl = args.get(2).and_then(Value::as_u64).map(Duration::from_millis);
                store.set(key, value, ttl);
                Ok(Value::Null)
            }
        });

        Self { get, set }
    }
}

fn key_arg(args: &[Value]) -> anyhow::Result<String> {
    args.first()
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("cache key must be a string"))
}

impl Object for Cache {
    fn get(&self, key: &str) -> Option<Property> {
        match key {
            "get" => Some(Property::Method(self.get.clone())),
            "set" => Some(Property::Method(self.set.clone())),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<String> {
        vec!["get".to_string(), "set".to_string()]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = InstrumentationConfig::default().with_prefix("test");
    let instrumentation = Instrumentation::with_config(config)?;

    let events = instrumentation.events();
    events.on(EventKind::Call, |event| {
        tracing::info!(name = event.name(), "increment");
    });
    for kind in [EventKind::CallResolved, EventKind::CallRejected] {
        events.on(kind, |event| {
            tracing::info!(
                name = event.name(),
                kind = %event.kind(),
                elapsed_ms = event.elapsed_ms().unwrap_or_default(),
                "timing"
            );
        });
    }

    let cache = instrumentation
        .track_object("default_cache", Arc::new(Cache::new(Duration::from_millis(20))))?;

    cache
        .call("set", vec![json!("greeting"), json!({ "text": "hello" }), json!(5_000)])??
        .resolve()
        .await?;
    let hit = cache.call("get", vec![json!("greeting")])??.resolve().await?;
    tracing::info!(%hit, "cache hit");

    let missing_key = cache.call("get", vec![json!(7)])??.resolve().await;
    tracing::info!(error = ?missing_key.err(), "invalid key rejected");

    events.flush().await;
    Ok(())
}
