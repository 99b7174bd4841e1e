//! Falsification Tests: Category D - Facade and Configuration (F031-F040)

use std::time::Duration;

use callscope_core::{
    EventKind, InstrumentError, Instrumentation, InstrumentationConfig, ManualClock, Method,
    Target, TrackingOptions,
};
use callscope_test::{EventRecorder, MockObject};
use serde_json::json;

/// F031: Tracking a plain value fails at track time
///
/// # Falsification Attempt
/// Track numbers, strings, booleans and arrays; anything but InvalidTarget
/// falsifies.
#[tokio::test]
async fn f031_plain_value_is_invalid_target() {
    let instrumentation = Instrumentation::new().unwrap();
    for value in [json!(1), json!("s"), json!(false), json!([1]), json!(null)] {
        let result = instrumentation.track(TrackingOptions::new(value.clone()).name("v"));
        assert!(
            matches!(result, Err(InstrumentError::InvalidTarget(_))),
            "F031 FALSIFIED: {value} accepted"
        );
    }
}

/// F032: Tracking an object without a name fails
///
/// # Falsification Attempt
/// Omit the name or pass an empty one through both `track` and
/// `track_object`; success falsifies.
#[tokio::test]
async fn f032_object_needs_name() {
    let instrumentation = Instrumentation::new().unwrap();
    let unnamed = instrumentation.track(TrackingOptions::new(Target::object(MockObject::new())));
    let empty = instrumentation.track(TrackingOptions::new(Target::object(MockObject::new())).name(""));
    let direct = instrumentation.track_object("", MockObject::new().into_shared());
    assert!(matches!(unnamed, Err(InstrumentError::MissingName)), "F032 FALSIFIED");
    assert!(matches!(empty, Err(InstrumentError::MissingName)), "F032 FALSIFIED");
    assert!(
        matches!(direct, Err(InstrumentError::MissingName)),
        "F032 FALSIFIED: track_object accepted an empty name"
    );
}

/// F033: Construction outside a runtime fails cleanly
///
/// # Falsification Attempt
/// Build a facade without a tokio runtime; a panic falsifies.
#[test]
fn f033_no_runtime_is_an_error() {
    assert!(
        matches!(Instrumentation::new(), Err(InstrumentError::NoRuntime)),
        "F033 FALSIFIED"
    );
}

/// F034: Every target tracked through one facade shares one channel
///
/// # Falsification Attempt
/// Track a function, a method and an object; a missing event falsifies.
#[tokio::test]
async fn f034_one_channel_per_facade() {
    let instrumentation = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());

    instrumentation.track_fn_named("f", || ()).call(());
    let method = instrumentation
        .track(TrackingOptions::new(Method::immediate(|_| Ok(json!(0)))).name("m"))
        .unwrap()
        .into_method()
        .unwrap();
    method.call(vec![]).unwrap();
    let object = instrumentation.track_object(
        "o",
        MockObject::new().with_method("k", |_| Ok(json!(1))).into_shared(),
    )
    .unwrap();
    object.call("k", vec![]).unwrap().unwrap();

    let names: Vec<_> = recorder
        .flush_and_take()
        .await
        .into_iter()
        .filter(|e| e.kind() == EventKind::Call)
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(names, vec!["f", "m", "o.k"], "F034 FALSIFIED");
}

/// F035: Separate facades do not see each other's events
///
/// # Falsification Attempt
/// Call through one facade and record the other; any event falsifies.
#[tokio::test]
async fn f035_facades_are_isolated() {
    let first = Instrumentation::new().unwrap();
    let second = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(second.events());

    first.track_fn_named("x", || ()).call(());
    first.events().flush().await;
    second.events().flush().await;
    assert!(recorder.is_empty(), "F035 FALSIFIED");
}

/// F036: Prefix and separator shape every name
///
/// # Falsification Attempt
/// Configure `app` and `::`; any unprefixed name falsifies.
#[tokio::test]
async fn f036_prefix_applies_everywhere() {
    let config = InstrumentationConfig::from_toml_str("prefix = \"app\"\nseparator = \"::\"").unwrap();
    let instrumentation = Instrumentation::with_config(config).unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());

    instrumentation.track_fn_named("boot", || ()).call(());
    let cache = instrumentation.track_object(
        "cache",
        MockObject::new().with_method("get", |_| Ok(json!(null))).into_shared(),
    )
    .unwrap();
    cache.call("get", vec![]).unwrap().unwrap();

    instrumentation.events().flush().await;
    assert!(
        recorder
            .names()
            .iter()
            .all(|n| n == "app::boot" || n == "app::cache::get"),
        "F036 FALSIFIED: {:?}",
        recorder.names()
    );
}

/// F037: Invalid configuration is rejected before anything is tracked
///
/// # Falsification Attempt
/// Load configurations with bad separators and prefixes; success falsifies.
#[tokio::test]
async fn f037_invalid_config_rejected() {
    for text in ["separator = \"\"", "prefix = \"\"", "prefix = \"a b\""] {
        assert!(
            matches!(InstrumentationConfig::from_toml_str(text), Err(InstrumentError::Config(_))),
            "F037 FALSIFIED: {text} accepted"
        );
    }
}

/// F038: A per-target clock overrides the default
///
/// # Falsification Attempt
/// Advance a manual clock inside the call; any other elapsed falsifies.
#[tokio::test]
async fn f038_custom_clock_measures() {
    let instrumentation = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());
    let clock = ManualClock::new();
    let ticking = clock.clone();

    let method = Method::immediate(move |_| {
        ticking.advance(Duration::from_millis(25));
        Ok(json!(null))
    });
    let tracked = instrumentation
        .track(TrackingOptions::new(method).name("tick").clock(clock))
        .unwrap()
        .into_method()
        .unwrap();
    tracked.call(vec![]).unwrap();

    let events = recorder.flush_and_take().await;
    assert_eq!(events[1].elapsed_ms(), Some(25.0), "F038 FALSIFIED");
}

/// F039: Typed callables default to their declared name
///
/// # Falsification Attempt
/// Track a named function without a name; any other name falsifies.
#[tokio::test]
async fn f039_declared_name_default() {
    fn checksum(data: &[u8]) -> u32 {
        data.iter().map(|b| u32::from(*b)).sum()
    }

    let instrumentation = Instrumentation::new().unwrap();
    let tracked = instrumentation.track_fn(checksum);
    assert_eq!(tracked.name(), "checksum", "F039 FALSIFIED");
    assert_eq!(tracked.call((&[1_u8, 2, 3][..],)), 6);
}

/// F040: JSON maps are tracked as objects with plain members
///
/// # Falsification Attempt
/// Track a JSON map; rejection or emitted events falsify.
#[tokio::test]
async fn f040_json_map_is_object() {
    let instrumentation = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());
    let object = instrumentation
        .track(TrackingOptions::new(json!({ "ttl": 30 })).name("settings"))
        .unwrap()
        .into_object()
        .unwrap();

    assert_eq!(object.get("ttl").unwrap().as_value(), Some(&json!(30)));
    instrumentation.events().flush().await;
    assert!(recorder.is_empty(), "F040 FALSIFIED");
}
