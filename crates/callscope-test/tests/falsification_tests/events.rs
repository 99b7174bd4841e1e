//! Falsification Tests: Category C - Event Delivery (F021-F030)

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use callscope_core::{
    CallEvent, DispatchOptions, EventChannel, EventKind, Instrumentation, InstrumentationConfig,
};
use callscope_test::EventRecorder;
use parking_lot::Mutex;

/// F021: Publishing with zero listeners never fails
///
/// # Falsification Attempt
/// Track and call with no subscribers; a panic or error falsifies.
#[tokio::test]
async fn f021_publish_without_listeners() {
    let instrumentation = Instrumentation::new().unwrap();
    let noop = instrumentation.track_fn_named("noop", || ());
    for _ in 0..10 {
        noop.call(());
    }
    instrumentation.events().flush().await;
    assert!(!instrumentation.events().is_closed(), "F021 FALSIFIED");
}

/// F022: Events are never delivered in the publishing turn
///
/// # Falsification Attempt
/// Check the recorder synchronously right after a call; any event falsifies.
#[tokio::test]
async fn f022_delivery_is_deferred() {
    let instrumentation = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());
    let add = instrumentation.track_fn_named("add", |a: i32, b: i32| a + b);

    assert_eq!(add.call((1, 2)), 3);
    assert!(recorder.is_empty(), "F022 FALSIFIED: delivered inline");

    let events = recorder.wait_for(2, Duration::from_secs(1)).await.unwrap();
    assert_eq!(events.len(), 2);
}

/// F023: Listeners run in subscription order
///
/// # Falsification Attempt
/// Register several listeners appending their index; any other order
/// falsifies.
#[tokio::test]
async fn f023_listeners_in_subscription_order() {
    let channel = EventChannel::new().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..5 {
        let order = Arc::clone(&order);
        channel.on(EventKind::Call, move |_| order.lock().push(index));
    }

    channel.publish(CallEvent::call("x".into()));
    channel.flush().await;
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4], "F023 FALSIFIED");
}

/// F024: Call is always observed before its completion
///
/// # Falsification Attempt
/// Interleave many calls; a completion preceding its Call falsifies.
#[tokio::test]
async fn f024_call_precedes_completion() {
    let instrumentation = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());
    let a = instrumentation.track_fn_named("a", || 1);
    let b = instrumentation.track_fn_named("b", || Err::<(), _>("no"));

    for _ in 0..20 {
        a.call(());
        let _ = b.call(());
    }

    let events = recorder.flush_and_take().await;
    for name in ["a", "b"] {
        let mut open = 0_i32;
        for event in events.iter().filter(|e| e.name() == name) {
            if event.kind() == EventKind::Call {
                open += 1;
            } else {
                open -= 1;
            }
            assert!(open >= 0, "F024 FALSIFIED: completion before Call for {name}");
        }
        assert_eq!(open, 0);
    }
}

/// F025: A panicking listener does not affect the call or other listeners
///
/// # Falsification Attempt
/// Register a panicking listener ahead of a counting one; a lost event or a
/// failed call falsifies.
#[tokio::test]
async fn f025_listener_panic_is_isolated() {
    let instrumentation = Instrumentation::new().unwrap();
    let delivered = Arc::new(AtomicUsize::new(0));
    instrumentation
        .events()
        .on(EventKind::Call, |_| panic!("listener failure"));
    let counter = Arc::clone(&delivered);
    instrumentation.events().on(EventKind::Call, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let work = instrumentation.track_fn_named("work", || 42);
    assert_eq!(work.call(()), 42);
    assert_eq!(work.call(()), 42);
    instrumentation.events().flush().await;

    assert_eq!(delivered.load(Ordering::SeqCst), 2, "F025 FALSIFIED");
    assert_eq!(instrumentation.events().listener_count(EventKind::Call), 2);
}

/// F025b: A listener panicking on CallRejected leaves the caller's error intact
///
/// # Falsification Attempt
/// Register a panicking CallRejected listener ahead of a recording one, then
/// call a failing function; a changed error, a lost event or a closed channel
/// falsifies.
#[tokio::test]
async fn f025b_rejection_listener_panic_is_isolated() {
    #[derive(Debug, PartialEq)]
    struct Refused(&'static str);

    let instrumentation = Instrumentation::new().unwrap();
    instrumentation
        .events()
        .on(EventKind::CallRejected, |_| panic!("listener failure"));
    let recorder = EventRecorder::attach(instrumentation.events());

    let deny = instrumentation.track_fn_named("deny", |why: &'static str| Err::<(), _>(Refused(why)));
    assert_eq!(deny.call(("quota",)), Err(Refused("quota")), "F025b FALSIFIED: error changed");
    assert_eq!(deny.call(("quota",)), Err(Refused("quota")), "F025b FALSIFIED: error changed");

    let rejected = recorder
        .flush_and_take()
        .await
        .into_iter()
        .filter(|e| e.kind() == EventKind::CallRejected)
        .count();
    assert_eq!(rejected, 2, "F025b FALSIFIED: rejection lost");
    assert!(!instrumentation.events().is_closed(), "F025b FALSIFIED: channel closed");
    assert_eq!(instrumentation.events().listener_count(EventKind::CallRejected), 2);
}

/// F026: Panicking listeners can be evicted
///
/// # Falsification Attempt
/// Enable eviction; a panicking listener still registered falsifies.
#[tokio::test]
async fn f026_panicking_listener_evicted() {
    let config = InstrumentationConfig {
        remove_panicking_listeners: true,
        ..InstrumentationConfig::default()
    };
    let instrumentation = Instrumentation::with_config(config).unwrap();
    instrumentation
        .events()
        .on(EventKind::Call, |_| panic!("listener failure"));

    instrumentation.track_fn_named("work", || ()).call(());
    instrumentation.events().flush().await;
    assert_eq!(
        instrumentation.events().listener_count(EventKind::Call),
        0,
        "F026 FALSIFIED"
    );
}

/// F027: A removed listener receives nothing further
///
/// # Falsification Attempt
/// Remove a listener, then publish; any delivery falsifies.
#[tokio::test]
async fn f027_removed_listener_is_silent() {
    let channel = EventChannel::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let id = channel.on(EventKind::CallResolved, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    channel.publish(CallEvent::resolved("x".into(), 1.0));
    channel.flush().await;
    assert!(channel.remove_listener(EventKind::CallResolved, id));
    assert!(!channel.remove_listener(EventKind::CallResolved, id));

    channel.publish(CallEvent::resolved("x".into(), 1.0));
    channel.flush().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1, "F027 FALSIFIED");
}

/// F028: Listeners only see their own kind
///
/// # Falsification Attempt
/// Subscribe to CallRejected only and run a successful call; a delivery
/// falsifies.
#[tokio::test]
async fn f028_listeners_filtered_by_kind() {
    let instrumentation = Instrumentation::new().unwrap();
    let rejected = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rejected);
    instrumentation.events().on(EventKind::CallRejected, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    instrumentation.track_fn_named("ok", || "fine").call(());
    instrumentation.events().flush().await;
    assert_eq!(rejected.load(Ordering::SeqCst), 0, "F028 FALSIFIED");
}

/// F029: Completion events always carry elapsed time, Call never does
///
/// # Falsification Attempt
/// Inspect every event of mixed calls; a violation falsifies.
#[tokio::test]
async fn f029_elapsed_only_on_completion() {
    let instrumentation = Instrumentation::new().unwrap();
    let recorder = EventRecorder::attach(instrumentation.events());
    instrumentation.track_fn_named("ok", || 1).call(());
    let _ = instrumentation.track_fn_named("err", || Err::<u8, _>(())).call(());

    for event in recorder.flush_and_take().await {
        assert_eq!(
            event.elapsed_ms().is_some(),
            event.kind().is_completion(),
            "F029 FALSIFIED: {event:?}"
        );
    }
}

/// F030: A channel on an explicit runtime handle delivers events
///
/// # Falsification Attempt
/// Spawn the dispatcher on a handle; no delivery falsifies.
#[tokio::test]
async fn f030_spawn_on_handle() {
    let handle = tokio::runtime::Handle::current();
    let channel = EventChannel::spawn_on(&handle, DispatchOptions::default());
    let recorder = EventRecorder::attach(&channel);

    channel.publish(CallEvent::call("h".into()));
    let events = recorder.flush_and_take().await;
    assert_eq!(events.len(), 1, "F030 FALSIFIED");
}
