//! End-to-end tests of the generated dispatch surface: capture, publish,
//! replay, fan-out, overflow policies, batch boundaries, reset, and
//! fatal-error routing.

use ringcall::{BuildError, DispatchRing, OverflowStrategy, RingCall};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

#[ringcall::interface]
pub trait Listener {
    async fn on_string(&self, value: String);
    async fn on_float_and_int(&self, f: f32, i: i32);
    async fn on_void(&self);
    async fn on_shared(&self, payload: Arc<Vec<f64>>);
    async fn on_mixed(&self, a: i64, b: i64, c: String, d: String, e: i32);
}

#[derive(Default)]
struct RecordingListener {
    last_string: Mutex<Option<String>>,
    last_float_and_int: Mutex<Option<(f32, i32)>>,
    void_count: AtomicUsize,
    mixed_count: AtomicUsize,
    last_shared: Mutex<Option<Arc<Vec<f64>>>>,
    observed: Mutex<Vec<ListenerMethod>>,
}

#[ringcall::async_trait]
impl Listener for RecordingListener {
    async fn on_string(&self, value: String) {
        self.observed.lock().unwrap().push(ListenerMethod::OnString);
        *self.last_string.lock().unwrap() = Some(value);
    }

    async fn on_float_and_int(&self, f: f32, i: i32) {
        self.observed
            .lock()
            .unwrap()
            .push(ListenerMethod::OnFloatAndInt);
        *self.last_float_and_int.lock().unwrap() = Some((f, i));
    }

    async fn on_void(&self) {
        self.observed.lock().unwrap().push(ListenerMethod::OnVoid);
        self.void_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_shared(&self, payload: Arc<Vec<f64>>) {
        self.observed.lock().unwrap().push(ListenerMethod::OnShared);
        *self.last_shared.lock().unwrap() = Some(payload);
    }

    async fn on_mixed(&self, _a: i64, _b: i64, _c: String, _d: String, _e: i32) {
        self.observed.lock().unwrap().push(ListenerMethod::OnMixed);
        self.mixed_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counts replays and batch boundaries; retains nothing.
#[derive(Default)]
struct BatchAware {
    replayed: AtomicUsize,
    batches: AtomicUsize,
}

#[ringcall::async_trait]
impl Listener for BatchAware {
    async fn on_string(&self, _value: String) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_float_and_int(&self, _f: f32, _i: i32) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_void(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_shared(&self, _payload: Arc<Vec<f64>>) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_mixed(&self, _a: i64, _b: i64, _c: String, _d: String, _e: i32) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_batch_end(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }
}

fn ring_with_handler(capacity: usize) -> DispatchRing<ListenerCall> {
    let mut ring = DispatchRing::new(capacity);
    ring.on_fatal_error(|failure| panic!("unexpected replay failure: {failure:?}"));
    ring
}

async fn drained<C: RingCall>(ring: &DispatchRing<C>) {
    timeout(Duration::from_secs(5), ring.drain())
        .await
        .expect("pipeline drains");
}

#[test]
fn invoker_table_has_one_entry_per_declared_method() {
    use ListenerMethod::*;

    let expected: &[ListenerMethod] = &[OnString, OnFloatAndInt, OnVoid, OnShared, OnMixed];
    assert_eq!(ListenerCall::METHODS, expected);

    // Every captured call reports its method; a cleared slot reports none.
    assert_eq!(
        ListenerCall::OnString("x".to_owned()).method(),
        Some(OnString)
    );
    assert_eq!(ListenerCall::OnVoid.method(), Some(OnVoid));
    assert_eq!(ListenerCall::Empty.method(), None);

    let mut call = ListenerCall::OnMixed(0, 1, "a".to_owned(), "b".to_owned(), 2);
    assert_eq!(call.method(), Some(OnMixed));
    call.clear();
    assert!(matches!(call, ListenerCall::Empty));
}

#[tokio::test]
async fn proxy_creation_requires_a_fatal_error_handler() {
    let ring = DispatchRing::<ListenerCall>::new(1024);

    for strategy in [OverflowStrategy::Drop, OverflowStrategy::Block] {
        let denied = ListenerProxy::create(
            &ring,
            strategy,
            vec![Arc::new(RecordingListener::default())],
        );
        assert!(matches!(denied, Err(BuildError::MissingFatalErrorHandler)));
    }
}

#[tokio::test]
async fn proxy_creation_requires_at_least_one_implementation() {
    let ring = ring_with_handler(1024);
    let denied = ListenerProxy::create(&ring, OverflowStrategy::Drop, Vec::new());
    assert!(matches!(denied, Err(BuildError::NoImplementations)));
}

#[tokio::test]
async fn replays_every_invocation_in_publish_order() {
    let ring = ring_with_handler(1024);
    let implementation = Arc::new(RecordingListener::default());
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Drop,
        vec![implementation.clone()],
    )
    .unwrap();

    for i in 0..3 {
        listener.on_string(format!("single string {i}")).await;
        listener.on_float_and_int(i as f32, i).await;
        listener.on_void().await;
        listener.on_shared(Arc::new(vec![f64::from(i)])).await;
        listener
            .on_mixed(0, 1, "a".to_owned(), "b".to_owned(), 2)
            .await;
    }
    drained(&ring).await;

    assert_eq!(
        implementation.last_string.lock().unwrap().as_deref(),
        Some("single string 2")
    );
    assert_eq!(
        *implementation.last_float_and_int.lock().unwrap(),
        Some((2.0, 2))
    );
    assert_eq!(implementation.void_count.load(Ordering::Relaxed), 3);
    assert_eq!(implementation.mixed_count.load(Ordering::Relaxed), 3);
    assert_eq!(
        implementation.last_shared.lock().unwrap().as_deref(),
        Some(&vec![2.0])
    );

    use ListenerMethod::*;
    let cycle = [OnString, OnFloatAndInt, OnVoid, OnShared, OnMixed];
    let expected: Vec<ListenerMethod> = cycle.iter().copied().cycle().take(15).collect();
    assert_eq!(*implementation.observed.lock().unwrap(), expected);
}

#[tokio::test]
async fn fan_out_replays_identically_on_every_implementation() {
    let ring = ring_with_handler(1024);
    let first = Arc::new(RecordingListener::default());
    let second = Arc::new(RecordingListener::default());
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Drop,
        vec![first.clone(), second.clone()],
    )
    .unwrap();

    for i in 0..3 {
        listener.on_string(format!("single string {i}")).await;
        listener.on_float_and_int(i as f32, i).await;
        listener.on_void().await;
        listener
            .on_mixed(0, 1, "a".to_owned(), "b".to_owned(), 2)
            .await;
    }
    drained(&ring).await;

    for implementation in [&first, &second] {
        assert_eq!(
            implementation.last_string.lock().unwrap().as_deref(),
            Some("single string 2")
        );
        assert_eq!(implementation.void_count.load(Ordering::Relaxed), 3);
        assert_eq!(implementation.mixed_count.load(Ordering::Relaxed), 3);
    }

    // Both implementations observed the identical ordered sequence.
    assert_eq!(
        *first.observed.lock().unwrap(),
        *second.observed.lock().unwrap()
    );
}

#[ringcall::interface]
pub trait Overflow {
    async fn invoke(&self);
    async fn enqueue(&self, candidate: u64) -> u64;
}

/// Blocks inside `invoke` until the gate opens, then counts the invocation.
struct BlockedOverflow {
    gate: Semaphore,
    invocations: AtomicUsize,
    enqueued: AtomicU64,
}

impl BlockedOverflow {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            invocations: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
        }
    }
}

#[ringcall::async_trait]
impl Overflow for BlockedOverflow {
    async fn invoke(&self) {
        let permit = self.gate.acquire().await.expect("gate stays open");
        permit.forget();
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    async fn enqueue(&self, candidate: u64) -> u64 {
        self.enqueued.store(candidate, Ordering::Relaxed);
        candidate * 2
    }
}

#[tokio::test]
async fn drop_strategy_discards_what_a_full_ring_cannot_hold() {
    let mut ring = DispatchRing::<OverflowCall>::new(4);
    ring.on_fatal_error(|failure| panic!("unexpected replay failure: {failure:?}"));
    let implementation = Arc::new(BlockedOverflow::new());
    let proxy = OverflowProxy::create(
        &ring,
        OverflowStrategy::Drop,
        vec![implementation.clone()],
    )
    .unwrap();

    // The consumer is stuck inside its first replay, so the ring fills and
    // the overflow is silently discarded: no error, no suspension.
    for _ in 0..8 {
        proxy.invoke().await;
    }
    assert_eq!(ring.cursor(), 3, "exactly `capacity` invocations committed");

    implementation.gate.add_permits(8);
    drained(&ring).await;

    assert_eq!(implementation.invocations.load(Ordering::Relaxed), 4);
}

#[tokio::test]
async fn block_strategy_suspends_the_caller_instead_of_dropping() {
    let mut ring = DispatchRing::<OverflowCall>::new(2);
    ring.on_fatal_error(|failure| panic!("unexpected replay failure: {failure:?}"));
    let implementation = Arc::new(BlockedOverflow::new());
    let proxy = OverflowProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![implementation.clone()],
    )
    .unwrap();

    let mut publisher = tokio::spawn({
        let proxy = proxy.clone();
        async move {
            for _ in 0..6 {
                proxy.invoke().await;
            }
        }
    });

    // With the consumer gated, the third publish has no slot: the
    // publishing task must be suspended, not failed.
    assert!(
        timeout(Duration::from_millis(100), &mut publisher)
            .await
            .is_err(),
        "publisher should stall on the full ring"
    );

    implementation.gate.add_permits(6);
    timeout(Duration::from_secs(5), publisher)
        .await
        .expect("publisher resumes once slots free")
        .unwrap();
    drained(&ring).await;

    assert_eq!(implementation.invocations.load(Ordering::Relaxed), 6);
}

#[tokio::test]
async fn non_void_methods_return_the_default_value() {
    let mut ring = DispatchRing::<OverflowCall>::new(8);
    ring.on_fatal_error(|failure| panic!("unexpected replay failure: {failure:?}"));
    let implementation = Arc::new(BlockedOverflow::new());
    let proxy = OverflowProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![implementation.clone()],
    )
    .unwrap();

    // The real result is produced later, on the consumer task; the caller
    // gets the default whether the call was published or dropped.
    assert_eq!(proxy.enqueue(41).await, 0);
    drained(&ring).await;

    assert_eq!(implementation.enqueued.load(Ordering::Relaxed), 41);
}

#[tokio::test]
async fn batch_notifications_fire_and_keep_increasing() {
    let ring = ring_with_handler(4);
    let implementation = Arc::new(BatchAware::default());
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Drop,
        vec![implementation.clone()],
    )
    .unwrap();

    for i in 0..4 {
        listener.on_string(format!("foo{i}")).await;
    }
    drained(&ring).await;

    let first_burst = implementation.batches.load(Ordering::Relaxed);
    assert!(first_burst >= 1, "a processed burst ends at least one batch");

    for _ in 0..3 {
        listener.on_void().await;
    }
    drained(&ring).await;

    assert_eq!(implementation.replayed.load(Ordering::Relaxed), 7);
    assert!(
        implementation.batches.load(Ordering::Relaxed) > first_burst,
        "a later burst ends further batches"
    );
}

#[tokio::test]
async fn reset_stage_releases_arguments_after_fan_out_replay() {
    let ring = ring_with_handler(4);
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![
            Arc::new(BatchAware::default()),
            Arc::new(BatchAware::default()),
        ],
    )
    .unwrap();

    let payload = Arc::new(vec![1.0, 2.0]);
    for _ in 0..4 {
        listener.on_shared(payload.clone()).await;
    }
    drained(&ring).await;

    // Draining waits for the reset stage too: no clone of the payload
    // survives inside the ring.
    assert_eq!(Arc::strong_count(&payload), 1);

    // The cleared slots accept the next publishes with no residue.
    let second = Arc::new(vec![3.0]);
    for _ in 0..4 {
        listener.on_shared(second.clone()).await;
    }
    drained(&ring).await;
    assert_eq!(Arc::strong_count(&second), 1);
    assert_eq!(Arc::strong_count(&payload), 1);
}

#[tokio::test]
async fn single_consumer_slots_retain_captures_until_overwritten() {
    let ring = ring_with_handler(4);
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![Arc::new(BatchAware::default())],
    )
    .unwrap();

    let payload = Arc::new(vec![1.0]);
    for _ in 0..4 {
        listener.on_shared(payload.clone()).await;
    }
    drained(&ring).await;

    // No reset stage in the single-implementation pipeline: all four slots
    // still hold their captures.
    assert_eq!(Arc::strong_count(&payload), 5);

    // Overwriting one slot on wrap-around releases its previous capture.
    listener.on_void().await;
    drained(&ring).await;
    assert_eq!(Arc::strong_count(&payload), 4);
}

/// Panics while replaying `"boom"`, records everything else.
#[derive(Default)]
struct PanickyListener {
    processed: AtomicUsize,
}

#[ringcall::async_trait]
impl Listener for PanickyListener {
    async fn on_string(&self, value: String) {
        if value == "boom" {
            panic!("boom at replay");
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_float_and_int(&self, _f: f32, _i: i32) {}
    async fn on_void(&self) {}
    async fn on_shared(&self, _payload: Arc<Vec<f64>>) {}
    async fn on_mixed(&self, _a: i64, _b: i64, _c: String, _d: String, _e: i32) {}
}

#[tokio::test]
async fn replay_panics_are_routed_to_the_fatal_error_handler() {
    let failures: Arc<Mutex<Vec<(Option<ListenerMethod>, i64, String)>>> = Arc::default();

    let mut ring = DispatchRing::<ListenerCall>::new(16);
    ring.on_fatal_error({
        let failures = failures.clone();
        move |failure| {
            failures.lock().unwrap().push((
                failure.method,
                failure.sequence,
                failure.message().to_owned(),
            ));
        }
    });

    let implementation = Arc::new(PanickyListener::default());
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![implementation.clone()],
    )
    .unwrap();

    listener.on_string("ok".to_owned()).await;
    listener.on_string("boom".to_owned()).await;
    listener.on_string("also ok".to_owned()).await;
    drained(&ring).await;

    // The panicking slot was neither retried nor allowed to stop the stream.
    assert_eq!(implementation.processed.load(Ordering::Relaxed), 2);

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, Some(ListenerMethod::OnString));
    assert_eq!(failures[0].1, 1);
    assert_eq!(failures[0].2, "boom at replay");
}

#[tokio::test]
async fn several_proxies_may_share_one_ring() {
    let ring = ring_with_handler(16);
    let first = Arc::new(RecordingListener::default());
    let second = Arc::new(RecordingListener::default());

    let drop_proxy =
        ListenerProxy::create(&ring, OverflowStrategy::Drop, vec![first.clone()]).unwrap();
    let block_proxy =
        ListenerProxy::create(&ring, OverflowStrategy::Block, vec![second.clone()]).unwrap();
    assert_eq!(drop_proxy.strategy(), OverflowStrategy::Drop);
    assert_eq!(block_proxy.strategy(), OverflowStrategy::Block);

    drop_proxy.on_string("from drop".to_owned()).await;
    block_proxy.on_string("from block".to_owned()).await;
    drained(&ring).await;

    // Each consumer group sees every invocation published through any
    // proxy of the ring, in the same linearized order.
    for implementation in [&first, &second] {
        assert_eq!(
            *implementation.observed.lock().unwrap(),
            vec![ListenerMethod::OnString, ListenerMethod::OnString]
        );
        assert_eq!(
            implementation.last_string.lock().unwrap().as_deref(),
            Some("from block")
        );
    }
}

#[tokio::test]
async fn consumers_drain_committed_work_after_the_publishing_side_closes() {
    let ring = ring_with_handler(8);
    let implementation = Arc::new(RecordingListener::default());
    let listener = ListenerProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![implementation.clone()],
    )
    .unwrap();

    for i in 0..5 {
        listener.on_string(format!("{i}")).await;
    }
    drop(listener);
    drop(ring);

    timeout(Duration::from_secs(5), async {
        while implementation.observed.lock().unwrap().len() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer drains after close");
}
