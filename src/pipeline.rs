//! Ring construction, consumer attachment, and pipeline observability.
//!
//! A [`DispatchRing`] owns the preallocated slot store, the registry of
//! gating sequences the publisher must respect, and the claim turnstile
//! shared by every proxy over the ring. [`create_proxy`] is the single
//! creation surface: it validates the pipeline, spawns one consumer task
//! per implementation (plus a reset stage under fan-out), and hands back a
//! [`DispatchProxy`] publishing under the chosen overflow strategy.

use crate::barrier::Barrier;
use crate::call::{Invoker, RingCall};
use crate::consumer::EventProcessor;
use crate::dispatch::{DispatchProxy, OverflowStrategy};
use crate::error::{BuildError, FatalHandler, ReplayFailure};
use crate::publish::{ClaimController, RingPublisher};
use crate::reset::ResetStage;
use crate::ring::RingBuffer;
use crate::sequence::Sequence;
use papaya::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Registry of every sequence that gates slot reuse: one per consumer, one
/// per reset stage. The publisher's capacity check takes the minimum over
/// all of them; sequences are registered before their task is spawned and
/// live for the life of the pipeline.
pub(crate) struct GatingSequences {
    next_id: AtomicU64,
    sequences: HashMap<u64, Arc<Sequence>>,
}

impl GatingSequences {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            sequences: HashMap::new(),
        }
    }

    /// Registers a new gating sequence starting at `initial` and returns
    /// the shared handle its owner advances.
    pub(crate) fn register(&self, initial: i64) -> Arc<Sequence> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sequence = Arc::new(Sequence::new(initial));
        self.sequences.pin().insert(id, Arc::clone(&sequence));
        sequence
    }

    /// Minimum progress across every registered gating sequence, or `None`
    /// when nothing is registered yet.
    pub(crate) fn minimum(&self) -> Option<i64> {
        self.sequences
            .pin()
            .values()
            .map(|sequence| sequence.get())
            .min()
    }
}

/// State shared by the publishers, consumers, and reset stages of one ring.
pub(crate) struct RingCore<C: RingCall> {
    pub(crate) buffer: RingBuffer<C>,
    pub(crate) gating: GatingSequences,
    pub(crate) barrier: Arc<Barrier>,
}

impl<C: RingCall> RingCore<C> {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            gating: GatingSequences::new(),
            barrier: Arc::new(Barrier::new()),
        }
    }

    /// Whether the slot for `sequence` may be written: true once the
    /// slowest gating sequence has moved past the slot's previous tenancy.
    pub(crate) fn has_capacity_for(&self, sequence: i64) -> bool {
        match self.gating.minimum() {
            // Nothing registered yet; `create_proxy` registers at least one
            // gating sequence before any proxy can publish.
            None => true,
            Some(minimum) => sequence - minimum <= self.buffer.capacity() as i64,
        }
    }
}

/// Handle to one dispatch pipeline.
///
/// Construction preallocates every slot; proxies are attached with
/// [`create_proxy`] (or the generated `{Interface}Proxy::create`). The
/// publishing side stays open while this handle or any proxy is alive;
/// once all are dropped, consumers drain the committed slots and exit.
pub struct DispatchRing<C: RingCall> {
    core: Arc<RingCore<C>>,
    claim: Arc<ClaimController>,
    fatal: Option<FatalHandler<C>>,
}

impl<C: RingCall> DispatchRing<C> {
    /// Builds a ring of `capacity` preallocated slots.
    ///
    /// # Panics
    ///
    /// Panics unless `capacity` is a power of two and at least 2.
    pub fn new(capacity: usize) -> Self {
        let core = Arc::new(RingCore::new(capacity));
        let claim = Arc::new(ClaimController::new(Arc::clone(&core.barrier)));
        debug!(capacity, "dispatch ring created");
        Self {
            core,
            claim,
            fatal: None,
        }
    }

    /// Registers the pipeline's fatal-error handler: the single point of
    /// custody for panics raised while replaying on an implementation.
    ///
    /// Required before any proxy is created. Registering again replaces
    /// the handler for proxies created afterwards.
    pub fn on_fatal_error(&mut self, handler: impl Fn(ReplayFailure<C>) + Send + Sync + 'static) {
        self.fatal = Some(FatalHandler::new(handler));
    }

    pub fn capacity(&self) -> usize {
        self.core.buffer.capacity()
    }

    /// Highest committed sequence, or -1 before the first publish.
    pub fn cursor(&self) -> i64 {
        self.core.barrier.cursor()
    }

    /// Progress of the slowest attached consumer (or reset stage). Equals
    /// [`cursor`](Self::cursor) when every stage has caught up.
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.core.gating.minimum().unwrap_or_else(|| self.cursor())
    }

    /// Suspends until every attached stage has caught up with the
    /// publication cursor. With publishers still active this is a moving
    /// target; it is meant for tests and orderly shutdown.
    pub async fn drain(&self) {
        self.core
            .barrier
            .wait_progress_until(|| self.minimum_gating_sequence() >= self.cursor())
            .await;
    }
}

/// Precondition check for proxy creation. Stateless: the pipeline either
/// satisfies the preconditions at this instant or the creation is rejected.
fn validate<C: RingCall>(
    ring: &DispatchRing<C>,
    implementations: &[Arc<dyn Invoker<C>>],
) -> Result<FatalHandler<C>, BuildError> {
    let fatal = ring
        .fatal
        .clone()
        .ok_or(BuildError::MissingFatalErrorHandler)?;
    if implementations.is_empty() {
        return Err(BuildError::NoImplementations);
    }
    Ok(fatal)
}

/// Attaches `implementations` to `ring` and returns a proxy publishing
/// under `strategy`.
///
/// Each implementation gets its own consumer task and will observe every
/// invocation published through any proxy of this ring from this point on,
/// in publish order. With more than one implementation, a reset stage is
/// chained after the whole group to clear each slot once all of them have
/// released it.
///
/// Consumers are spawned onto the ambient Tokio runtime, so this must be
/// called within one.
///
/// # Errors
///
/// [`BuildError::MissingFatalErrorHandler`] if no fatal-error handler has
/// been registered on the ring, and [`BuildError::NoImplementations`] if
/// `implementations` is empty.
pub fn create_proxy<C: RingCall>(
    ring: &DispatchRing<C>,
    strategy: OverflowStrategy,
    implementations: Vec<Arc<dyn Invoker<C>>>,
) -> Result<DispatchProxy<C>, BuildError> {
    let fatal = validate(ring, &implementations)?;

    let attached = implementations.len();
    let fan_out = attached > 1;
    let start_at = ring.cursor();

    let mut upstream = Vec::with_capacity(attached);
    for invoker in implementations {
        let sequence = ring.core.gating.register(start_at);
        upstream.push(Arc::clone(&sequence));
        tokio::spawn(
            EventProcessor::new(Arc::clone(&ring.core), invoker, sequence, fatal.clone()).run(),
        );
    }

    if fan_out {
        let sequence = ring.core.gating.register(start_at);
        tokio::spawn(ResetStage::new(Arc::clone(&ring.core), upstream, sequence).run());
    }

    debug!(implementations = attached, ?strategy, "proxy attached to dispatch ring");

    Ok(DispatchProxy::new(
        RingPublisher::new(Arc::clone(&ring.core), Arc::clone(&ring.claim)),
        strategy,
    ))
}
