//! Overflow policy and the generic half of every generated proxy.

use crate::call::RingCall;
use crate::publish::RingPublisher;
use tracing::trace;

/// What a proxy does with a call when the ring has no free slot.
///
/// Fixed per proxy at creation time; proxies over the same ring may use
/// different strategies independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Discard the invocation. The call returns immediately with no side
    /// effect and no error; a fire-and-forget caller cannot observe the
    /// drop (non-`()` methods return their default value either way).
    Drop,
    /// Suspend the caller until the slowest consumer frees a slot. The
    /// call never fails for capacity reasons.
    Block,
}

/// Captures go in, publishes come out.
///
/// Generated proxies implement the interface trait and forward every call
/// here as a call-enum value. Cloning is cheap; clones share the ring and
/// its claim turnstile, so all invocations through one ring are linearized
/// into a single FIFO order regardless of method, proxy, or task.
pub struct DispatchProxy<C: RingCall> {
    publisher: RingPublisher<C>,
    strategy: OverflowStrategy,
}

impl<C: RingCall> Clone for DispatchProxy<C> {
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
            strategy: self.strategy,
        }
    }
}

impl<C: RingCall> DispatchProxy<C> {
    pub(crate) fn new(publisher: RingPublisher<C>, strategy: OverflowStrategy) -> Self {
        Self {
            publisher,
            strategy,
        }
    }

    /// The overflow strategy this proxy was created with.
    pub fn strategy(&self) -> OverflowStrategy {
        self.strategy
    }

    /// Publishes one captured invocation under the proxy's overflow policy.
    ///
    /// This is the publish point: once this returns under `Block`, or
    /// returns without dropping under `Drop`, the invocation is committed
    /// and will be replayed by every attached consumer.
    ///
    /// # Cancellation safety
    ///
    /// Cancelling the returned future before the commit leaves the ring
    /// consistent: the claim turn is released, the publication cursor never
    /// advanced, and the next publisher claims the same slot. A cancelled
    /// call is simply never published.
    pub async fn dispatch(&self, call: C) {
        match self.strategy {
            OverflowStrategy::Block => self.publisher.publish(call).await,
            OverflowStrategy::Drop => {
                if let Err(dropped) = self.publisher.try_publish(call).await {
                    trace!(method = ?dropped.method(), "ring full; invocation dropped");
                }
            }
        }
    }
}
