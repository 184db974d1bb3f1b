//! The per-implementation replay loop.
//!
//! One `EventProcessor` task is spawned for each attached implementation.
//! It waits on the publication barrier, replays every committed slot in
//! publish order, delivers an end-of-batch notification when it reaches the
//! highest sequence it observed on wakeup, and only then advances its
//! gating sequence — which is what lets the publisher (and, under fan-out,
//! the reset stage) reuse the slot.
//!
//! A panic inside an implementation is caught per slot and routed to the
//! pipeline's fatal-error handler; the processor then continues with the
//! next slot. It never retries, skips, or reorders. When the publishing
//! side closes, the processor drains what is committed and exits.

use crate::call::{Invoker, RingCall};
use crate::error::{FatalHandler, ReplayFailure};
use crate::pipeline::RingCore;
use crate::sequence::Sequence;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, trace};

pub(crate) struct EventProcessor<C: RingCall> {
    core: Arc<RingCore<C>>,
    invoker: Arc<dyn Invoker<C>>,
    sequence: Arc<Sequence>,
    fatal: FatalHandler<C>,
}

impl<C: RingCall> EventProcessor<C> {
    pub(crate) fn new(
        core: Arc<RingCore<C>>,
        invoker: Arc<dyn Invoker<C>>,
        sequence: Arc<Sequence>,
        fatal: FatalHandler<C>,
    ) -> Self {
        Self {
            core,
            invoker,
            sequence,
            fatal,
        }
    }

    pub(crate) async fn run(self) {
        let mut next = self.sequence.get() + 1;
        loop {
            // The horizon is the highest committed sequence at wakeup; the
            // slot that reaches it ends the current batch.
            let Some(horizon) = self.core.barrier.wait_published(next).await else {
                break;
            };

            while next <= horizon {
                self.process(next, next == horizon).await;
                self.sequence.set(next);
                self.core.barrier.signal_progress();
                next += 1;
            }
        }

        trace!("consumer drained; shutting down");
        self.core.barrier.signal_progress();
    }

    async fn process(&self, sequence: i64, end_of_batch: bool) {
        // SAFETY: `sequence` was observed committed on the publication
        // cursor, and the slot cannot be reclaimed before this processor's
        // gating sequence passes it. Consumers only read.
        let call: &C = unsafe { &*self.core.buffer.get(sequence) };

        let replay = AssertUnwindSafe(self.invoker.replay(call)).catch_unwind();
        if let Err(panic) = replay.await {
            error!(sequence, "implementation panicked during replay");
            self.fatal.handle(ReplayFailure {
                panic,
                sequence,
                method: call.method(),
                invocation: format!("{call:?}"),
            });
        }

        if end_of_batch {
            let notify = AssertUnwindSafe(self.invoker.end_of_batch()).catch_unwind();
            if let Err(panic) = notify.await {
                error!(sequence, "implementation panicked in end-of-batch notification");
                self.fatal.handle(ReplayFailure {
                    panic,
                    sequence,
                    method: call.method(),
                    invocation: format!("{call:?}"),
                });
            }
        }
    }
}
