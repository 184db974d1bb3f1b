//! The fan-out reset coordinator.
//!
//! With more than one implementation attached, every consumer reads the
//! same slot, so none of them may clear it. The `ResetStage` is a join
//! stage chained after the whole consumer group: it waits until every
//! upstream gating sequence has passed a slot, clears the slot's captured
//! arguments in place, and advances its own gating sequence — the one the
//! publisher's capacity check actually observes. Slots therefore never
//! retain argument values past their last reader, and a slot is never
//! overwritten while the reset stage still owes it a clear.
//!
//! Single-implementation pipelines have no reset stage: the next publish
//! into a slot overwrites (and thereby drops) the previous arguments, and
//! nothing else reads them in between.

use crate::call::RingCall;
use crate::pipeline::RingCore;
use crate::sequence::{Sequence, INITIAL_SEQUENCE};
use std::sync::Arc;
use tracing::trace;

pub(crate) struct ResetStage<C: RingCall> {
    core: Arc<RingCore<C>>,
    upstream: Vec<Arc<Sequence>>,
    sequence: Arc<Sequence>,
}

impl<C: RingCall> ResetStage<C> {
    pub(crate) fn new(
        core: Arc<RingCore<C>>,
        upstream: Vec<Arc<Sequence>>,
        sequence: Arc<Sequence>,
    ) -> Self {
        Self {
            core,
            upstream,
            sequence,
        }
    }

    pub(crate) async fn run(self) {
        let mut next = self.sequence.get() + 1;
        loop {
            let mut ended = false;
            self.core
                .barrier
                .wait_progress_until(|| {
                    if self.released() >= next {
                        return true;
                    }
                    // Nothing will ever be committed at `next` once the
                    // publishing side is closed and the cursor stops short.
                    if self.core.barrier.is_closed() && self.core.barrier.cursor() < next {
                        ended = true;
                        return true;
                    }
                    false
                })
                .await;

            if ended {
                break;
            }

            // SAFETY: every upstream consumer has passed `next`, and the
            // publisher cannot reuse the slot until this stage's own gating
            // sequence does — this task is the slot's only accessor.
            unsafe {
                (*self.core.buffer.get(next)).clear();
            }

            self.sequence.set(next);
            self.core.barrier.signal_progress();
            next += 1;
        }

        trace!("reset coordinator drained; shutting down");
        self.core.barrier.signal_progress();
    }

    /// Highest sequence released by the entire upstream consumer group.
    fn released(&self) -> i64 {
        self.upstream
            .iter()
            .map(|sequence| sequence.get())
            .min()
            .unwrap_or(INITIAL_SEQUENCE)
    }
}
