//! Publication barrier: the cursor that makes slots visible, and the two
//! notification edges that connect the pipeline's stages.
//!
//! The `published` edge flows downstream (a commit wakes every consumer
//! waiting for new slots); the `progress` edge flows upstream (a consumer
//! or reset-stage advance wakes blocked publishers, the reset stage, and
//! `drain` callers). Waiters always arm a listener and then re-check their
//! condition before suspending, so a signal racing the check is never lost.

use crate::sequence::{Sequence, INITIAL_SEQUENCE};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug)]
pub(crate) struct Barrier {
    /// Highest committed sequence; `INITIAL_SEQUENCE` before the first publish.
    cursor: Sequence,
    /// Set once the publishing side (ring handle and every proxy) is gone.
    closed: AtomicBool,
    published: Notify,
    progress: Notify,
}

impl Barrier {
    pub(crate) fn new() -> Self {
        Self {
            cursor: Sequence::new(INITIAL_SEQUENCE),
            closed: AtomicBool::new(false),
            published: Notify::new(),
            progress: Notify::new(),
        }
    }

    #[inline]
    pub(crate) fn cursor(&self) -> i64 {
        self.cursor.get()
    }

    /// Commits `sequence`, making its slot visible to every consumer.
    ///
    /// The claim turnstile serializes publishers, so the exchange succeeds
    /// on the first attempt; the loop only defends the protocol against a
    /// commit racing an earlier, unfinished one.
    pub(crate) async fn commit(&self, sequence: i64) {
        while self.cursor.compare_exchange(sequence - 1, sequence).is_err() {
            tokio::task::yield_now().await;
        }
        self.published.notify_waiters();
    }

    /// Marks the publishing side gone and wakes everything still waiting.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.published.notify_waiters();
        self.progress.notify_waiters();
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits until at least `sequence` is committed and returns the highest
    /// committed sequence at wakeup (the consumer's batch horizon).
    ///
    /// Returns `None` once the publishing side has closed and `sequence`
    /// will never be committed. The final commit happens before `close`, so
    /// a consumer that observes the closed flag re-reads the cursor and
    /// still drains every committed slot.
    pub(crate) async fn wait_published(&self, sequence: i64) -> Option<i64> {
        loop {
            if let Some(outcome) = self.poll_published(sequence) {
                return outcome;
            }
            let mut notified = pin!(self.published.notified());
            notified.as_mut().enable();
            if let Some(outcome) = self.poll_published(sequence) {
                return outcome;
            }
            notified.await;
        }
    }

    fn poll_published(&self, sequence: i64) -> Option<Option<i64>> {
        let cursor = self.cursor.get();
        if cursor >= sequence {
            return Some(Some(cursor));
        }
        if self.is_closed() {
            // Re-read: a commit concurrent with closing is ordered before it.
            let cursor = self.cursor.get();
            return Some((cursor >= sequence).then_some(cursor));
        }
        None
    }

    /// Announces downstream progress (a gating sequence advanced).
    #[inline]
    pub(crate) fn signal_progress(&self) {
        self.progress.notify_waiters();
    }

    /// Suspends until `ready` returns true, waking on every progress signal
    /// (and on close, which also signals progress).
    pub(crate) async fn wait_progress_until(&self, mut ready: impl FnMut() -> bool) {
        loop {
            if ready() {
                return;
            }
            let mut notified = pin!(self.progress.notified());
            notified.as_mut().enable();
            if ready() {
                return;
            }
            notified.await;
        }
    }
}
