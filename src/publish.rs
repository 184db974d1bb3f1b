//! The publishing side of a dispatch ring: claim, write, commit.
//!
//! All proxies over one ring share a single `ClaimController`. Claiming is
//! a turnstile: one publisher at a time holds the fence, computes the next
//! sequence, applies its overflow policy, writes the captured call into the
//! slot, and commits. Releasing the turn wakes the next waiting publisher,
//! so every call through the ring is linearized into one FIFO order no
//! matter which proxy or task it came from.
//!
//! The controller also owns the lifecycle of the publishing side: when the
//! last handle (the ring handle and every proxy) is dropped, it closes the
//! barrier so consumers drain and shut down.

use crate::barrier::Barrier;
use crate::call::RingCall;
use crate::fence::{Fence, FenceGuard};
use crate::pipeline::RingCore;
use std::sync::Arc;
use tokio::sync::Notify;

/// Serializes claims across every proxy of one ring.
pub(crate) struct ClaimController {
    barrier: Arc<Barrier>,
    fence: Fence,
    turn: Notify,
}

impl ClaimController {
    pub(crate) fn new(barrier: Arc<Barrier>) -> Self {
        Self {
            barrier,
            fence: Fence::default(),
            turn: Notify::new(),
        }
    }

    /// Waits for the turnstile and returns the claim turn.
    ///
    /// `notify_one` stores a permit when nobody is waiting yet, so a
    /// release racing this loop's `try_acquire` is never lost.
    async fn claim(&self) -> ClaimTurn<'_> {
        loop {
            let notified = self.turn.notified();
            if let Some(guard) = self.fence.try_acquire() {
                return ClaimTurn {
                    guard: Some(guard),
                    controller: self,
                };
            }
            notified.await;
        }
    }
}

impl Drop for ClaimController {
    fn drop(&mut self) {
        // Last publishing handle gone: let consumers drain and exit.
        self.barrier.close();
    }
}

/// Exclusive right to claim, write, and commit the next slot.
struct ClaimTurn<'a> {
    guard: Option<FenceGuard<'a>>,
    controller: &'a ClaimController,
}

impl Drop for ClaimTurn<'_> {
    fn drop(&mut self) {
        // Release the fence before signalling, so the woken claimant's
        // first `try_acquire` cannot lose the race against this release.
        self.guard.take();
        self.controller.turn.notify_one();
    }
}

/// Writes captured calls into the ring under the claim discipline.
pub(crate) struct RingPublisher<C: RingCall> {
    core: Arc<RingCore<C>>,
    claim: Arc<ClaimController>,
}

impl<C: RingCall> Clone for RingPublisher<C> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            claim: Arc::clone(&self.claim),
        }
    }
}

impl<C: RingCall> RingPublisher<C> {
    pub(crate) fn new(core: Arc<RingCore<C>>, claim: Arc<ClaimController>) -> Self {
        Self { core, claim }
    }

    /// Blocking claim: suspends the caller until the slowest gating
    /// sequence frees a slot, then writes and commits. Never fails for
    /// capacity reasons.
    pub(crate) async fn publish(&self, call: C) {
        let turn = self.claim.claim().await;
        let sequence = self.core.barrier.cursor() + 1;

        self.core
            .barrier
            .wait_progress_until(|| self.core.has_capacity_for(sequence))
            .await;

        // SAFETY: the claim turn grants exclusive write access to this
        // uncommitted slot, and every gating sequence has passed the
        // slot's previous tenancy.
        unsafe {
            *self.core.buffer.get(sequence) = call;
        }

        self.core.barrier.commit(sequence).await;
        drop(turn);
    }

    /// Non-blocking claim: a capacity check instead of a wait, then either
    /// write and commit, or hand the call back untouched for the caller to
    /// discard.
    pub(crate) async fn try_publish(&self, call: C) -> Result<(), C> {
        // Fast path: an observably full ring means an immediate drop, even
        // while another publisher sits on the turnstile waiting for that
        // same capacity.
        if !self.core.has_capacity_for(self.core.barrier.cursor() + 1) {
            return Err(call);
        }

        let turn = self.claim.claim().await;
        let sequence = self.core.barrier.cursor() + 1;

        if !self.core.has_capacity_for(sequence) {
            return Err(call);
        }

        // SAFETY: as in `publish`.
        unsafe {
            *self.core.buffer.get(sequence) = call;
        }

        self.core.barrier.commit(sequence).await;
        drop(turn);
        Ok(())
    }
}
