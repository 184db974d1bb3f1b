//! The flag half of the publisher claim turnstile.
//!
//! Publishing is strictly serialized: whichever task holds the `Fence` owns
//! the right to claim, write, and commit the next slot. The fence itself is
//! just an atomic flag with RAII release; queueing and wakeup of the next
//! claimant live in the claim controller, which pairs a `try_acquire` loop
//! with a `Notify` turn signal.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, Ordering};

/// Grants the claim right while alive; releases it on drop.
///
/// Dropping the guard only clears the flag. The claim controller is
/// responsible for waking the next waiting publisher afterwards.
pub(crate) struct FenceGuard<'a>(&'a Fence);

impl Drop for FenceGuard<'_> {
    fn drop(&mut self) {
        // Release ordering makes the slot write and commit performed under
        // the fence visible to the next claimant.
        self.0.flag.store(false, Ordering::Release);
    }
}

/// A single-holder atomic flag, cache-padded against false sharing.
#[derive(Debug, Default)]
pub(crate) struct Fence {
    flag: CachePadded<AtomicBool>,
}

impl Fence {
    /// Attempts to take the fence without waiting.
    #[inline]
    pub(crate) fn try_acquire(&self) -> Option<FenceGuard<'_>> {
        self.flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then(|| FenceGuard(self))
    }
}
