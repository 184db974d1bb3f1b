//! The fixed-capacity slot store backing a dispatch ring.
//!
//! Every slot is preallocated in its empty state when the buffer is built
//! and is then mutated in place for the life of the process: a publisher
//! writes a captured invocation into it, consumers read it, and either the
//! reset stage clears it (fan-out) or the next publish overwrites it. Slots
//! are never destroyed; a slot's identity is its position.
//!
//! The buffer itself provides no synchronization. All access is coordinated
//! by the publication cursor and the gating sequences (`Sequence` values
//! written with `Release` and read with `Acquire`), which is what makes the
//! interior mutability below sound.

use crate::sequence::slot_index;
use std::cell::UnsafeCell;

/// A power-of-two ring of preallocated, in-place-mutated slots.
///
/// # Safety
///
/// `Send` and `Sync` are implemented manually; soundness rests on the
/// claim/commit/gating protocol enforced by the rest of the crate:
///
/// 1. **Single claimed writer**: the claim turnstile grants write access to
///    the slot at a given sequence to exactly one publisher, before that
///    sequence is committed.
/// 2. **Committed-read barrier**: consumers only dereference a slot after an
///    `Acquire` load of the publication cursor shows its sequence committed,
///    so they never observe a partial write.
/// 3. **Exclusive reclaim**: a slot is only written again (by the reset
///    stage or by a later publish) after every gating sequence has passed
///    it, so no reader still holds a borrow.
#[derive(Debug)]
pub(crate) struct RingBuffer<E> {
    slots: Box<[UnsafeCell<E>]>,
    index_mask: usize,
}

// SAFETY: slots are only touched under the sequencing protocol described
// above, which never lets a mutable access overlap any other access. Given
// that, moving the buffer between threads needs `E: Send` and sharing it
// needs `E: Sync`.
unsafe impl<E: Send + Sync> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E: Default> RingBuffer<E> {
    /// Preallocates `capacity` empty slots.
    ///
    /// # Panics
    ///
    /// Panics unless `capacity` is a power of two and at least 2; the
    /// power-of-two shape is what lets sequences map to slots with a mask.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "capacity must be at least 2");
        assert!(capacity.is_power_of_two(), "capacity must be a power of 2");

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(E::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            index_mask: capacity - 1,
        }
    }
}

impl<E> RingBuffer<E> {
    /// Returns the slot for `sequence` as a raw pointer.
    ///
    /// Obtaining the pointer is safe; dereferencing it is not. A writer must
    /// hold the claim for `sequence` (or be the reset stage after every
    /// upstream gating sequence has passed it); a reader must have observed
    /// `sequence` committed on the publication cursor.
    #[inline]
    pub(crate) fn get(&self, sequence: i64) -> *mut E {
        let index = slot_index(sequence, self.index_mask);
        // SAFETY: `index_mask` keeps the index within `slots`.
        unsafe { self.slots.get_unchecked(index).get() }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}
