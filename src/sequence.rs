use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};

/// Value of every sequence before anything has been published or consumed.
pub(crate) const INITIAL_SEQUENCE: i64 = -1;

/// A cache-padded atomic sequence counter.
///
/// One `Sequence` tracks the publication cursor; one more tracks each
/// consumer's (and each reset stage's) progress through the ring. All slot
/// access is ordered through these counters: a write to a slot happens
/// before the `Release` store that announces it, and a reader performs an
/// `Acquire` load before touching the slot.
#[derive(Debug)]
pub(crate) struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    pub(crate) fn new(initial: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial)),
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set(&self, sequence: i64) {
        self.value.store(sequence, Ordering::Release);
    }

    #[inline]
    pub(crate) fn compare_exchange(&self, current: i64, next: i64) -> Result<i64, i64> {
        self.value
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
    }
}

/// Maps a sequence onto a slot index within a power-of-two capacity.
///
/// Negative sequences wrap like any other; the initial `-1` cursor maps to
/// the last slot, which is never read before sequence 0 is committed.
#[inline]
pub(crate) fn slot_index(sequence: i64, index_mask: usize) -> usize {
    (sequence as usize) & index_mask
}
