//! The contracts between generated interface code and the dispatch runtime.
//!
//! `#[ringcall::interface]` turns a trait into a *call enum*: one variant
//! per method, carrying that method's arguments, plus an `Empty` variant
//! for a cleared slot. The enum is the entire invocation event — the
//! discriminant is the method identifier and the variant payload is the
//! argument holder — and one such value is preallocated per ring slot and
//! mutated in place forever after. `RingCall` is what the runtime needs to
//! know about it; `Invoker` is how a captured call is replayed onto one
//! attached implementation.

use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;

/// Slot payload contract implemented by every generated call enum.
///
/// `Default` must produce the empty (cleared) state; that is what each slot
/// is preallocated with at ring construction.
pub trait RingCall: Debug + Default + Send + Sync + 'static {
    /// Stable identifier for one method of the interface.
    type Method: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Every declared method's identifier, in declaration order.
    ///
    /// This is the domain of the invoker table: exactly one entry per
    /// interface method.
    const METHODS: &'static [Self::Method];

    /// The method this value carries, or `None` for a cleared slot.
    fn method(&self) -> Option<Self::Method>;

    /// Resets the value to its empty state, dropping any captured
    /// arguments and releasing whatever they own.
    fn clear(&mut self);
}

/// Replays captured invocations onto one concrete implementation.
///
/// The generated adapter's `replay` matches on the call enum — the
/// method-identifier-to-invoker mapping, compiled to a jump table — and
/// calls the corresponding interface method with the captured arguments.
/// One adapter is attached per implementation; it is stateless beyond the
/// implementation it wraps and is driven by exactly one consumer task.
#[async_trait]
pub trait Invoker<C: RingCall>: Send + Sync + 'static {
    /// Replays one captured invocation. Replaying a cleared slot is a
    /// no-op; the runtime never asks for it.
    async fn replay(&self, call: &C);

    /// Called after the last invocation of a contiguous batch has been
    /// replayed. The default does nothing (a plain listener); generated
    /// adapters forward to the interface's `on_batch_end`.
    async fn end_of_batch(&self) {}
}
