//! Configuration errors and the fatal-error handler contract.
//!
//! Configuration problems surface synchronously, at proxy-creation time.
//! Everything that goes wrong later happens on a consumer task, long after
//! the original call returned, and is therefore routed to the pipeline's
//! single fatal-error handler instead of any caller.

use crate::call::RingCall;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Rejections surfaced when attaching a proxy to a dispatch ring.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    /// The ring has no fatal-error handler registered. An asynchronous
    /// pipeline with no error handler would silently swallow replay
    /// failures, so proxy creation refuses outright.
    #[error("dispatch ring has no fatal error handler registered")]
    MissingFatalErrorHandler,

    /// No implementations were supplied for the proxy to dispatch to.
    #[error("at least one implementation must be attached")]
    NoImplementations,
}

/// What the fatal-error handler receives when a replay panics.
///
/// The slot itself cannot escape the consumer, so the invocation is carried
/// as its method identifier plus a rendered form, alongside the sequence
/// and the captured panic payload.
pub struct ReplayFailure<C: RingCall> {
    /// Panic payload captured from the implementation.
    pub panic: Box<dyn Any + Send>,
    /// Sequence of the slot that was being replayed.
    pub sequence: i64,
    /// Identifier of the method that was being replayed, if the slot still
    /// carried one.
    pub method: Option<C::Method>,
    /// Debug rendering of the captured invocation.
    pub invocation: String,
}

impl<C: RingCall> ReplayFailure<C> {
    /// Best-effort text of the panic payload.
    pub fn message(&self) -> &str {
        if let Some(message) = self.panic.downcast_ref::<&'static str>() {
            message
        } else if let Some(message) = self.panic.downcast_ref::<String>() {
            message
        } else {
            "non-string panic payload"
        }
    }
}

impl<C: RingCall> fmt::Debug for ReplayFailure<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayFailure")
            .field("sequence", &self.sequence)
            .field("method", &self.method)
            .field("invocation", &self.invocation)
            .field("message", &self.message())
            .finish()
    }
}

/// Shared handle to the registered fatal-error handler.
pub(crate) struct FatalHandler<C: RingCall>(Arc<dyn Fn(ReplayFailure<C>) + Send + Sync>);

impl<C: RingCall> Clone for FatalHandler<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C: RingCall> FatalHandler<C> {
    pub(crate) fn new(handler: impl Fn(ReplayFailure<C>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(handler))
    }

    /// Hands one failure to the handler. If the handler itself panics, the
    /// consumer task dies with it — that is the handler's way of halting
    /// the pipeline.
    pub(crate) fn handle(&self, failure: ReplayFailure<C>) {
        (self.0.as_ref())(failure);
    }
}
