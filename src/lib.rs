//! Asynchronous interface dispatch over a preallocated ring buffer.
//!
//! `ringcall` lets a caller invoke methods on an interface while the actual
//! work happens later, on one consumer task per attached implementation.
//! Every method call is captured — method identity plus arguments — as one
//! value of a generated *call enum*, written into a preallocated slot of a
//! fixed-capacity ring, and replayed in publish order by every consumer.
//! Nothing is allocated per call: slots are created once, at ring
//! construction, and mutated in place forever after.
//!
//! The moving parts:
//!
//! - [`interface`]: an attribute macro that turns a trait into the whole
//!   dispatch surface — the call enum (method identifier + argument
//!   holder), the per-implementation invoker, and a proxy type that
//!   implements the trait by publishing.
//! - [`DispatchRing`]: the pipeline handle — preallocated slots, gating
//!   sequences, claim turnstile, and the registered fatal-error handler.
//! - [`create_proxy`] / the generated `{Interface}Proxy::create`: validates
//!   the pipeline, spawns consumers (and a reset stage under fan-out), and
//!   returns the proxy.
//! - [`OverflowStrategy`]: what a full ring does to a call — [`Drop`]
//!   discards it silently, [`Block`] suspends the caller until a slot
//!   frees.
//!
//! Calls through one ring are linearized into a single FIFO order and every
//! consumer observes that same order. A panic while replaying is routed to
//! the ring's fatal-error handler, never back to the caller — which is why
//! registering one is a hard precondition of proxy creation.
//!
//! [`Drop`]: OverflowStrategy::Drop
//! [`Block`]: OverflowStrategy::Block
//!
//! ```no_run
//! use std::sync::Arc;
//! use ringcall::{DispatchRing, OverflowStrategy};
//!
//! #[ringcall::interface]
//! pub trait Telemetry {
//!     async fn record(&self, name: String, value: f64);
//! }
//!
//! struct StdoutTelemetry;
//!
//! #[ringcall::async_trait]
//! impl Telemetry for StdoutTelemetry {
//!     async fn record(&self, name: String, value: f64) {
//!         println!("{name} = {value}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ringcall::BuildError> {
//!     let mut ring = DispatchRing::<TelemetryCall>::new(1024);
//!     ring.on_fatal_error(|failure| eprintln!("replay failed: {failure:?}"));
//!
//!     let proxy = TelemetryProxy::create(
//!         &ring,
//!         OverflowStrategy::Block,
//!         vec![Arc::new(StdoutTelemetry)],
//!     )?;
//!
//!     // Returns as soon as the call is committed; the work happens on the
//!     // consumer task.
//!     proxy.record("orders.accepted".to_owned(), 17.0).await;
//!
//!     ring.drain().await;
//!     Ok(())
//! }
//! ```

mod barrier;
mod call;
mod consumer;
mod dispatch;
mod error;
mod fence;
mod pipeline;
mod publish;
mod reset;
mod ring;
mod sequence;

pub use crate::call::{Invoker, RingCall};
pub use crate::dispatch::{DispatchProxy, OverflowStrategy};
pub use crate::error::{BuildError, ReplayFailure};
pub use crate::pipeline::{create_proxy, DispatchRing};

/// The code-generation step: apply to a trait definition to generate its
/// call enum, invoker, and proxy. See the crate-level example.
pub use ringcall_macros::interface;

/// Re-exported for implementations of generated interface traits.
pub use async_trait::async_trait;
