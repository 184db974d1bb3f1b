//! Fan-out walkthrough: one proxy, two independent consumers.
//!
//! A price feed publishes ticks through a ring-backed proxy; a journal and
//! an aggregator each replay every tick on their own task, and the reset
//! stage clears each slot once both are done with it.
//!
//! Run with: `cargo run --example market_feed`

use ringcall::{DispatchRing, OverflowStrategy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[ringcall::interface]
pub trait TickListener {
    async fn on_trade(&self, symbol: String, price: f64, quantity: u64);
    async fn on_session_close(&self);
}

/// Prints every tick as it is replayed.
struct Journal;

#[ringcall::async_trait]
impl TickListener for Journal {
    async fn on_trade(&self, symbol: String, price: f64, quantity: u64) {
        println!("journal: {quantity} x {symbol} @ {price}");
    }

    async fn on_session_close(&self) {
        println!("journal: session closed");
    }
}

/// Tracks traded volume; batch-aware, so it reports once per burst rather
/// than once per tick.
#[derive(Default)]
struct VolumeTracker {
    traded: AtomicU64,
    reports: Mutex<Vec<u64>>,
}

#[ringcall::async_trait]
impl TickListener for VolumeTracker {
    async fn on_trade(&self, _symbol: String, _price: f64, quantity: u64) {
        self.traded.fetch_add(quantity, Ordering::Relaxed);
    }

    async fn on_session_close(&self) {}

    async fn on_batch_end(&self) {
        let traded = self.traded.load(Ordering::Relaxed);
        println!("volume: {traded} after this batch");
        self.reports.lock().unwrap().push(traded);
    }
}

#[tokio::main]
async fn main() -> Result<(), ringcall::BuildError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ringcall=debug".into()),
        )
        .init();

    let mut ring = DispatchRing::<TickListenerCall>::new(64);
    ring.on_fatal_error(|failure| {
        eprintln!("tick replay failed: {failure:?}");
    });

    let tracker = Arc::new(VolumeTracker::default());
    let feed = TickListenerProxy::create(
        &ring,
        OverflowStrategy::Block,
        vec![Arc::new(Journal), tracker.clone()],
    )?;

    for (symbol, price, quantity) in [
        ("ACME", 101.25, 300),
        ("ACME", 101.30, 150),
        ("GLOBEX", 54.10, 1200),
        ("ACME", 101.10, 75),
    ] {
        feed.on_trade(symbol.to_owned(), price, quantity).await;
    }

    feed.on_session_close().await;
    ring.drain().await;

    println!(
        "total traded volume: {}",
        tracker.traded.load(Ordering::Relaxed)
    );
    Ok(())
}
