//! Push streams: a producer emits 0..count, a subscriber logs each signal.
//!
//! Run with: cargo run --bin stream_demo

use concurrency_primers::stream::{drive, range_publisher, LoggingSubscriber};
use concurrency_primers::{logging, PrimersConfig};
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PrimersConfig::from_args()?;
    logging::init(&config.log);

    println!("=== Push Stream ===\n");

    let mut subscriber = LoggingSubscriber::new();
    let stream = range_publisher(config.stream.count, config.stream.capacity);
    let summary = drive(stream, &mut subscriber).await;

    println!("Received: {:?}", subscriber.received);
    println!("Completions: {}", subscriber.completions);
    for err in &subscriber.errors {
        warn!(%err, "stream reported an error");
    }
    println!("Summary: {:?}", summary);

    println!("\n=== Key Points ===");
    println!("1. Items, completion and errors travel through one channel");
    println!("2. complete() and error() consume the emitter: one terminal signal");
    println!("3. A producer that vanishes shows up as a truncated stream");
    Ok(())
}
