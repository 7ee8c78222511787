//! Deferred values: two halves of a greeting produced concurrently, then
//! combined.
//!
//! Run with: cargo run --bin deferred_demo

use concurrency_primers::deferred::{compose_greeting, Deferred};
use concurrency_primers::{logging, PrimersConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PrimersConfig::from_args()?;
    logging::init(&config.log);

    println!("=== Deferred Value Composition ===\n");

    let greeting = compose_greeting(&config.deferred);
    info!(finished = greeting.is_finished(), "greeting requested");

    match greeting.get().await {
        Ok(greeting) => println!("Result: {}", greeting),
        Err(err) => warn!(%err, "waiting for the greeting failed"),
    }

    println!("\n=== Sequential Composition ===");
    let shouted = Deferred::completed(config.deferred.tail.clone())
        .then(|tail| async move { tail.trim_end_matches('.').to_uppercase() })
        .map(|tail| format!("{tail}!"));
    match shouted.get().await {
        Ok(shouted) => println!("Result: {}", shouted),
        Err(err) => warn!(%err, "composition failed"),
    }

    println!("\n=== Key Points ===");
    println!("1. A deferred value is read once: get() consumes the handle");
    println!("2. combine() waits for both inputs, which run concurrently");
    println!("3. A panicking producer surfaces as an error, not a crash");
    Ok(())
}
