//! Worker pools: an outer job submits an inner job to a second pool and
//! waits for it.
//!
//! Run with: cargo run --bin pool_demo

use std::time::Duration;

use concurrency_primers::pool::{nested_greeting, WorkerPool};
use concurrency_primers::{logging, PrimersConfig};
use tracing::warn;

fn main() -> anyhow::Result<()> {
    let config = PrimersConfig::from_args()?;
    logging::init(&config.log);

    println!("=== Nested Submission Across Two Pools ===\n");
    println!(
        "outer workers: {}, inner workers: {}",
        config.pool.outer_workers, config.pool.inner_workers
    );

    match nested_greeting(&config.pool) {
        Ok(greeting) => {
            println!("Inner result: {}", greeting.inner);
            println!("Outer result: {}", greeting.outer);
            println!("Pools terminated: {}", greeting.pools_terminated);
        }
        Err(err) => warn!(%err, "nested submission failed"),
    }

    println!("\n=== Same Pool, One Worker ===");
    let pool = std::sync::Arc::new(WorkerPool::new("single", 1)?);
    let same = std::sync::Arc::clone(&pool);
    let outer = pool.submit(move || {
        same.submit(|| "hello".to_string())
            .and_then(|inner| inner.join_timeout(Duration::from_millis(100)))
    })?;
    match outer.join() {
        Ok(Ok(inner)) => println!("Unexpectedly got: {}", inner),
        Ok(Err(err)) => warn!(%err, "inner job starved by its own outer job"),
        Err(err) => warn!(%err, "outer job failed"),
    }
    pool.shutdown_and_wait();
    println!("Pool state: {:?}", pool.state());

    println!("\n=== Key Points ===");
    println!("1. Blocking on a job from inside the same full pool starves it");
    println!("2. Separate pools (or a timeout) break the cycle");
    println!("3. shutdown() stops intake; await_termination() drains and joins");
    Ok(())
}
