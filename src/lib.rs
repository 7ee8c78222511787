//! # Concurrency Primers
//!
//! Four small, independent demonstrations of concurrency building blocks.
//!
//! ## Demos
//!
//! 1. **Deferred values** - compose two asynchronously produced strings
//! 2. **Worker pools** - nested submission across two fixed-size pools
//! 3. **Push streams** - a producer pushing items, completion and errors
//!    through a channel to a subscriber
//! 4. **Managed objects** - a record registered by name and driven from a
//!    text management console
//!
//! ## Running Demos
//!
//! ```bash
//! cargo run --bin deferred_demo
//! cargo run --bin pool_demo
//! cargo run --bin stream_demo
//! cargo run --bin managed_console
//!
//! # Any demo accepts a TOML config path (or PRIMERS_CONFIG)
//! cargo run --bin pool_demo -- primers.toml
//! ```
//!
//! ## Key Dependencies
//!
//! - `tokio` / `tokio-stream` / `futures` - async runtime and combinators
//! - `crossbeam` - job queue for the worker pool
//! - `thiserror` - error types
//! - `tracing` / `tracing-subscriber` - logging
//! - `serde` / `serde_json` / `toml` - configuration and console values

pub mod config;
pub mod console;
pub mod deferred;
pub mod error;
pub mod logging;
pub mod managed;
pub mod pool;
pub mod stream;

pub use config::PrimersConfig;
pub use error::{PrimerError, Result};
