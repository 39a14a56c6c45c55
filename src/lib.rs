//! A lock-free sliding window event counter.
//!
//! [`RateCounter`] answers "how many events were recorded in the last
//! `interval`?" in O(1) time and O(`resolution`) space. It is a metering
//! primitive meant to sit inside rate limiters, throughput gauges, and
//! admission control.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use rate_counter_core::{CancellationToken, RateCounter};
//!
//! let shutdown = CancellationToken::new();
//!
//! // Count events over the last second, in 10 buckets of 100ms
//! let counter = RateCounter::new(shutdown.clone(), Duration::from_secs(1)).with_resolution(10);
//!
//! counter.incr(1);
//! counter.incr(4);
//! assert_eq!(counter.rate(), 5);
//!
//! // Stops the background rotation task
//! shutdown.cancel();
//! ```
//!
//! # Core Concepts
//!
//! ## Buckets and Rotation
//! The window is split into `resolution` buckets. Events land in the current
//! bucket and in a running total. Every `interval / resolution` a background
//! task subtracts the oldest bucket from the total and reuses it as the new
//! current bucket. The result is an approximation: precision is bounded by one
//! bucket's length.
//!
//! ## Lazy Start
//! No background work exists until the first [`RateCounter::incr`]. A counter
//! that never records anything costs nothing beyond its buckets.
//!
//! ## Cancellation
//! The rotation task runs until the counter's [`Liveness`] signal is triggered
//! (any [`CancellationToken`] works) or the counter is dropped.
//!
//! ## Error Handling
//! Recording and querying never fail. Configuring fewer than one bucket is a
//! programmer error: [`RateCounter::with_resolution`] panics, while
//! [`RateCounter::try_with_resolution`] and [`RateCounterConfig::build`] return
//! a [`ConfigError`].
//!
//! ## Thread Safety
//! All operations take `&self` and are built from atomic operations on
//! individual 64-bit slots. Share a counter between threads with an `Arc`.

pub mod accumulator;
pub mod error;
pub mod liveness;
pub mod rate_counter;

pub use accumulator::Accumulator;
pub use error::{ConfigError, ConfigResult};
pub use liveness::Liveness;
pub use rate_counter::{RateCounter, RateCounterConfig, DEFAULT_RESOLUTION, MIN_TICK_PERIOD};
pub use tokio_util::sync::CancellationToken;
