//! error.rs
//! Configuration errors for the sliding window counter.
//!
//! Recording and querying never fail; the only fallible step is configuring
//! the bucket ring, and a failure there is a programmer error.

/// Error type returned when a counter cannot be (re)configured.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Requested resolution is below the minimum of one bucket.
    #[error("rate counter resolution cannot be less than 1 (got {resolution})")]
    InvalidResolution {
        /// The rejected resolution.
        resolution: usize,
    },
    /// A rotation task still references the counter's buckets.
    ///
    /// Reconfiguration is only supported before the first recorded event, or
    /// after the rotation task has observed cancellation and exited.
    #[error("rate counter cannot be reconfigured while its rotation task is alive")]
    AlreadyRunning,
}

/// Result type for counter configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;
