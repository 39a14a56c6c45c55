use std::time::Duration;

use rate_counter_core::{
    CancellationToken, ConfigError, RateCounter, RateCounterConfig, DEFAULT_RESOLUTION,
};

fn new_counter(token: &CancellationToken) -> RateCounter {
    RateCounter::new(token.clone(), Duration::from_millis(50))
}

#[test]
fn test_default_configuration() {
    let counter = new_counter(&CancellationToken::new());
    assert_eq!(counter.resolution(), DEFAULT_RESOLUTION);
    assert_eq!(counter.interval(), Duration::from_millis(50));
    assert_eq!(counter.tick_period(), Duration::from_micros(2500));
    assert_eq!(counter.rate(), 0);
    assert!(!counter.is_running());
}

#[test]
fn test_with_resolution() {
    let counter = new_counter(&CancellationToken::new()).with_resolution(7);
    assert_eq!(counter.resolution(), 7);

    let counter = counter.with_resolution(1);
    assert_eq!(counter.resolution(), 1);
    assert_eq!(counter.tick_period(), Duration::from_millis(50));
}

#[test]
#[should_panic(expected = "resolution cannot be less than 1")]
fn test_with_zero_resolution() {
    new_counter(&CancellationToken::new()).with_resolution(0);
}

#[test]
fn test_try_with_zero_resolution() {
    let err = new_counter(&CancellationToken::new())
        .try_with_resolution(0)
        .unwrap_err();
    assert_eq!(err, ConfigError::InvalidResolution { resolution: 0 });
}

#[test]
fn test_reconfiguration_resets_total() {
    // A cancelled signal keeps the rotation task from starting
    let token = CancellationToken::new();
    token.cancel();

    let counter = new_counter(&token);
    counter.incr(10);
    assert_eq!(counter.rate(), 10);

    let counter = counter.with_resolution(4);
    assert_eq!(counter.rate(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconfigure_while_running() {
    let counter = new_counter(&CancellationToken::new());
    counter.incr(1);

    let err = counter.try_with_resolution(5).unwrap_err();
    assert_eq!(err, ConfigError::AlreadyRunning);
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "cannot be reconfigured while its rotation task is alive")]
async fn test_with_resolution_while_running_panics() {
    let counter = new_counter(&CancellationToken::new());
    counter.incr(1);
    counter.with_resolution(5);
}

#[tokio::test(start_paused = true)]
async fn test_reconfigure_after_cancellation() {
    let token = CancellationToken::new();
    let counter = new_counter(&token);
    counter.incr(1);

    token.cancel();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(!counter.is_running());

    let counter = counter.try_with_resolution(5).unwrap();
    assert_eq!(counter.resolution(), 5);
    assert_eq!(counter.rate(), 0);
}

#[test]
fn test_config_build() {
    let config = RateCounterConfig::new(Duration::from_secs(60));
    assert_eq!(config.resolution, DEFAULT_RESOLUTION);

    let counter = RateCounterConfig {
        interval: Duration::from_secs(60),
        resolution: 60,
    }
    .build(CancellationToken::new())
    .unwrap();
    assert_eq!(counter.resolution(), 60);
    assert_eq!(counter.tick_period(), Duration::from_secs(1));
}

#[test]
fn test_config_build_zero_resolution() {
    let err = RateCounterConfig {
        interval: Duration::from_secs(1),
        resolution: 0,
    }
    .build(CancellationToken::new())
    .unwrap_err();
    assert_eq!(err, ConfigError::InvalidResolution { resolution: 0 });
}

#[test]
fn test_config_deserialize() {
    let config: RateCounterConfig =
        serde_json::from_str(r#"{"interval": {"secs": 2, "nanos": 0}}"#).unwrap();
    assert_eq!(config, RateCounterConfig::new(Duration::from_secs(2)));

    let config: RateCounterConfig =
        serde_json::from_str(r#"{"interval": {"secs": 0, "nanos": 500000000}, "resolution": 5}"#)
            .unwrap();
    assert_eq!(config.interval, Duration::from_millis(500));
    assert_eq!(config.resolution, 5);

    let unknown = serde_json::from_str::<RateCounterConfig>(
        r#"{"interval": {"secs": 1, "nanos": 0}, "buckets": 5}"#,
    );
    assert!(unknown.is_err());
}

#[test]
fn test_display_and_debug() {
    let token = CancellationToken::new();
    token.cancel();
    let counter = new_counter(&token);
    assert_eq!(counter.to_string(), "0");

    counter.incr(42);
    assert_eq!(counter.to_string(), "42");
    counter.incr(-50);
    assert_eq!(counter.to_string(), "-8");

    let debug = format!("{counter:?}");
    assert!(debug.contains("resolution: 20"));
    assert!(debug.contains("rate: -8"));
}

#[test]
fn test_error_messages() {
    assert_eq!(
        ConfigError::InvalidResolution { resolution: 0 }.to_string(),
        "rate counter resolution cannot be less than 1 (got 0)"
    );
    assert_eq!(
        ConfigError::AlreadyRunning.to_string(),
        "rate counter cannot be reconfigured while its rotation task is alive"
    );
}
