//! Live sources that keep appending to a store while it is being played.
//!
//! A feed produces timestamped samples; `run_feed` drives one into a
//! `MemoryStore` until told to stop.

use async_trait::async_trait;
use crate::core::SampleValue;
use crate::store::MemoryStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One sample produced by a live feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSample {
    pub channel: String,
    pub time: f64,
    pub value: SampleValue,
}

/// Trait for live data producers
#[async_trait]
pub trait LiveFeed: Send {
    /// Name of the feed, for logging
    fn name(&self) -> &str;

    /// Wait for and return the next sample, or `None` when the feed is done
    async fn next_sample(&mut self) -> Option<FeedSample>;
}

/// Generates a sine wave on one channel at a fixed interval, timestamped
/// with wall-clock seconds since the Unix epoch.
pub struct SyntheticFeed {
    name: String,
    channel: String,
    interval: Duration,
    counter: u64,
    limit: Option<u64>,
}

impl SyntheticFeed {
    pub fn new(channel: &str, interval: Duration) -> Self {
        Self {
            name: format!("synthetic:{}", channel),
            channel: channel.to_string(),
            interval,
            counter: 0,
            limit: None,
        }
    }

    /// Stop after producing `count` samples
    pub fn with_limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }
}

#[async_trait]
impl LiveFeed for SyntheticFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_sample(&mut self) -> Option<FeedSample> {
        if self.limit.is_some_and(|limit| self.counter >= limit) {
            return None;
        }
        tokio::time::sleep(self.interval).await;
        self.counter += 1;

        let time = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let phase = self.counter as f64 * 0.1;
        Some(FeedSample {
            channel: self.channel.clone(),
            time,
            value: SampleValue::Float64(phase.sin()),
        })
    }
}

/// Pump samples from a feed into a store until the feed ends or `stop` is set.
///
/// Returns the number of samples appended.
pub async fn run_feed<F: LiveFeed>(mut feed: F, store: MemoryStore, stop: Arc<AtomicBool>) -> u64 {
    info!("Starting live feed {}", feed.name());
    let mut appended = 0;

    while !stop.load(Ordering::SeqCst) {
        let Some(sample) = feed.next_sample().await else {
            debug!("Live feed {} finished", feed.name());
            break;
        };
        match store.append(&sample.channel, sample.time, sample.value) {
            Ok(()) => appended += 1,
            Err(e) => warn!("Live feed {} dropped a sample: {}", feed.name(), e),
        }
    }

    info!("Live feed {} stopped after {} samples", feed.name(), appended);
    appended
}
