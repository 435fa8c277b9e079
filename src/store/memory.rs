use crate::core::{ChannelBounds, ChannelData, ChannelSet, Frame, Payload, SampleValue};
use crate::store::{DataStore, FetchDirection, StoreError, StoreResult};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Time-ordered samples of a single channel
#[derive(Debug, Default)]
struct Series {
    times: Vec<f64>,
    values: Vec<SampleValue>,
}

impl Series {
    fn type_name(&self) -> Option<&'static str> {
        self.values.first().map(|v| v.type_name())
    }

    fn first_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Index range selected by a fetch.
    ///
    /// Absolute windows are half-open so consecutive windows don't repeat
    /// points, but they close on the newest sample so the end of the data
    /// stays reachable. A zero-length absolute window picks the latest
    /// point at or before `start`.
    fn select(&self, start: f64, duration: f64, direction: FetchDirection) -> Range<usize> {
        let len = self.times.len();
        match direction {
            FetchDirection::Absolute if duration == 0.0 => {
                let idx = self.times.partition_point(|&t| t <= start);
                if idx == 0 {
                    0..0
                } else {
                    idx - 1..idx
                }
            }
            FetchDirection::Absolute => {
                let end = start + duration;
                let lower = self.times.partition_point(|&t| t < start);
                let upper = match self.last_time() {
                    Some(last) if end >= last => len,
                    _ => self.times.partition_point(|&t| t < end),
                };
                lower..upper.max(lower)
            }
            FetchDirection::Next => {
                let idx = self.times.partition_point(|&t| t <= start);
                if idx < len {
                    idx..idx + 1
                } else {
                    len..len
                }
            }
            FetchDirection::Previous => {
                let idx = self.times.partition_point(|&t| t < start);
                if idx == 0 {
                    0..0
                } else {
                    idx - 1..idx
                }
            }
            FetchDirection::Newest => match self.last_time() {
                None => 0..0,
                Some(_) if duration == 0.0 => len - 1..len,
                Some(last) => self.times.partition_point(|&t| t < last - duration)..len,
            },
        }
    }

    fn channel_data(&self, name: &str, range: Range<usize>) -> StoreResult<ChannelData> {
        let payload = Payload::from_samples(&self.values[range.clone()])
            .ok_or_else(|| StoreError::Backend(format!("mixed sample types on '{}'", name)))?;
        Ok(ChannelData::new(name, self.times[range].to_vec(), payload))
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    channels: BTreeMap<String, Series>,
    /// Maximum samples kept per channel, oldest dropped first
    capacity: Option<usize>,
}

impl StoreInner {
    fn newest_time(&self, channels: &ChannelSet) -> Option<f64> {
        channels
            .names()
            .iter()
            .filter_map(|name| self.channels.get(name))
            .filter_map(|series| series.last_time())
            .reduce(f64::max)
    }
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<StoreInner>,
    data_arrived: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process time-indexed data store.
///
/// Handles are cheap to clone and all see the same data, so one handle can
/// keep appending samples (a live source) while another is played back.
/// Each handle keeps its own monitor position for `fetch_bounded`.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    shared: Arc<Shared>,
    monitor_mark: Option<f64>,
    open: bool,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            shared: self.shared.clone(),
            monitor_mark: None,
            open: true,
        }
    }
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shared: Arc::new(Shared::default()),
            monitor_mark: None,
            open: true,
        }
    }

    /// Append one sample to a channel, creating the channel if needed
    pub fn append(&self, channel: &str, time: f64, value: SampleValue) -> StoreResult<()> {
        {
            let mut inner = self.shared.lock();
            let series = inner.channels.entry(channel.to_string()).or_default();

            if let Some(expected) = series.type_name() {
                if expected != value.type_name() {
                    return Err(StoreError::TypeMismatch {
                        channel: channel.to_string(),
                        expected,
                        actual: value.type_name(),
                    });
                }
            }
            if series.last_time().is_some_and(|last| time < last) {
                return Err(StoreError::OutOfOrder {
                    channel: channel.to_string(),
                    time,
                });
            }

            series.times.push(time);
            series.values.push(value);

            if let Some(capacity) = inner.capacity {
                let series = inner.channels.entry(channel.to_string()).or_default();
                if series.times.len() > capacity {
                    let excess = series.times.len() - capacity;
                    series.times.drain(..excess);
                    series.values.drain(..excess);
                }
            }
        }
        self.shared.data_arrived.notify_all();
        Ok(())
    }

    /// Limit how many samples each channel keeps
    pub fn set_capacity(&self, capacity: usize) {
        self.shared.lock().capacity = Some(capacity.max(1));
    }

    /// Number of samples held for a channel
    pub fn sample_count(&self, channel: &str) -> usize {
        self.shared
            .lock()
            .channels
            .get(channel)
            .map(|s| s.times.len())
            .unwrap_or(0)
    }

    /// Newest sample time across every channel
    pub fn newest_time(&self) -> Option<f64> {
        self.shared
            .lock()
            .channels
            .values()
            .filter_map(|s| s.last_time())
            .reduce(f64::max)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }
}

impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_channels(&mut self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.shared.lock().channels.keys().cloned().collect())
    }

    fn query_bounds(&mut self, channels: &ChannelSet) -> StoreResult<Vec<ChannelBounds>> {
        self.ensure_open()?;
        let inner = self.shared.lock();
        let bounds = channels
            .names()
            .iter()
            .filter_map(|name| {
                let series = inner.channels.get(name)?;
                let first = series.first_time()?;
                let last = series.last_time()?;
                Some(ChannelBounds::new(name.clone(), first, last - first))
            })
            .collect();
        Ok(bounds)
    }

    fn fetch_window(
        &mut self,
        channels: &ChannelSet,
        start: f64,
        duration: f64,
        direction: FetchDirection,
    ) -> StoreResult<Frame> {
        self.ensure_open()?;
        let inner = self.shared.lock();
        let mut frame = Frame::empty();

        for name in channels.names() {
            let data = match inner.channels.get(name) {
                Some(series) => {
                    let range = series.select(start, duration, direction);
                    series.channel_data(name, range)?
                }
                None => ChannelData::registration(name.clone(), start, duration),
            };
            frame.channels.push(data);
        }
        Ok(frame)
    }

    fn monitor(&mut self, _channels: &ChannelSet) -> StoreResult<()> {
        self.ensure_open()?;
        self.monitor_mark = None;
        Ok(())
    }

    fn fetch_bounded(&mut self, channels: &ChannelSet, timeout: Duration) -> StoreResult<Frame> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.lock();

        loop {
            if let Some(newest) = inner.newest_time(channels) {
                if self.monitor_mark.map_or(true, |mark| newest > mark) {
                    let mut frame = Frame::empty();
                    for name in channels.names() {
                        let Some(series) = inner.channels.get(name) else {
                            continue;
                        };
                        let fresh = series
                            .last_time()
                            .is_some_and(|t| self.monitor_mark.map_or(true, |mark| t > mark));
                        if fresh {
                            let len = series.times.len();
                            frame.channels.push(series.channel_data(name, len - 1..len)?);
                        }
                    }
                    self.monitor_mark = Some(newest);
                    return Ok(frame);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Monitor fetch on '{}' timed out", self.name);
                return Ok(Frame::empty());
            }
            inner = self
                .shared
                .data_arrived
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}
