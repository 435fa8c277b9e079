pub mod live;
pub mod memory;

pub use live::{run_feed, LiveFeed, SyntheticFeed};
pub use memory::MemoryStore;

use crate::core::{ChannelBounds, ChannelSet, Frame};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for data store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a data store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No store is reachable at the given address
    #[error("No data store at '{0}'")]
    NotFound(String),

    /// The store connection has been closed
    #[error("Data store connection is closed")]
    Closed,

    /// A sample did not match the type already held by its channel
    #[error("Channel '{channel}' holds {expected} data, got {actual}")]
    TypeMismatch {
        channel: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Samples must be appended in time order
    #[error("Sample at {time} is older than the newest data on '{channel}'")]
    OutOfOrder { channel: String, time: f64 },

    /// Any other failure reported by the backend
    #[error("Data store error: {0}")]
    Backend(String),
}

/// Direction keyword of a windowed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    /// Exactly the window [start, start + duration]
    Absolute,
    /// The point immediately after start
    Next,
    /// The point immediately before start
    Previous,
    /// The newest data available
    Newest,
}

impl FetchDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchDirection::Absolute => "absolute",
            FetchDirection::Next => "next",
            FetchDirection::Previous => "previous",
            FetchDirection::Newest => "newest",
        }
    }

    /// Pick the keyword for a playback step.
    ///
    /// A forced absolute fetch wins; otherwise zero-duration requests walk
    /// point by point and everything else is a plain time window.
    pub fn for_step(duration: f64, force_absolute: bool, forward: bool) -> Self {
        if force_absolute {
            FetchDirection::Absolute
        } else if duration == 0.0 && forward {
            FetchDirection::Next
        } else if duration == 0.0 {
            FetchDirection::Previous
        } else {
            FetchDirection::Absolute
        }
    }
}

impl fmt::Display for FetchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote, time-indexed data source.
///
/// Implementations are owned by the playback worker thread once
/// connected and are never shared with the front-end directly.
pub trait DataStore: Send {
    /// Name or address of the store
    fn name(&self) -> &str;

    /// All channel names the store currently offers
    fn list_channels(&mut self) -> StoreResult<Vec<String>>;

    /// Registration query: time span per channel, no payload.
    ///
    /// Channels that hold no data are left out.
    fn query_bounds(&mut self, channels: &ChannelSet) -> StoreResult<Vec<ChannelBounds>>;

    /// Windowed fetch. Channels with nothing in the window may come back
    /// with an empty payload; callers filter those.
    fn fetch_window(
        &mut self,
        channels: &ChannelSet,
        start: f64,
        duration: f64,
        direction: FetchDirection,
    ) -> StoreResult<Frame>;

    /// Start a monitor subscription used by `fetch_bounded`
    fn monitor(&mut self, channels: &ChannelSet) -> StoreResult<()>;

    /// Wait up to `timeout` for data newer than anything already delivered
    /// by this subscription. Returns an empty frame on timeout.
    fn fetch_bounded(&mut self, channels: &ChannelSet, timeout: Duration) -> StoreResult<Frame>;

    /// Close the connection
    fn close(&mut self);
}
