use crate::core::{short_name, ChannelBounds, Frame};
use crate::output::{OutputError, OutputResult, PlaybackOutput};
use crate::store::MemoryStore;
use std::collections::HashMap;
use tracing::{debug, info};

/// Smallest cache worth honouring; smaller requests fall back to the default
const MIN_CACHE_SIZE: usize = 100;
const DEFAULT_CACHE_SIZE: usize = 1000;

/// Re-publishes played data into a store as a new source.
///
/// Every point of one emitted frame is stamped with the same wall-clock
/// time, so the output stream follows playback pacing rather than the
/// original timestamps.
pub struct StoreOutput {
    source_name: String,
    store: Option<MemoryStore>,
    /// Input channel name -> published channel name
    channel_map: HashMap<String, String>,
    last_stamp: f64,
}

impl StoreOutput {
    pub fn new(store: MemoryStore, source_name: &str, cache_size: usize) -> Self {
        let cache_size = if cache_size < MIN_CACHE_SIZE {
            DEFAULT_CACHE_SIZE
        } else {
            cache_size
        };
        store.set_capacity(cache_size);
        info!("Publishing playback as '{}' (cache {} points)", source_name, cache_size);

        Self {
            source_name: source_name.to_string(),
            store: Some(store),
            channel_map: HashMap::new(),
            last_stamp: f64::MIN,
        }
    }

    /// Name a channel is published under
    pub fn published_name(&self, input: &str) -> Option<&str> {
        self.channel_map.get(input).map(|s| s.as_str())
    }

    fn output_name(&self, input: &str, use_short_names: bool) -> String {
        if use_short_names {
            format!("{}/{}", self.source_name, short_name(input))
        } else {
            format!("{}/{}", self.source_name, input)
        }
    }
}

impl PlaybackOutput for StoreOutput {
    fn name(&self) -> &str {
        &self.source_name
    }

    fn register_channels(
        &mut self,
        registration: &[ChannelBounds],
        use_short_names: bool,
    ) -> OutputResult<()> {
        self.channel_map = registration
            .iter()
            .map(|c| (c.name.clone(), self.output_name(&c.name, use_short_names)))
            .collect();
        debug!("Registered {} output channels", self.channel_map.len());
        Ok(())
    }

    fn emit(&mut self, frame: &Frame) -> OutputResult<()> {
        let store = self.store.as_ref().ok_or(OutputError::Closed)?;
        // Wall clock may step backwards; the store only accepts ordered appends
        let now = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let stamp = now.max(self.last_stamp);
        self.last_stamp = stamp;

        for channel in &frame.channels {
            let out_name = match self.channel_map.get(&channel.name) {
                Some(name) => name.clone(),
                None => format!("{}/{}", self.source_name, short_name(&channel.name)),
            };
            for idx in 0..channel.payload.len() {
                if let Some(value) = channel.payload.get(idx) {
                    store.append(&out_name, stamp, value)?;
                }
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.store = None;
    }
}
