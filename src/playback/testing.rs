use crate::core::SampleValue;
use crate::error::{PlayerError, PlayerResult};
use crate::output::testing::{OutputLog, RecordingOutput};
use crate::output::{OutputTarget, PlaybackOutput};
use crate::playback::feedback::testing::RecordingFeedback;
use crate::playback::{ConnectParams, Connector, EngineSignals, PlaybackEngine, PlaybackSettings};
use crate::store::{DataStore, MemoryStore};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

pub const SOURCE: &str = "source";

/// Connector handing out one store and one recording output
pub struct TestConnector {
    pub store: MemoryStore,
    pub output: Option<RecordingOutput>,
    /// When set, `open_store` waits for a message first
    pub gate: Option<Receiver<()>>,
}

impl TestConnector {
    pub fn new(store: MemoryStore) -> (Self, Arc<Mutex<OutputLog>>) {
        let (output, log) = RecordingOutput::new();
        (
            Self {
                store,
                output: Some(output),
                gate: None,
            },
            log,
        )
    }
}

impl Connector for TestConnector {
    fn open_store(&mut self, address: &str) -> PlayerResult<Box<dyn DataStore>> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if address != self.store.name() {
            return Err(PlayerError::Connection(format!("No store named '{}'", address)));
        }
        Ok(Box::new(self.store.clone()))
    }

    fn open_output(&mut self, _target: &OutputTarget, _cache_size: usize) -> PlayerResult<Box<dyn PlaybackOutput>> {
        match self.output.take() {
            Some(output) => Ok(Box::new(output)),
            None => Err(PlayerError::Connection("output already open".into())),
        }
    }
}

/// Store holding `count` float samples of `channel` at `i * spacing`
pub fn ramp_store(channel: &str, count: usize, spacing: f64) -> MemoryStore {
    let store = MemoryStore::new(SOURCE);
    for i in 0..count {
        store
            .append(channel, i as f64 * spacing, SampleValue::Float64(i as f64))
            .unwrap();
    }
    store
}

pub fn connect_params(channels: &[&str]) -> ConnectParams {
    ConnectParams {
        store_address: SOURCE.to_string(),
        output: OutputTarget::Null,
        cache_size: 1000,
        channels: channels.iter().map(|c| c.to_string()).collect(),
        use_short_names: true,
    }
}

/// An engine driven directly on the test thread
pub struct Harness {
    pub engine: PlaybackEngine,
    pub feedback: Arc<RecordingFeedback>,
    pub output: Arc<Mutex<OutputLog>>,
    pub signals: Arc<EngineSignals>,
}

impl Harness {
    /// Connected engine with `channels` selected
    pub fn connected(store: MemoryStore, settings: PlaybackSettings, channels: &[&str]) -> Self {
        let signals = Arc::new(EngineSignals::new(settings));
        let feedback = Arc::new(RecordingFeedback::default());
        let (connector, output) = TestConnector::new(store);
        let mut engine = PlaybackEngine::new(signals.clone(), feedback.clone(), Box::new(connector));

        let params = connect_params(channels);
        engine.connect(&params).unwrap();
        let names: Vec<String> = params.channels.clone();
        engine.select_channels(&names, true).unwrap();

        Self {
            engine,
            feedback,
            output,
            signals,
        }
    }

    /// Start times of every emitted frame, oldest first
    pub fn emitted_starts(&self) -> Vec<f64> {
        self.output
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter_map(|f| f.last_start_time())
            .collect()
    }

    pub fn emitted_count(&self) -> usize {
        self.output.lock().unwrap().frames.len()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.feedback.clear();
        self.output.lock().unwrap().frames.clear();
    }
}
