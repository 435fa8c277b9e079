use crate::error::{PlayerError, PlayerResult};
use crate::output::{CsvOutput, NullOutput, OutputTarget, PlaybackOutput, RawOutput, StoreOutput};
use crate::store::{DataStore, MemoryStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Name the player publishes under when re-writing into a store
pub const OUTPUT_SOURCE_NAME: &str = "rbnbPlayer";

/// Opens the store and output for a session
pub trait Connector: Send {
    fn open_store(&mut self, address: &str) -> PlayerResult<Box<dyn DataStore>>;

    fn open_output(
        &mut self,
        target: &OutputTarget,
        cache_size: usize,
    ) -> PlayerResult<Box<dyn PlaybackOutput>>;
}

/// Connector over in-process stores, addressed by name.
///
/// Store outputs create their target store on first use so other
/// sessions can connect to the re-published data.
#[derive(Debug, Clone, Default)]
pub struct LocalConnector {
    stores: Arc<Mutex<HashMap<String, MemoryStore>>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, store: MemoryStore) {
        self.lock().insert(store.name().to_string(), store);
    }

    pub fn store(&self, name: &str) -> Option<MemoryStore> {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryStore>> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for LocalConnector {
    fn open_store(&mut self, address: &str) -> PlayerResult<Box<dyn DataStore>> {
        let store = self
            .store(address)
            .ok_or_else(|| PlayerError::Connection(format!("No store named '{}'", address)))?;
        info!("Opened store '{}'", address);
        Ok(Box::new(store))
    }

    fn open_output(
        &mut self,
        target: &OutputTarget,
        cache_size: usize,
    ) -> PlayerResult<Box<dyn PlaybackOutput>> {
        let connection_error = |e: crate::output::OutputError| PlayerError::Connection(e.to_string());

        let output: Box<dyn PlaybackOutput> = match target {
            OutputTarget::Store(name) => {
                let store = {
                    let mut stores = self.lock();
                    stores
                        .entry(name.clone())
                        .or_insert_with(|| MemoryStore::new(name))
                        .clone()
                };
                Box::new(StoreOutput::new(store, OUTPUT_SOURCE_NAME, cache_size))
            }
            OutputTarget::Csv(dest) => {
                Box::new(CsvOutput::new("csv", dest.open().map_err(connection_error)?))
            }
            OutputTarget::Raw(dest) => {
                Box::new(RawOutput::new("raw", dest.open().map_err(connection_error)?))
            }
            OutputTarget::Null => Box::new(NullOutput),
        };
        info!("Opened output {}", target);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_store_is_a_connection_error() {
        let mut connector = LocalConnector::new();
        assert!(matches!(
            connector.open_store("missing"),
            Err(PlayerError::Connection(_))
        ));
    }

    #[test]
    fn test_store_output_creates_target_store() {
        let mut connector = LocalConnector::new();
        connector.register(MemoryStore::new("source"));
        assert!(connector.open_store("source").is_ok());

        let output = connector
            .open_output(&OutputTarget::Store("out".into()), 1000)
            .unwrap();
        assert_eq!(output.name(), OUTPUT_SOURCE_NAME);
        assert!(connector.store("out").is_some());
    }

    #[test]
    fn test_raw_output_limit() {
        let mut connector = LocalConnector::new();
        let dir = tempfile::tempdir().unwrap();
        let target: OutputTarget = format!("raw:{}", dir.path().join("x.bin").display())
            .parse()
            .unwrap();
        let output = connector.open_output(&target, 1000).unwrap();
        assert_eq!(output.max_channels(), Some(1));
    }
}
