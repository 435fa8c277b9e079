use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Initial playback parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    /// Window width in seconds; 0 selects single-point mode
    pub duration: f64,
    /// Step size as a fraction of the duration
    pub increment_fraction: f64,
    pub rate: f64,
}

impl PlaybackDefaults {
    /// Reject values playback cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            anyhow::bail!("duration must be zero or more, got {}", self.duration);
        }
        if !self.increment_fraction.is_finite() || self.increment_fraction <= 0.0 {
            anyhow::bail!(
                "increment fraction must be greater than zero, got {}",
                self.increment_fraction
            );
        }
        if !self.rate.is_finite() || self.rate <= 0.0 {
            anyhow::bail!("rate must be greater than zero, got {}", self.rate);
        }
        Ok(())
    }
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            duration: 1.0,
            increment_fraction: 1.0,
            rate: 1.0,
        }
    }
}

/// Synthetic live feed appended to the source store while playing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveFeedConfig {
    pub channel: String,
    pub interval_ms: u64,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            channel: "live/sine".to_string(),
            interval_ms: 100,
        }
    }
}

/// Persistent player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Name of the store to play back from
    pub store_address: String,
    /// Recording loaded into the source store at startup
    pub recording: Option<PathBuf>,
    /// Output target, e.g. `store:out` or `csv:-`
    pub output: String,
    pub cache_size: usize,
    pub use_short_names: bool,
    /// Channels to select on connect; empty selects everything available
    pub channels: Vec<String>,
    pub playback: PlaybackDefaults,
    pub live: Option<LiveFeedConfig>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            store_address: "local".to_string(),
            recording: None,
            output: "store:rbnbPlayer".to_string(),
            cache_size: 1000,
            use_short_names: true,
            channels: Vec::new(),
            playback: PlaybackDefaults::default(),
            live: None,
        }
    }
}

impl PlayerConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rbnb-player").join("config.json"))
    }

    /// Load from an explicit path, else the default location, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config
            .playback
            .validate()
            .with_context(|| format!("Invalid playback settings in {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.cache_size, 1000);
        assert!(config.use_short_names);
        assert!(config.channels.is_empty());
        assert_eq!(config.playback.duration, 1.0);
        assert_eq!(config.playback.increment_fraction, 1.0);
        assert_eq!(config.playback.rate, 1.0);
        assert!(config.live.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"output": "csv:-", "playback": {{"rate": 4.0}}, "live": {{"channel": "x"}}}}"#
        )
        .unwrap();

        let config = PlayerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.output, "csv:-");
        assert_eq!(config.playback.rate, 4.0);
        assert_eq!(config.playback.duration, 1.0);
        assert_eq!(config.store_address, "local");
        let live = config.live.unwrap();
        assert_eq!(live.channel, "x");
        assert_eq!(live.interval_ms, 100);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(PlayerConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_playback_values_are_validated() {
        assert!(PlaybackDefaults::default().validate().is_ok());
        let invalid = [
            (1.0, 0.0, 1.0),
            (1.0, -0.5, 1.0),
            (1.0, f64::NAN, 1.0),
            (-1.0, 1.0, 1.0),
            (1.0, 1.0, 0.0),
        ];
        for (duration, increment_fraction, rate) in invalid {
            let playback = PlaybackDefaults {
                duration,
                increment_fraction,
                rate,
            };
            assert!(playback.validate().is_err(), "{:?} accepted", playback);
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"playback": {{"increment_fraction": 0}}}}"#).unwrap();
        assert!(PlayerConfig::load(Some(file.path())).is_err());
    }
}
