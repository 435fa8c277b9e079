pub mod csv_output;
pub mod raw_output;
pub mod store_output;

pub use csv_output::CsvOutput;
pub use raw_output::RawOutput;
pub use store_output::StoreOutput;

use crate::core::{ChannelBounds, Frame};
use crate::store::StoreError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Result type for playback output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Errors raised while sending data onward
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The transport only carries a limited number of channels
    #[error("Only {max} channel(s) permitted for this output, {requested} selected")]
    TooManyChannels { max: usize, requested: usize },

    #[error("Invalid output target '{0}'")]
    InvalidTarget(String),

    #[error("Output is disconnected")]
    Closed,
}

/// Sink that receives fetched frames and transmits them onward.
///
/// Outputs advertise their channel limit through `max_channels` instead of
/// callers checking which kind of transport they hold.
pub trait PlaybackOutput: Send {
    /// Name under which this output publishes
    fn name(&self) -> &str;

    /// Maximum number of channels the transport can carry
    fn max_channels(&self) -> Option<usize> {
        None
    }

    /// Declare the channels that will be emitted
    fn register_channels(
        &mut self,
        registration: &[ChannelBounds],
        use_short_names: bool,
    ) -> OutputResult<()>;

    /// Send one frame. Never called with an empty frame.
    fn emit(&mut self, frame: &Frame) -> OutputResult<()>;

    fn disconnect(&mut self);
}

/// Check a channel count against an output's advertised limit
pub fn check_channel_limit(output: &dyn PlaybackOutput, requested: usize) -> OutputResult<()> {
    match output.max_channels() {
        Some(max) if requested > max => Err(OutputError::TooManyChannels { max, requested }),
        _ => Ok(()),
    }
}

/// Where a file-like output writes
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    fn parse(spec: &str) -> Self {
        if spec == "-" || spec.is_empty() {
            Destination::Stdout
        } else {
            Destination::File(PathBuf::from(spec))
        }
    }

    /// Open a writer for this destination
    pub fn open(&self) -> OutputResult<Box<dyn std::io::Write + Send>> {
        match self {
            Destination::Stdout => Ok(Box::new(std::io::stdout())),
            Destination::File(path) => Ok(Box::new(std::fs::File::create(path)?)),
        }
    }
}

/// Output target selected by the user, e.g. `store:out`, `csv:-`, `raw:/tmp/x.bin`
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    /// Re-publish into a named in-process store
    Store(String),
    /// One CSV row per point
    Csv(Destination),
    /// Raw payload bytes of a single channel
    Raw(Destination),
    /// Discard everything
    Null,
}

impl FromStr for OutputTarget {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "null" {
            return Ok(OutputTarget::Null);
        }
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| OutputError::InvalidTarget(s.to_string()))?;
        match kind {
            "store" if !rest.is_empty() => Ok(OutputTarget::Store(rest.to_string())),
            "csv" => Ok(OutputTarget::Csv(Destination::parse(rest))),
            "raw" => Ok(OutputTarget::Raw(Destination::parse(rest))),
            _ => Err(OutputError::InvalidTarget(s.to_string())),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dest = |d: &Destination| match d {
            Destination::Stdout => "-".to_string(),
            Destination::File(p) => p.display().to_string(),
        };
        match self {
            OutputTarget::Store(name) => write!(f, "store:{}", name),
            OutputTarget::Csv(d) => write!(f, "csv:{}", dest(d)),
            OutputTarget::Raw(d) => write!(f, "raw:{}", dest(d)),
            OutputTarget::Null => f.write_str("null"),
        }
    }
}

/// Output that drops every frame
pub struct NullOutput;

impl PlaybackOutput for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn register_channels(&mut self, _registration: &[ChannelBounds], _use_short_names: bool) -> OutputResult<()> {
        Ok(())
    }

    fn emit(&mut self, _frame: &Frame) -> OutputResult<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!("null".parse::<OutputTarget>().unwrap(), OutputTarget::Null);
        assert_eq!(
            "store:out".parse::<OutputTarget>().unwrap(),
            OutputTarget::Store("out".into())
        );
        assert_eq!(
            "csv:-".parse::<OutputTarget>().unwrap(),
            OutputTarget::Csv(Destination::Stdout)
        );
        assert_eq!(
            "raw:/tmp/x.bin".parse::<OutputTarget>().unwrap(),
            OutputTarget::Raw(Destination::File(PathBuf::from("/tmp/x.bin")))
        );
        assert!("udp:1.2.3.4".parse::<OutputTarget>().is_err());
        assert!("store:".parse::<OutputTarget>().is_err());
    }

    #[test]
    fn test_target_display_round_trips() {
        for text in ["null", "store:out", "csv:-", "raw:/tmp/x.bin"] {
            let target: OutputTarget = text.parse().unwrap();
            assert_eq!(target.to_string(), text);
        }
    }

    #[test]
    fn test_channel_limit() {
        let (mut output, _log) = testing::RecordingOutput::new();
        output.max_channels = Some(1);
        assert!(check_channel_limit(&output, 1).is_ok());
        assert!(matches!(
            check_channel_limit(&output, 2),
            Err(OutputError::TooManyChannels { max: 1, requested: 2 })
        ));
        assert!(check_channel_limit(&NullOutput, 50).is_ok());
    }
}
