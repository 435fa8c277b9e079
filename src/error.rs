use crate::output::OutputError;
use crate::store::StoreError;
use thiserror::Error;

pub type PlayerResult<T> = Result<T, PlayerError>;

/// Errors surfaced by the playback engine at the command boundary
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Opening the store or output failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// No channels selected, or none of them holds data
    #[error("No currently selected channel contains any data")]
    EmptyChannelSet,

    /// The selection spans a single instant, so there is nothing to play through
    #[error("Currently selected set of channels contains only one frame of data")]
    SingleFrameOnly,

    #[error("Only {max} channel(s) permitted for output '{output}', {requested} selected")]
    TooManyChannels {
        output: String,
        max: usize,
        requested: usize,
    },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] StoreError),

    #[error("Output failed: {0}")]
    Output(OutputError),

    #[error("Not connected")]
    NotConnected,
}

impl PlayerError {
    /// Expected application errors are reported without tearing down the session
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PlayerError::EmptyChannelSet
                | PlayerError::SingleFrameOnly
                | PlayerError::TooManyChannels { .. }
        )
    }

    pub(crate) fn from_output(output: &str, err: OutputError) -> Self {
        match err {
            OutputError::TooManyChannels { max, requested } => PlayerError::TooManyChannels {
                output: output.to_string(),
                max,
                requested,
            },
            other => PlayerError::Output(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_kinds() {
        assert!(PlayerError::EmptyChannelSet.is_user_facing());
        assert!(PlayerError::SingleFrameOnly.is_user_facing());
        assert!(!PlayerError::NotConnected.is_user_facing());
        assert!(!PlayerError::Connection("refused".into()).is_user_facing());
        assert!(!PlayerError::Fetch(StoreError::Closed).is_user_facing());
    }

    #[test]
    fn test_channel_limit_maps_to_user_facing() {
        let err = PlayerError::from_output(
            "raw",
            OutputError::TooManyChannels { max: 1, requested: 3 },
        );
        assert!(err.is_user_facing());
        assert_eq!(
            err.to_string(),
            "Only 1 channel(s) permitted for output 'raw', 3 selected"
        );

        let err = PlayerError::from_output("raw", OutputError::Closed);
        assert!(matches!(err, PlayerError::Output(OutputError::Closed)));
    }
}
