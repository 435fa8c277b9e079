pub mod connector;
pub mod engine;
pub mod feedback;
mod play;
mod realtime;
pub mod scheduler;
pub mod signals;
#[cfg(test)]
pub mod testing;
pub mod timer;

pub use connector::{Connector, LocalConnector};
pub use engine::PlaybackEngine;
pub use feedback::{format_position, format_rate, PlayerFeedback, TimeFormat};
pub use scheduler::Scheduler;
pub use signals::EngineSignals;
pub use timer::Timer;

use crate::output::OutputTarget;
use serde::{Deserialize, Serialize};

/// Which command the engine is carrying out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Disconnected,
    Connecting,
    SelectingChannels,
    Paused,
    Playing,
    Stepping,
    Realtime,
    Terminating,
}

impl PlaybackState {
    /// Whether `interrupt()` may set the flag while in this state
    pub fn is_interruptible(&self) -> bool {
        matches!(
            self,
            PlaybackState::Playing | PlaybackState::Stepping | PlaybackState::Realtime
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn is_forward(&self) -> bool {
        *self == Direction::Forward
    }

    /// +1.0 forward, -1.0 backward
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

/// End of the data to seek to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Min,
    Max,
}

/// Unit system for positions; time is the only one in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    #[default]
    Time,
}

/// Result of polling the pending-change block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    None,
    Mode,
    Param,
}

/// User-adjustable playback parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Seconds of data fetched per step; 0 selects single-point mode
    pub duration: f64,
    /// Step size as a fraction of `duration`
    pub increment_fraction: f64,
    pub rate: f64,
    pub mode: PlaybackMode,
}

impl PlaybackSettings {
    pub fn increment(&self) -> f64 {
        self.increment_fraction * self.duration
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            duration: 1.0,
            increment_fraction: 1.0,
            rate: 1.0,
            mode: PlaybackMode::Time,
        }
    }
}

/// Everything needed to open a session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub store_address: String,
    pub output: OutputTarget,
    pub cache_size: usize,
    /// Channels to select after connecting; empty selects every visible channel
    pub channels: Vec<String>,
    pub use_short_names: bool,
}

/// A request for the worker thread
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play {
        direction: Direction,
    },
    /// Single step, or a seek to `target` when set
    Step {
        direction: Direction,
        target: Option<f64>,
        reset_bounds: bool,
    },
    SeekLimit(Limit),
    Realtime,
    Connect(ConnectParams),
    SelectChannels {
        names: Vec<String>,
        use_short_names: bool,
    },
    Disconnect,
    Terminate,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::Step { .. } => "step",
            Command::SeekLimit(_) => "seek-limit",
            Command::Realtime => "realtime",
            Command::Connect(_) => "connect",
            Command::SelectChannels { .. } => "select-channels",
            Command::Disconnect => "disconnect",
            Command::Terminate => "terminate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Normal,
    /// Nothing came back on any channel: at an edge, or the source stalled
    GotNullFrame,
}

/// How the play loop paces itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingStrategy {
    /// Windows of `duration` advanced by a fixed increment
    FixedIncrement,
    /// One discrete point at a time, paced by the gap between points
    DiscreteNext,
}

impl PacingStrategy {
    pub fn for_duration(duration: f64) -> Self {
        if duration == 0.0 {
            PacingStrategy::DiscreteNext
        } else {
            PacingStrategy::FixedIncrement
        }
    }
}
