use crate::error::PlayerError;
use crate::playback::PlaybackSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Callbacks from the worker thread to whatever front-end drives playback.
///
/// Called from the worker thread only; implementations must not block.
pub trait PlayerFeedback: Send + Sync {
    fn display_position(&self, time: f64);

    /// Measured playback rate as a multiple of real time
    fn display_rate(&self, rate: f64);

    fn clear_rate_display(&self);

    /// Position within the data bounds, 0.0 at the start and 1.0 at the end
    fn set_slider(&self, fraction: f64);

    fn set_buttons_enabled(&self, _enabled: bool) {}

    fn set_position_enabled(&self, _enabled: bool) {}

    fn set_rate_enabled(&self, _enabled: bool) {}

    /// The engine returned to Paused without an interrupt
    fn paused(&self) {}

    fn channels_available(&self, _channels: &[String]) {}

    /// `disconnected` is true when the error tore the session down
    fn report_error(&self, context: &str, error: &PlayerError, disconnected: bool);

    /// Output name once connected, `None` after disconnecting
    fn connection_changed(&self, _output: Option<&str>) {}

    /// Final settings when the worker exits
    fn terminated(&self, _settings: &PlaybackSettings) {}
}

/// How positions are rendered for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    /// Plain seconds with three decimals
    #[default]
    Unspecified,
    /// Seconds since the Unix epoch, shown as a UTC date
    Seconds,
    /// Milliseconds since the Unix epoch, shown as a UTC date
    Milliseconds,
}

impl FromStr for TimeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unspecified" | "plain" => Ok(TimeFormat::Unspecified),
            "seconds" | "s" => Ok(TimeFormat::Seconds),
            "milliseconds" | "ms" => Ok(TimeFormat::Milliseconds),
            other => Err(format!("unknown time format '{}'", other)),
        }
    }
}

pub fn format_position(time: f64, format: TimeFormat) -> String {
    let millis = match format {
        TimeFormat::Unspecified => return format!("{:.3}", time),
        TimeFormat::Seconds => (time * 1000.0).round() as i64,
        TimeFormat::Milliseconds => time.round() as i64,
    };
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(date) => date.format("%d-%b-%Y %Z %H:%M:%S%.3f").to_string(),
        None => format!("{:.3}", time),
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{:.3}x", rate)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// One recorded callback
    #[derive(Debug, Clone, PartialEq)]
    pub enum FeedbackEvent {
        Position(f64),
        Rate(f64),
        ClearRate,
        Slider(f64),
        ButtonsEnabled(bool),
        PositionEnabled(bool),
        RateEnabled(bool),
        Paused,
        Channels(Vec<String>),
        Error { message: String, disconnected: bool },
        Connection(Option<String>),
        Terminated(PlaybackSettings),
    }

    /// Feedback that records every callback for later inspection
    #[derive(Debug, Default)]
    pub struct RecordingFeedback {
        events: Mutex<Vec<FeedbackEvent>>,
    }

    impl RecordingFeedback {
        pub fn events(&self) -> Vec<FeedbackEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn positions(&self) -> Vec<f64> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    FeedbackEvent::Position(t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        pub fn errors(&self) -> Vec<(String, bool)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    FeedbackEvent::Error { message, disconnected } => Some((message, disconnected)),
                    _ => None,
                })
                .collect()
        }

        pub fn last_slider(&self) -> Option<f64> {
            self.events().into_iter().rev().find_map(|e| match e {
                FeedbackEvent::Slider(f) => Some(f),
                _ => None,
            })
        }

        pub fn clear(&self) {
            self.events.lock().unwrap().clear();
        }

        fn push(&self, event: FeedbackEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl PlayerFeedback for RecordingFeedback {
        fn display_position(&self, time: f64) {
            self.push(FeedbackEvent::Position(time));
        }

        fn display_rate(&self, rate: f64) {
            self.push(FeedbackEvent::Rate(rate));
        }

        fn clear_rate_display(&self) {
            self.push(FeedbackEvent::ClearRate);
        }

        fn set_slider(&self, fraction: f64) {
            self.push(FeedbackEvent::Slider(fraction));
        }

        fn set_buttons_enabled(&self, enabled: bool) {
            self.push(FeedbackEvent::ButtonsEnabled(enabled));
        }

        fn set_position_enabled(&self, enabled: bool) {
            self.push(FeedbackEvent::PositionEnabled(enabled));
        }

        fn set_rate_enabled(&self, enabled: bool) {
            self.push(FeedbackEvent::RateEnabled(enabled));
        }

        fn paused(&self) {
            self.push(FeedbackEvent::Paused);
        }

        fn channels_available(&self, channels: &[String]) {
            self.push(FeedbackEvent::Channels(channels.to_vec()));
        }

        fn report_error(&self, _context: &str, error: &PlayerError, disconnected: bool) {
            self.push(FeedbackEvent::Error {
                message: error.to_string(),
                disconnected,
            });
        }

        fn connection_changed(&self, output: Option<&str>) {
            self.push(FeedbackEvent::Connection(output.map(str::to_string)));
        }

        fn terminated(&self, settings: &PlaybackSettings) {
            self.push(FeedbackEvent::Terminated(*settings));
        }
    }
}
