//! Line-oriented console front-end: parses typed commands into scheduler
//! calls and renders engine feedback on stderr.

use crate::error::PlayerError;
use crate::playback::{
    format_position, format_rate, ConnectParams, Direction, Limit, PlaybackSettings,
    PlayerFeedback, Scheduler, TimeFormat,
};
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

pub const HELP: &str = "\
commands:
  play | back          play forward / backward
  step | rstep         single step forward / backward
  pause                stop the running command
  begin | end          seek to the start / end of the data
  rt                   follow the live edge
  seek <time>          move to an absolute time
  rate <x>             playback rate, > 0
  dur <seconds>        window width, 0 for single-point mode
  inc <fraction>       step size as a fraction of the window
  chans <a,b,...>      select channels
  connect | disconnect
  help | quit";

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Play(Direction),
    Step(Direction),
    Pause,
    Limit(Limit),
    Realtime,
    Seek(f64),
    Rate(f64),
    Duration(f64),
    Increment(f64),
    Channels(Vec<String>),
    Connect,
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("Not a number: '{0}'")]
    InvalidNumber(String),

    #[error("{name} must be {requirement}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
    },
}

fn number(keyword: &'static str, arg: Option<&str>) -> Result<f64, ParseError> {
    let arg = arg.ok_or(ParseError::MissingArgument(keyword))?;
    match arg.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidNumber(arg.to_string())),
    }
}

impl FromStr for ConsoleCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let keyword = keyword.to_lowercase();
        let rest = rest.trim();
        let arg = rest.split_whitespace().next();

        let command = match keyword.as_str() {
            "play" | "p" => ConsoleCommand::Play(Direction::Forward),
            "back" | "b" => ConsoleCommand::Play(Direction::Backward),
            "step" | "s" => ConsoleCommand::Step(Direction::Forward),
            "rstep" | "r" => ConsoleCommand::Step(Direction::Backward),
            "pause" | "stop" => ConsoleCommand::Pause,
            "begin" | "home" => ConsoleCommand::Limit(Limit::Min),
            "end" => ConsoleCommand::Limit(Limit::Max),
            "rt" | "realtime" => ConsoleCommand::Realtime,
            "seek" => ConsoleCommand::Seek(number("seek", arg)?),
            "rate" => {
                let rate = number("rate", arg)?;
                if rate <= 0.0 {
                    return Err(ParseError::OutOfRange {
                        name: "rate",
                        requirement: "greater than zero",
                    });
                }
                ConsoleCommand::Rate(rate)
            }
            "dur" | "duration" => {
                let duration = number("dur", arg)?;
                if duration < 0.0 {
                    return Err(ParseError::OutOfRange {
                        name: "duration",
                        requirement: "zero or more",
                    });
                }
                ConsoleCommand::Duration(duration)
            }
            "inc" | "increment" => {
                let fraction = number("inc", arg)?;
                if fraction <= 0.0 {
                    return Err(ParseError::OutOfRange {
                        name: "increment",
                        requirement: "greater than zero",
                    });
                }
                ConsoleCommand::Increment(fraction)
            }
            "chans" | "channels" => {
                if rest.is_empty() {
                    return Err(ParseError::MissingArgument("chans"));
                }
                let names: Vec<String> = rest
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                ConsoleCommand::Channels(names)
            }
            "connect" => ConsoleCommand::Connect,
            "disconnect" => ConsoleCommand::Disconnect,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

impl ConsoleCommand {
    /// Hand the command to the scheduler; false once the session should end
    pub fn execute(self, scheduler: &Scheduler, session: &ConnectParams) -> bool {
        match self {
            ConsoleCommand::Play(direction) => scheduler.play(direction),
            ConsoleCommand::Step(direction) => scheduler.step(direction),
            ConsoleCommand::Pause => scheduler.pause(),
            ConsoleCommand::Limit(limit) => scheduler.go_to_limit(limit),
            ConsoleCommand::Realtime => scheduler.realtime(),
            ConsoleCommand::Seek(time) => scheduler.seek(time),
            ConsoleCommand::Rate(rate) => scheduler.set_rate(rate),
            ConsoleCommand::Duration(duration) => scheduler.set_duration(duration),
            ConsoleCommand::Increment(fraction) => scheduler.set_increment_fraction(fraction),
            ConsoleCommand::Channels(names) => {
                scheduler.select_channels(names, session.use_short_names)
            }
            ConsoleCommand::Connect => scheduler.connect(session.clone()),
            ConsoleCommand::Disconnect => scheduler.disconnect(),
            ConsoleCommand::Help => eprintln!("{}", HELP),
            ConsoleCommand::Quit => return false,
        }
        true
    }
}

#[derive(Debug, Default)]
struct Status {
    position: Option<f64>,
    rate: Option<f64>,
    fraction: f64,
}

fn status_line(status: &Status, format: TimeFormat) -> String {
    let position = status
        .position
        .map(|t| format_position(t, format))
        .unwrap_or_else(|| "-".to_string());
    let rate = status.rate.map(format_rate).unwrap_or_default();
    format!("[{:>5.1}%] {} {}", status.fraction * 100.0, position, rate)
}

/// Feedback rendered as a single refreshing status line on stderr
pub struct ConsoleFeedback {
    format: TimeFormat,
    status: Mutex<Status>,
}

impl ConsoleFeedback {
    pub fn new(format: TimeFormat) -> Self {
        Self {
            format,
            status: Mutex::new(Status::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Status)) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut status);
        let line = status_line(&status, self.format);
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{:<60}", line);
        let _ = stderr.flush();
    }
}

impl PlayerFeedback for ConsoleFeedback {
    fn display_position(&self, time: f64) {
        self.update(|s| s.position = Some(time));
    }

    fn display_rate(&self, rate: f64) {
        self.update(|s| s.rate = Some(rate));
    }

    fn clear_rate_display(&self) {
        self.update(|s| s.rate = None);
    }

    fn set_slider(&self, fraction: f64) {
        self.update(|s| s.fraction = fraction.clamp(0.0, 1.0));
    }

    fn channels_available(&self, channels: &[String]) {
        eprintln!("\navailable: {}", channels.join(", "));
    }

    fn report_error(&self, context: &str, error: &PlayerError, disconnected: bool) {
        if disconnected {
            eprintln!("\nError while {}: {} (disconnected)", context, error);
        } else {
            eprintln!("\nError while {}: {}", context, error);
        }
    }

    fn connection_changed(&self, output: Option<&str>) {
        match output {
            Some(name) => eprintln!("\nconnected, output '{}'", name),
            None => eprintln!("\ndisconnected"),
        }
    }

    fn terminated(&self, settings: &PlaybackSettings) {
        info!(
            "Final settings: duration {} increment {} rate {}",
            settings.duration, settings.increment_fraction, settings.rate
        );
    }
}
