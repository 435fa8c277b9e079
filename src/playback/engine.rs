use crate::core::{is_hidden_channel, Bounds, ChannelSet, Frame, LimitState};
use crate::error::{PlayerError, PlayerResult};
use crate::output::PlaybackOutput;
use crate::playback::{
    ChangeKind, ConnectParams, Connector, Direction, EngineSignals, Limit, PlaybackMode,
    PlaybackSettings, PlaybackState, PlayerFeedback, StepOutcome,
};
use crate::store::{DataStore, FetchDirection};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Borrow an open connection, or fail with `NotConnected`
pub(super) fn connected<T: ?Sized>(slot: &mut Option<Box<T>>) -> PlayerResult<&mut T> {
    slot.as_deref_mut().ok_or(PlayerError::NotConnected)
}

/// Playback state machine. Lives on the scheduler's worker thread; other
/// threads reach it only through `EngineSignals`.
pub struct PlaybackEngine {
    pub(super) signals: Arc<EngineSignals>,
    pub(super) feedback: Arc<dyn PlayerFeedback>,
    connector: Box<dyn Connector>,
    pub(super) store: Option<Box<dyn DataStore>>,
    output: Option<Box<dyn PlaybackOutput>>,
    pub(super) channels: ChannelSet,

    /// Start time of the current request
    pub(super) position: f64,
    pub(super) duration: f64,
    pub(super) increment: f64,
    increment_fraction: f64,
    pub(super) rate: f64,
    mode: PlaybackMode,
    pub(super) bounds: Bounds,

    /// Result of the latest fetch, empty channels removed
    pub(super) fetched: Frame,
    /// Latest frame actually handed to the output
    pub(super) last_output: Option<Frame>,
}

impl PlaybackEngine {
    pub fn new(
        signals: Arc<EngineSignals>,
        feedback: Arc<dyn PlayerFeedback>,
        connector: Box<dyn Connector>,
    ) -> Self {
        let settings = signals.settings();
        let defaults = PlaybackSettings::default();
        let mut engine = Self {
            signals,
            feedback,
            connector,
            store: None,
            output: None,
            channels: ChannelSet::new(),
            position: 0.0,
            duration: defaults.duration,
            increment: defaults.increment(),
            increment_fraction: defaults.increment_fraction,
            rate: defaults.rate,
            mode: defaults.mode,
            bounds: Bounds::default(),
            fetched: Frame::empty(),
            last_output: None,
        };
        engine.apply_settings(settings);
        engine
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some() && self.output.is_some()
    }

    /// Settings currently in effect on the worker
    pub fn active_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            duration: self.duration,
            increment_fraction: self.increment_fraction,
            rate: self.rate,
            mode: self.mode,
        }
    }

    // Connections and channels

    /// Open the store and output, returning the output's name
    pub fn connect(&mut self, params: &ConnectParams) -> PlayerResult<String> {
        self.signals.set_state(PlaybackState::Connecting);
        let store = self.connector.open_store(&params.store_address)?;
        let output = self.connector.open_output(&params.output, params.cache_size)?;
        let name = output.name().to_string();

        self.store = Some(store);
        self.output = Some(output);
        self.channels.clear();
        self.fetched = Frame::empty();
        self.last_output = None;
        self.position = 0.0;
        self.bounds = Bounds::default();

        info!("Connected to '{}', output '{}'", params.store_address, name);
        self.feedback.connection_changed(Some(&name));
        self.do_pause();
        Ok(name)
    }

    pub fn disconnect(&mut self) {
        self.signals.set_state(PlaybackState::Disconnected);
        let was_connected = self.store.is_some() || self.output.is_some();

        if let Some(mut store) = self.store.take() {
            store.close();
        }
        if let Some(mut output) = self.output.take() {
            output.disconnect();
        }
        self.channels.clear();

        self.feedback.set_buttons_enabled(false);
        self.feedback.set_position_enabled(false);
        if was_connected {
            info!("Disconnected");
            self.feedback.connection_changed(None);
        }
    }

    /// Channels offered for selection; names under a `_` root are internal
    pub fn available_channels(&mut self) -> PlayerResult<Vec<String>> {
        let store = connected(&mut self.store)?;
        let channels = store
            .list_channels()?
            .into_iter()
            .filter(|name| !is_hidden_channel(name))
            .collect();
        Ok(channels)
    }

    /// Replace the working channel set, register it with the output and
    /// seek to the end of the data.
    pub fn select_channels(&mut self, names: &[String], use_short_names: bool) -> PlayerResult<()> {
        if names.is_empty() {
            return Err(PlayerError::EmptyChannelSet);
        }
        self.signals.set_state(PlaybackState::SelectingChannels);
        self.feedback.set_position_enabled(false);
        self.feedback.set_buttons_enabled(false);

        self.channels = ChannelSet::from_names(names.iter().cloned());
        self.fetched = Frame::empty();
        self.last_output = None;

        let store = connected(&mut self.store)?;
        let registration = store.query_bounds(&self.channels)?;
        let output = connected(&mut self.output)?;
        let output_name = output.name().to_string();
        output
            .register_channels(&registration, use_short_names)
            .map_err(|e| PlayerError::from_output(&output_name, e))?;

        // Pick up whatever the user has set, even if unchanged
        self.signals.touch();
        self.seek_limit(Limit::Max)?;

        info!("Selected {} channel(s)", self.channels.len());
        self.feedback.set_position_enabled(true);
        self.feedback.set_buttons_enabled(true);
        self.do_pause();
        Ok(())
    }

    /// Refresh `bounds` from the store's registration of the selected channels
    pub(super) fn reset_min_max_times(&mut self) -> PlayerResult<()> {
        let store = connected(&mut self.store)?;
        let registration = store.query_bounds(&self.channels)?;
        self.bounds = Bounds::from_registration(&registration).ok_or(PlayerError::EmptyChannelSet)?;
        trace!("Bounds [{}, {}]", self.bounds.min, self.bounds.max);
        Ok(())
    }

    // Fetching

    /// Fetch the window at the current position into `fetched`
    pub(super) fn fetch(&mut self, direction: Direction, force_absolute: bool) -> PlayerResult<()> {
        let start = match direction {
            Direction::Forward => self.position,
            Direction::Backward => self.position - self.duration,
        };
        let keyword = FetchDirection::for_step(self.duration, force_absolute, direction.is_forward());

        let store = connected(&mut self.store)?;
        let mut frame = store.fetch_window(&self.channels, start, self.duration, keyword)?;
        let remaining = frame.retain_with_data();
        trace!("Fetched {} channel(s) at {} ({})", remaining, start, keyword);
        self.fetched = frame;
        Ok(())
    }

    /// Fetch, and hand the result to the output when `output_data` is set
    pub(super) fn step(
        &mut self,
        direction: Direction,
        force_absolute: bool,
        output_data: bool,
    ) -> PlayerResult<StepOutcome> {
        self.fetch(direction, force_absolute)?;
        if self.fetched.is_empty() {
            return Ok(StepOutcome::GotNullFrame);
        }
        if output_data {
            self.emit_fetched()?;
        }
        Ok(StepOutcome::Normal)
    }

    pub(super) fn emit_fetched(&mut self) -> PlayerResult<()> {
        let output = connected(&mut self.output)?;
        output
            .emit(&self.fetched)
            .map_err(|e| PlayerError::from_output(output.name(), e))?;
        self.last_output = Some(self.fetched.clone());
        Ok(())
    }

    /// Newest end time the store holds for the selected channels
    pub(super) fn fetch_newest_time(&mut self) -> PlayerResult<Option<f64>> {
        let store = connected(&mut self.store)?;
        let registration = store.query_bounds(&self.channels)?;
        Ok(registration.iter().map(|c| c.end()).reduce(f64::max))
    }

    /// Move by one increment, or onto the last fetched point in single-point mode
    pub(super) fn increment_position(&mut self, direction: Direction) {
        if self.duration == 0.0 {
            if let Some(start) = self.fetched.last_start_time() {
                self.position = start;
            }
        } else {
            self.position += direction.sign() * self.increment;
        }
    }

    pub(super) fn at_edge(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.position >= self.bounds.max,
            Direction::Backward => self.position <= self.bounds.min,
        }
    }

    // Commands

    /// Single step in `direction`, or a seek to `target` when given
    pub fn take_a_step(
        &mut self,
        direction: Direction,
        target: Option<f64>,
        reset_bounds: bool,
    ) -> PlayerResult<()> {
        self.signals.set_state(PlaybackState::Stepping);
        if reset_bounds {
            self.reset_min_max_times()?;
        }

        match target {
            Some(time) => {
                self.position = time;
                if self.bounds.limit_state(time) != LimitState::Within {
                    self.position = self.bounds.clamp(time);
                    self.display_position();
                    self.evaluate_limits();
                    self.acknowledge_interrupt();
                    return Ok(());
                }
            }
            None if self.at_edge(direction) => {
                self.evaluate_limits();
                self.acknowledge_interrupt();
                return Ok(());
            }
            None => {}
        }

        self.handle_variable_changes();
        let seeking = target.is_some();
        if !seeking && !(self.duration == 0.0 && self.fetched.last_start_time().is_none()) {
            self.increment_position(direction);
        }

        self.step(direction, seeking, true)?;

        if !seeking && self.duration == 0.0 {
            self.position = match self.fetched.last_start_time() {
                Some(start) => start,
                None if direction.is_forward() => self.bounds.max,
                None => self.bounds.min,
            };
        }
        if reset_bounds {
            self.position = self.bounds.clamp(self.position);
        }
        self.display_position();
        if reset_bounds {
            self.evaluate_limits();
        }
        self.acknowledge_interrupt();
        Ok(())
    }

    /// Seek to the start or end of the data and output what is there
    pub fn go_to_limit(&mut self, limit: Limit) -> PlayerResult<()> {
        self.signals.set_state(PlaybackState::Stepping);
        self.seek_limit(limit)?;
        self.acknowledge_interrupt();
        Ok(())
    }

    /// `go_to_limit` without touching the engine state
    fn seek_limit(&mut self, limit: Limit) -> PlayerResult<()> {
        self.reset_min_max_times()?;
        self.handle_variable_changes();

        self.position = match limit {
            Limit::Min => self.bounds.min,
            Limit::Max => (self.bounds.max - self.duration).max(self.bounds.min),
        };
        debug!("Seek to {:?} at {}", limit, self.position);
        self.step(Direction::Forward, true, true)?;

        self.display_position();
        self.feedback.set_slider(match limit {
            Limit::Min => 0.0,
            Limit::Max => 1.0,
        });
        Ok(())
    }

    /// Report the slider position and classify the current position
    pub(super) fn evaluate_limits(&self) -> LimitState {
        self.feedback.set_slider(self.bounds.fraction(self.position));
        self.bounds.limit_state(self.position)
    }

    // Parameter changes

    pub(super) fn init_variables(&mut self) {
        let settings = self.signals.take_all();
        self.apply_settings(settings);
    }

    pub(super) fn handle_variable_changes(&mut self) -> ChangeKind {
        let (kind, settings) = self.signals.take_changes();
        if kind != ChangeKind::None {
            self.apply_settings(settings);
        }
        kind
    }

    fn apply_settings(&mut self, settings: PlaybackSettings) {
        self.mode = settings.mode;
        if settings.duration.is_finite() && settings.duration >= 0.0 {
            self.duration = settings.duration;
        } else {
            warn!("Ignoring invalid duration {}", settings.duration);
        }
        if settings.increment_fraction.is_finite() && settings.increment_fraction > 0.0 {
            self.increment_fraction = settings.increment_fraction;
        } else {
            warn!("Ignoring invalid increment fraction {}", settings.increment_fraction);
        }
        self.increment = self.increment_fraction * self.duration;
        if settings.rate.is_finite() && settings.rate > 0.0 {
            self.rate = settings.rate;
        } else {
            warn!("Ignoring invalid rate {}", settings.rate);
        }
    }

    // Feedback

    pub(super) fn display_position(&self) {
        self.feedback.display_position(self.position);
    }

    pub fn do_pause(&self) {
        self.signals.set_state(PlaybackState::Paused);
        self.feedback.paused();
    }

    /// End of every command: back to Paused whether or not it was interrupted
    pub(super) fn acknowledge_interrupt(&self) {
        if !self.signals.acknowledge_interrupt() {
            self.feedback.paused();
        }
    }
}
