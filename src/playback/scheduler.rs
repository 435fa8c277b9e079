use crate::error::PlayerError;
use crate::playback::{
    Command, ConnectParams, Connector, Direction, EngineSignals, Limit, PlaybackEngine,
    PlaybackMode, PlaybackSettings, PlaybackState, PlayerFeedback,
};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct MailboxState {
    /// At most one unconsumed command; newer posts replace it
    pending: Option<Command>,
    busy: bool,
    /// Connected with channels selected
    connected: bool,
}

#[derive(Debug, Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    ready: Condvar,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Initial engine state for a command, set as the worker picks it up
fn entry_state(command: &Command) -> PlaybackState {
    match command {
        Command::Play { .. } => PlaybackState::Playing,
        Command::Step { .. } | Command::SeekLimit(_) => PlaybackState::Stepping,
        Command::Realtime => PlaybackState::Realtime,
        Command::Connect(_) => PlaybackState::Connecting,
        Command::SelectChannels { .. } => PlaybackState::SelectingChannels,
        Command::Disconnect => PlaybackState::Disconnected,
        Command::Terminate => PlaybackState::Terminating,
    }
}

/// Serializes commands onto a single worker thread that owns the engine.
///
/// Posting is last-writer-wins: a burst of posts before the worker picks
/// one up collapses to the most recent.
pub struct Scheduler {
    mailbox: Arc<Mailbox>,
    signals: Arc<EngineSignals>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(
        settings: PlaybackSettings,
        feedback: Arc<dyn PlayerFeedback>,
        connector: Box<dyn Connector>,
    ) -> std::io::Result<Self> {
        let signals = Arc::new(EngineSignals::new(settings));
        let mailbox = Arc::new(Mailbox::default());
        let engine = PlaybackEngine::new(signals.clone(), feedback.clone(), connector);

        let worker = {
            let mailbox = mailbox.clone();
            let signals = signals.clone();
            thread::Builder::new()
                .name("playback".to_string())
                .spawn(move || run_worker(engine, mailbox, signals, feedback))?
        };

        Ok(Self {
            mailbox,
            signals,
            worker: Some(worker),
        })
    }

    pub fn signals(&self) -> &Arc<EngineSignals> {
        &self.signals
    }

    /// Queue a command, interrupting whatever is running
    pub fn post(&self, command: Command) {
        let mut mailbox = self.mailbox.lock();
        self.signals.interrupt();
        if let Some(dropped) = mailbox.pending.replace(command) {
            debug!("Dropped unconsumed {} command", dropped.kind());
        }
        self.mailbox.ready.notify_all();
    }

    /// Queue a command only when the worker is idle and connected; returns
    /// whether it was queued.
    pub fn post_if_idle(&self, command: Command) -> bool {
        let mut mailbox = self.mailbox.lock();
        if mailbox.busy || !mailbox.connected || mailbox.pending.is_some() {
            return false;
        }
        mailbox.pending = Some(command);
        self.mailbox.ready.notify_all();
        true
    }

    pub fn is_busy(&self) -> bool {
        self.mailbox.lock().busy
    }

    pub fn is_connected(&self) -> bool {
        self.mailbox.lock().connected
    }

    /// Block until nothing is queued or running; false on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.mailbox.lock();
        while state.busy || state.pending.is_some() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .mailbox
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    // Front-end actions

    pub fn play(&self, direction: Direction) {
        self.post(Command::Play { direction });
    }

    pub fn step(&self, direction: Direction) {
        self.post(Command::Step {
            direction,
            target: None,
            reset_bounds: true,
        });
    }

    /// Move to an absolute time, as dragging the position slider does
    pub fn seek(&self, time: f64) {
        self.post(Command::Step {
            direction: Direction::Forward,
            target: Some(time),
            reset_bounds: false,
        });
    }

    pub fn go_to_limit(&self, limit: Limit) {
        self.post(Command::SeekLimit(limit));
    }

    pub fn realtime(&self) {
        self.post(Command::Realtime);
    }

    /// Stop the running command. A no-op when already paused.
    pub fn pause(&self) {
        self.signals.interrupt();
    }

    pub fn connect(&self, params: ConnectParams) {
        self.post(Command::Connect(params));
    }

    pub fn select_channels(&self, names: Vec<String>, use_short_names: bool) {
        self.post(Command::SelectChannels {
            names,
            use_short_names,
        });
    }

    pub fn disconnect(&self) {
        self.post(Command::Disconnect);
    }

    /// Change the window width; refetches at once when idle
    pub fn set_duration(&self, duration: f64) {
        self.signals.set_duration(duration);
        self.post_if_idle(refresh_step());
    }

    pub fn set_rate(&self, rate: f64) {
        self.signals.set_rate(rate);
    }

    pub fn set_increment_fraction(&self, fraction: f64) {
        self.signals.set_increment_fraction(fraction);
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        self.signals.set_mode(mode);
        self.post_if_idle(refresh_step());
    }

    /// Stop the worker and wait for it to exit
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.post(Command::Terminate);
            if worker.join().is_err() {
                error!("Playback worker panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn refresh_step() -> Command {
    Command::Step {
        direction: Direction::Forward,
        target: None,
        reset_bounds: false,
    }
}

fn run_worker(
    mut engine: PlaybackEngine,
    mailbox: Arc<Mailbox>,
    signals: Arc<EngineSignals>,
    feedback: Arc<dyn PlayerFeedback>,
) {
    info!("Playback worker started");
    loop {
        let command = {
            let mut state = mailbox.lock();
            let command = loop {
                if let Some(command) = state.pending.take() {
                    break command;
                }
                state = mailbox
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            };
            state.busy = true;
            // Under the mailbox lock so a later post always sees an interruptible state
            signals.reset_nap();
            signals.set_state(entry_state(&command));
            command
        };
        debug!("Executing {} command", command.kind());

        if matches!(command, Command::Terminate) {
            engine.disconnect();
            signals.set_state(PlaybackState::Terminating);
            feedback.terminated(&signals.settings());
            let mut state = mailbox.lock();
            state.busy = false;
            state.connected = false;
            mailbox.ready.notify_all();
            break;
        }

        dispatch(&mut engine, command, &*feedback);

        // Failed commands can leave a transient state behind
        if !matches!(signals.state(), PlaybackState::Paused | PlaybackState::Disconnected) {
            signals.acknowledge_interrupt();
        }
        let connected = engine.is_connected() && !engine.channels().is_empty();
        let mut state = mailbox.lock();
        state.connected = connected;
        state.busy = false;
        mailbox.ready.notify_all();
    }
    info!("Playback worker stopped");
}

fn dispatch(engine: &mut PlaybackEngine, command: Command, feedback: &dyn PlayerFeedback) {
    let (context, result) = match command {
        Command::Play { direction } => ("playing", engine.play(direction)),
        Command::Step {
            direction,
            target,
            reset_bounds,
        } => ("taking a single step", engine.take_a_step(direction, target, reset_bounds)),
        Command::SeekLimit(limit) => ("fetching data limit", engine.go_to_limit(limit)),
        Command::Realtime => ("realtiming", engine.realtime()),
        Command::Connect(params) => {
            engine.do_pause();
            engine.disconnect();
            let result = engine.connect(&params).and_then(|_| {
                let names = if params.channels.is_empty() {
                    let available = engine.available_channels()?;
                    feedback.channels_available(&available);
                    available
                } else {
                    params.channels.clone()
                };
                engine.select_channels(&names, params.use_short_names)
            });
            ("connecting", result)
        }
        Command::SelectChannels {
            names,
            use_short_names,
        } => {
            engine.do_pause();
            ("selecting input channels", engine.select_channels(&names, use_short_names))
        }
        Command::Disconnect => {
            engine.do_pause();
            engine.disconnect();
            ("disconnecting", Ok(()))
        }
        Command::Terminate => ("terminating", Ok(())),
    };

    if let Err(err) = result {
        handle_error(engine, context, &err, feedback);
    }
}

/// Report a failed command; unexpected errors end the session
fn handle_error(engine: &mut PlaybackEngine, context: &str, err: &PlayerError, feedback: &dyn PlayerFeedback) {
    if err.is_user_facing() {
        warn!("Error while {}: {}", context, err);
        feedback.report_error(context, err, false);
    } else {
        error!("Error while {}: {}", context, err);
        engine.disconnect();
        feedback.report_error(context, err, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SampleValue;
    use crate::output::testing::OutputLog;
    use crate::playback::feedback::testing::{FeedbackEvent, RecordingFeedback};
    use crate::playback::testing::{connect_params, ramp_store, TestConnector};
    use crate::store::MemoryStore;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    struct Running {
        scheduler: Scheduler,
        feedback: Arc<RecordingFeedback>,
        output: Arc<Mutex<OutputLog>>,
    }

    impl Running {
        fn emitted_starts(&self) -> Vec<f64> {
            self.output
                .lock()
                .unwrap()
                .frames
                .iter()
                .filter_map(|f| f.last_start_time())
                .collect()
        }
    }

    fn start(connector: TestConnector, output: Arc<Mutex<OutputLog>>, settings: PlaybackSettings) -> Running {
        let feedback = Arc::new(RecordingFeedback::default());
        let scheduler = Scheduler::spawn(settings, feedback.clone(), Box::new(connector)).unwrap();
        Running {
            scheduler,
            feedback,
            output,
        }
    }

    /// Scheduler connected to eleven points at t = 0..10 on "src/a"
    fn connected(settings: PlaybackSettings) -> Running {
        let (connector, output) = TestConnector::new(ramp_store("src/a", 11, 1.0));
        let running = start(connector, output, settings);
        running.scheduler.connect(connect_params(&["src/a"]));
        assert!(running.scheduler.wait_idle(WAIT));
        assert!(running.scheduler.is_connected());
        running
    }

    #[test]
    fn test_connect_selects_and_seeks_to_end() {
        let running = connected(PlaybackSettings::default());
        assert_eq!(running.output.lock().unwrap().registered, vec!["src/a".to_string()]);
        assert_eq!(running.emitted_starts(), vec![9.0]);
        assert_eq!(running.feedback.last_slider(), Some(1.0));
        assert!(running
            .feedback
            .events()
            .contains(&FeedbackEvent::Connection(Some("recorder".to_string()))));
        assert_eq!(running.scheduler.signals().state(), PlaybackState::Paused);
    }

    #[test]
    fn test_connect_without_channels_selects_visible_ones() {
        let store = ramp_store("src/a", 3, 1.0);
        store.append("_log/x", 0.0, SampleValue::Float64(0.0)).unwrap();
        let (connector, output) = TestConnector::new(store);
        let running = start(connector, output, PlaybackSettings::default());

        running.scheduler.connect(connect_params(&[]));
        assert!(running.scheduler.wait_idle(WAIT));

        assert!(running
            .feedback
            .events()
            .contains(&FeedbackEvent::Channels(vec!["src/a".to_string()])));
        assert_eq!(running.output.lock().unwrap().registered, vec!["src/a".to_string()]);
    }

    #[test]
    fn test_failed_connect_is_reported_as_disconnect() {
        let (connector, output) = TestConnector::new(MemoryStore::new("elsewhere"));
        let running = start(connector, output, PlaybackSettings::default());

        running.scheduler.connect(connect_params(&["src/a"]));
        assert!(running.scheduler.wait_idle(WAIT));

        let errors = running.feedback.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1);
        assert!(!running.scheduler.is_connected());
    }

    #[test]
    fn test_empty_selection_keeps_connection() {
        let running = connected(PlaybackSettings::default());
        running.feedback.clear();

        running.scheduler.select_channels(Vec::new(), true);
        assert!(running.scheduler.wait_idle(WAIT));

        assert_eq!(
            running.feedback.errors(),
            vec![(PlayerError::EmptyChannelSet.to_string(), false)]
        );
        assert!(running.scheduler.is_connected());
    }

    #[test]
    fn test_pending_commands_collapse_to_latest() {
        let (tx, rx) = mpsc::channel();
        let (mut connector, output) = TestConnector::new(ramp_store("src/a", 11, 1.0));
        connector.gate = Some(rx);
        let running = start(connector, output, PlaybackSettings::default());

        running.scheduler.connect(connect_params(&["src/a"]));
        let deadline = Instant::now() + WAIT;
        while !running.scheduler.is_busy() {
            assert!(Instant::now() < deadline, "worker never picked up connect");
            thread::sleep(Duration::from_millis(1));
        }

        // Connect is blocked; only the last of these should run
        running.scheduler.go_to_limit(Limit::Min);
        running.scheduler.seek(3.5);
        tx.send(()).unwrap();
        assert!(running.scheduler.wait_idle(WAIT));

        assert_eq!(running.emitted_starts(), vec![9.0, 4.0]);
        assert_eq!(running.feedback.positions(), vec![9.0, 3.5]);
    }

    #[test]
    fn test_pause_when_paused_does_nothing() {
        let running = connected(PlaybackSettings::default());
        running.feedback.clear();

        running.scheduler.pause();
        running.scheduler.pause();
        thread::sleep(Duration::from_millis(50));

        assert!(running.feedback.events().is_empty());
        assert!(!running.scheduler.is_busy());
        assert_eq!(running.scheduler.signals().state(), PlaybackState::Paused);
    }

    #[test]
    fn test_live_edits_need_a_connection() {
        let (connector, output) = TestConnector::new(ramp_store("src/a", 11, 1.0));
        let running = start(connector, output, PlaybackSettings::default());

        running.scheduler.set_duration(2.0);
        assert!(!running.scheduler.is_busy());
        assert!(running.scheduler.wait_idle(WAIT));
        assert_eq!(running.output.lock().unwrap().frames.len(), 0);
    }

    #[test]
    fn test_duration_change_refetches_when_idle() {
        let running = connected(PlaybackSettings::default());
        running.scheduler.seek(3.5);
        assert!(running.scheduler.wait_idle(WAIT));
        running.output.lock().unwrap().frames.clear();

        running.scheduler.set_duration(2.0);
        assert!(running.scheduler.wait_idle(WAIT));

        // One 2 s increment on, then a 2 s window
        assert_eq!(running.emitted_starts(), vec![6.0]);
        let log = running.output.lock().unwrap();
        assert_eq!(log.frames[0].channels[0].times, vec![6.0, 7.0]);
    }

    #[test]
    fn test_seek_interrupts_play() {
        let running = connected(PlaybackSettings {
            rate: 0.5,
            ..Default::default()
        });
        running.scheduler.go_to_limit(Limit::Min);
        assert!(running.scheduler.wait_idle(WAIT));

        running.scheduler.play(Direction::Forward);
        thread::sleep(Duration::from_millis(100));
        assert!(running.scheduler.is_busy());

        running.scheduler.seek(5.5);
        assert!(running.scheduler.wait_idle(WAIT));
        assert_eq!(running.feedback.positions().last(), Some(&5.5));
        assert_eq!(running.emitted_starts().last(), Some(&6.0));
        assert_eq!(running.scheduler.signals().state(), PlaybackState::Paused);
    }

    #[test]
    fn test_terminate_reports_final_settings() {
        let running = connected(PlaybackSettings::default());
        running.scheduler.set_rate(3.0);

        let Running {
            scheduler,
            feedback,
            output,
        } = running;
        scheduler.terminate();

        let settings = feedback.events().into_iter().find_map(|e| match e {
            FeedbackEvent::Terminated(settings) => Some(settings),
            _ => None,
        });
        assert_eq!(settings.map(|s| s.rate), Some(3.0));
        assert!(output.lock().unwrap().disconnected);
    }
}
