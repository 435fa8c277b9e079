use crate::playback::{ChangeKind, PlaybackMode, PlaybackSettings, PlaybackState};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct PendingChange {
    settings: PlaybackSettings,
    mode_changed: bool,
    param_changed: bool,
}

#[derive(Debug)]
struct Control {
    state: PlaybackState,
    interrupted: bool,
}

/// Wakeable sleep used for pacing naps
#[derive(Debug, Default)]
struct NapSignal {
    woken: Mutex<bool>,
    wake: Condvar,
}

impl NapSignal {
    fn wake(&self) {
        *lock(&self.woken) = true;
        self.wake.notify_all();
    }

    fn reset(&self) {
        *lock(&self.woken) = false;
    }

    fn sleep(&self, millis: i64) -> f64 {
        if millis <= 0 {
            return 0.0;
        }
        let requested = Duration::from_millis(millis as u64);
        let started = Instant::now();
        let deadline = started + requested;

        let mut woken = lock(&self.woken);
        while !*woken {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            woken = self
                .wake
                .wait_timeout(woken, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *woken = false;
        drop(woken);

        started.elapsed().as_secs_f64() * 1000.0 - millis as f64
    }
}

/// State shared between the worker thread and callers on other threads.
///
/// Three separately locked regions: the pending parameter change, the
/// current action with its interrupt flag, and the nap wake signal.
#[derive(Debug)]
pub struct EngineSignals {
    pending: Mutex<PendingChange>,
    control: Mutex<Control>,
    nap: NapSignal,
}

impl EngineSignals {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self {
            pending: Mutex::new(PendingChange {
                settings,
                mode_changed: false,
                param_changed: true,
            }),
            control: Mutex::new(Control {
                state: PlaybackState::Disconnected,
                interrupted: false,
            }),
            nap: NapSignal::default(),
        }
    }

    // Interrupt protocol

    /// Ask the running command to stop. Ignored unless the current action
    /// is interruptible; returns whether the flag was set.
    pub fn interrupt(&self) -> bool {
        let set = {
            let mut control = lock(&self.control);
            if control.state.is_interruptible() {
                control.interrupted = true;
                true
            } else {
                false
            }
        };
        if set {
            self.nap.wake();
        }
        set
    }

    pub fn was_interrupted(&self) -> bool {
        lock(&self.control).interrupted
    }

    /// Clear the flag and return to Paused; returns whether it was set
    pub fn acknowledge_interrupt(&self) -> bool {
        let mut control = lock(&self.control);
        let was_set = control.interrupted;
        control.interrupted = false;
        control.state = PlaybackState::Paused;
        was_set
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.control).state
    }

    pub fn set_state(&self, state: PlaybackState) {
        let mut control = lock(&self.control);
        if control.state != state {
            trace!("Engine state {:?} -> {:?}", control.state, state);
        }
        control.state = state;
    }

    // Pending parameter changes

    pub fn set_rate(&self, rate: f64) {
        self.update(|p| p.settings.rate = rate);
    }

    pub fn set_duration(&self, duration: f64) {
        self.update(|p| p.settings.duration = duration);
    }

    pub fn set_increment_fraction(&self, fraction: f64) {
        self.update(|p| p.settings.increment_fraction = fraction);
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        {
            let mut pending = lock(&self.pending);
            pending.settings.mode = mode;
            pending.mode_changed = true;
        }
        self.nap.wake();
    }

    /// Re-apply the current pending values at the next checkpoint
    pub fn touch(&self) {
        self.update(|_| {});
    }

    fn update(&self, apply: impl FnOnce(&mut PendingChange)) {
        {
            let mut pending = lock(&self.pending);
            apply(&mut pending);
            pending.param_changed = true;
        }
        self.nap.wake();
    }

    /// Take every pending value unconditionally, clearing both flags
    pub fn take_all(&self) -> PlaybackSettings {
        let mut pending = lock(&self.pending);
        pending.mode_changed = false;
        pending.param_changed = false;
        pending.settings
    }

    /// Take pending values only if something changed since the last take
    pub fn take_changes(&self) -> (ChangeKind, PlaybackSettings) {
        let mut pending = lock(&self.pending);
        let kind = if pending.mode_changed {
            ChangeKind::Mode
        } else if pending.param_changed {
            ChangeKind::Param
        } else {
            ChangeKind::None
        };
        pending.mode_changed = false;
        pending.param_changed = false;
        (kind, pending.settings)
    }

    /// Snapshot of the pending values without consuming them
    pub fn settings(&self) -> PlaybackSettings {
        lock(&self.pending).settings
    }

    // Naps

    /// Sleep up to `millis`, returning early on interrupt or parameter
    /// change. Returns actual minus requested milliseconds, or 0 if there
    /// was nothing to sleep.
    pub fn sleep_as_needed(&self, millis: i64) -> f64 {
        self.nap.sleep(millis)
    }

    /// Forget wakeups that arrived while no nap was running
    pub fn reset_nap(&self) {
        self.nap.reset();
    }
}

impl Default for EngineSignals {
    fn default() -> Self {
        Self::new(PlaybackSettings::default())
    }
}
