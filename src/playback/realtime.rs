use crate::error::PlayerResult;
use crate::playback::engine::connected;
use crate::playback::{ChangeKind, Direction, PlaybackEngine, PlaybackState, Timer};
use std::time::Duration;
use tracing::debug;

/// Gaps beyond this many increments are skipped rather than stepped through
const RT_MAX_LATENCY: f64 = 1.5;
/// Bound on the nap feedback term, in milliseconds
const MAX_NAP_ADJUST_MS: i64 = 2000;
const MONITOR_TIMEOUT: Duration = Duration::from_millis(1000);
const MIN_POLL_MS: i64 = 10;
const MAX_POLL_MS: i64 = 600;

/// What realtime mode does with the gap between the live edge and the last output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RealtimeAction {
    /// Not a full increment behind yet
    Wait,
    /// Step forward by one increment
    Advance,
    /// Jump straight to the live edge
    Skip,
}

/// `got_diff` is latest time minus last output start minus duration
pub(super) fn realtime_action(got_diff: f64, increment: f64) -> RealtimeAction {
    if got_diff >= increment || got_diff < 0.0 {
        if got_diff > RT_MAX_LATENCY * increment || got_diff < 0.0 {
            RealtimeAction::Skip
        } else {
            RealtimeAction::Advance
        }
    } else {
        RealtimeAction::Wait
    }
}

/// Blend a new data-rate measurement into the displayed realtime rate
pub(super) fn smooth_rt_rate(rt_rate: f64, data_advance: f64, elapsed_ms: i64) -> f64 {
    let elapsed = elapsed_ms.max(1) as f64;
    0.2 * rt_rate + 0.8 * 1000.0 * data_advance / elapsed
}

impl PlaybackEngine {
    /// Track the live edge of the data until interrupted
    pub fn realtime(&mut self) -> PlayerResult<()> {
        self.signals.set_state(PlaybackState::Realtime);
        self.init_variables();
        if self.duration == 0.0 {
            return self.realtime_single_point();
        }

        self.feedback.set_slider(1.0);
        self.feedback.set_rate_enabled(false);
        self.reset_min_max_times()?;
        self.position = self.bounds.max - self.duration - self.increment;

        let base_nap = (1000.0 * self.increment) as i64;
        let mut nap_adjust: i64 = 0;
        let mut last_start = self.position;
        let mut last_resp_start = self.position - self.increment;
        let mut rt_rate = self.rate;
        let mut timer = Timer::new();
        let mut rate_timer = Timer::new();
        self.feedback.display_rate(rt_rate);
        debug!("Realtime from {}", self.position);

        loop {
            timer.start();
            if self.handle_variable_changes() != ChangeKind::None {
                break;
            }
            let Some(latest) = self.fetch_newest_time()? else {
                debug!("Source has no channels, leaving realtime");
                break;
            };

            let got_diff = latest - last_start - self.duration;
            let action = realtime_action(got_diff, self.increment);
            if action == RealtimeAction::Wait {
                let junk = ((1000.0 * (last_start + self.increment + self.duration - latest)) as i64)
                    .min(MAX_NAP_ADJUST_MS);
                self.signals.sleep_as_needed(junk - timer.elapsed_millis());
                nap_adjust = (nap_adjust + junk).min(MAX_NAP_ADJUST_MS);
                if self.signals.was_interrupted() {
                    break;
                }
                continue;
            }

            if action == RealtimeAction::Skip {
                debug!("Realtime skip to {} (behind by {})", latest - self.duration, got_diff);
                self.position = latest - self.duration;
            } else {
                self.increment_position(Direction::Forward);
            }

            self.fetch(Direction::Forward, false)?;
            if !self.fetched.is_empty() {
                last_start = self.position;
                self.emit_fetched()?;
                self.feedback.display_position(last_start);

                let current = self.fetched.last_start_time().unwrap_or(last_start);
                rt_rate = smooth_rt_rate(rt_rate, current - last_resp_start, rate_timer.elapsed_millis());
                self.feedback.display_rate(rt_rate);
                rate_timer.start();
                last_resp_start = current;
            }

            if got_diff > 0.0 {
                let weight = if action == RealtimeAction::Skip { 1000.0 } else { 500.0 };
                nap_adjust -= (weight * (got_diff - self.increment)) as i64;
                nap_adjust = nap_adjust.max(-base_nap);
            }

            self.signals.sleep_as_needed(base_nap + nap_adjust - timer.elapsed_millis());
            if self.signals.was_interrupted() {
                break;
            }
        }

        self.finish_realtime()
    }

    /// Realtime in single-point mode: wait on the store for new points
    fn realtime_single_point(&mut self) -> PlayerResult<()> {
        self.feedback.set_slider(1.0);
        self.feedback.set_rate_enabled(false);
        self.reset_min_max_times()?;

        let mut poll_ms = MIN_POLL_MS;
        let mut current_point: Option<f64> = None;
        let mut rt_rate = self.rate;
        let mut rate_timer = Timer::new();
        self.feedback.display_rate(rt_rate);

        connected(&mut self.store)?.monitor(&self.channels)?;

        loop {
            if self.handle_variable_changes() != ChangeKind::None {
                break;
            }

            let store = connected(&mut self.store)?;
            let mut frame = store.fetch_bounded(&self.channels, MONITOR_TIMEOUT)?;
            if frame.retain_with_data() == 0 {
                if self.signals.was_interrupted() {
                    break;
                }
                continue;
            }

            let newest = frame.last_start_time();
            if newest == current_point {
                poll_ms *= 2;
            } else {
                let previous = current_point;
                current_point = newest;
                poll_ms /= 2;

                self.fetched = frame;
                self.emit_fetched()?;
                if let Some(time) = newest {
                    self.position = time;
                    self.feedback.display_position(time);
                    if let Some(previous) = previous {
                        rt_rate = smooth_rt_rate(rt_rate, time - previous, rate_timer.elapsed_millis());
                        self.feedback.display_rate(rt_rate);
                    }
                }
                rate_timer.start();
            }

            poll_ms = poll_ms.clamp(MIN_POLL_MS, MAX_POLL_MS);
            self.signals.sleep_as_needed(poll_ms);
            if self.signals.was_interrupted() {
                break;
            }
        }

        self.finish_realtime()
    }

    fn finish_realtime(&mut self) -> PlayerResult<()> {
        let refreshed = self.reset_min_max_times();
        if refreshed.is_ok() {
            self.position = self.bounds.max;
        }
        self.feedback.clear_rate_display();
        self.feedback.set_rate_enabled(true);
        self.display_position();
        self.evaluate_limits();
        self.acknowledge_interrupt();
        refreshed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_skip_when_far_behind() {
        // increment 1.0: more than 1.5 behind jumps to the edge
        assert_eq!(realtime_action(1.6, 1.0), RealtimeAction::Skip);
        assert_eq!(realtime_action(-0.1, 1.0), RealtimeAction::Skip);
    }

    #[test]
    fn test_realtime_advance_and_wait() {
        assert_eq!(realtime_action(1.0, 1.0), RealtimeAction::Advance);
        assert_eq!(realtime_action(1.5, 1.0), RealtimeAction::Advance);
        assert_eq!(realtime_action(0.0, 1.0), RealtimeAction::Wait);
        assert_eq!(realtime_action(0.99, 1.0), RealtimeAction::Wait);
    }

    #[test]
    fn test_smooth_rt_rate() {
        // 1s of data over 500ms is 2x
        assert!((smooth_rt_rate(1.0, 1.0, 500) - 1.8).abs() < 1e-9);
        // Zero elapsed is treated as 1ms
        assert!(smooth_rt_rate(0.0, 0.001, 0).is_finite());
    }
}
