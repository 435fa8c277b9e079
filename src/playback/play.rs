use crate::core::Bounds;
use crate::error::{PlayerError, PlayerResult};
use crate::playback::{
    ChangeKind, Direction, Limit, PacingStrategy, PlaybackEngine, PlaybackState, StepOutcome, Timer,
};
use tracing::{debug, trace};

/// Longest single nap in single-point mode before the display is refreshed
const MAX_SINGLE_NAP_MS: i64 = 2000;

/// Ideal delay between outputs to cover `increment` of data at `rate`
pub(super) fn nap_millis(increment: f64, rate: f64) -> i64 {
    ((increment * 1000.0) / rate) as i64
}

/// Whether a fetched window shows the data running out.
///
/// Forward: past the known end and the frame ends within half a duration
/// of the request start. Backward: the frame starts half a duration or
/// more after the request start.
pub(super) fn edge_gap_detected(
    direction: Direction,
    position: f64,
    duration: f64,
    bounds: Bounds,
    last_start: Option<f64>,
    last_end: Option<f64>,
) -> bool {
    match direction {
        Direction::Forward => {
            position >= bounds.max
                && last_end.is_some_and(|end| (end - position) / duration <= 0.5)
        }
        Direction::Backward => last_start.is_some_and(|start| (start - position) / duration >= 0.5),
    }
}

/// Running pacing state for one play loop
struct Pacing {
    nap_ms: i64,
    nap_error: f64,
    /// Smoothed seconds of wall time per output
    ave_play_time: f64,
}

impl Pacing {
    fn new(increment: f64, rate: f64) -> Self {
        Self {
            nap_ms: nap_millis(increment, rate),
            nap_error: 0.0,
            ave_play_time: increment / rate,
        }
    }

    fn smooth(&mut self, elapsed_ms: i64) {
        self.ave_play_time = 0.00001 * elapsed_ms as f64 + 0.99 * self.ave_play_time;
    }
}

impl PlaybackEngine {
    /// Play until interrupted or the data runs out
    pub fn play(&mut self, direction: Direction) -> PlayerResult<()> {
        self.signals.set_state(PlaybackState::Playing);
        self.init_variables();
        let strategy = PacingStrategy::for_duration(self.duration);

        self.reset_min_max_times()?;
        if self.bounds.span() <= 0.0 {
            self.acknowledge_interrupt();
            return Err(PlayerError::SingleFrameOnly);
        }
        if self.at_edge(direction) {
            self.feedback.clear_rate_display();
            self.acknowledge_interrupt();
            return Ok(());
        }
        debug!("Playing {:?} from {} ({:?})", direction, self.position, strategy);

        let mut pacing = Pacing::new(self.increment, self.rate);
        match strategy {
            PacingStrategy::FixedIncrement => self.feedback.display_rate(self.rate),
            PacingStrategy::DiscreteNext => self.feedback.display_rate(0.0),
        }

        let mut timer = Timer::new();
        let mut first = true;
        loop {
            timer.start();

            let change = self.handle_variable_changes();
            // Switching in or out of single-point mode needs a fresh play
            if PacingStrategy::for_duration(self.duration) != strategy {
                break;
            }
            if change != ChangeKind::None && strategy == PacingStrategy::FixedIncrement {
                pacing = Pacing::new(self.increment, self.rate);
                self.feedback.display_rate(self.rate);
            }

            // The first pass fetches at the requested start point
            if !first {
                self.increment_position(direction);
            }
            first = false;

            let keep_going = match strategy {
                PacingStrategy::FixedIncrement => self.play_window(direction, &mut pacing, &timer)?,
                PacingStrategy::DiscreteNext => self.play_point(direction, &timer)?,
            };
            if !keep_going || self.signals.was_interrupted() {
                break;
            }
        }

        self.feedback.clear_rate_display();
        self.acknowledge_interrupt();
        Ok(())
    }

    /// One fixed-increment iteration; false once an edge was reached
    fn play_window(&mut self, direction: Direction, pacing: &mut Pacing, timer: &Timer) -> PlayerResult<bool> {
        let got_null = self.step(direction, false, true)? == StepOutcome::GotNullFrame;
        self.display_position();
        self.evaluate_limits();

        // Data may have grown or been trimmed since the last bounds refresh
        let limit = if got_null {
            self.reset_min_max_times()?;
            if direction.is_forward() && self.position >= self.bounds.max {
                Some(Limit::Max)
            } else if !direction.is_forward() && self.position <= self.bounds.min {
                Some(Limit::Min)
            } else {
                None
            }
        } else if edge_gap_detected(
            direction,
            self.position,
            self.duration,
            self.bounds,
            self.fetched.last_start_time(),
            self.fetched.last_end_time(),
        ) {
            self.reset_min_max_times()?;
            if self.position >= self.bounds.max {
                Some(Limit::Max)
            } else if self.position <= self.bounds.min {
                Some(Limit::Min)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(limit) = limit {
            debug!("Reached {:?} of data at {}", limit, self.position);
            self.go_to_limit(limit)?;
            return Ok(false);
        }

        let nap = pacing.nap_ms - timer.elapsed_millis() - pacing.nap_error as i64;
        pacing.nap_error = 0.5 * pacing.nap_error + 0.5 * self.signals.sleep_as_needed(nap);

        pacing.smooth(timer.elapsed_millis());
        self.feedback.display_rate(self.increment / pacing.ave_play_time);
        Ok(true)
    }

    /// One single-point iteration: fetch the next point, nap until it is
    /// due, then output it and move onto it.
    fn play_point(&mut self, direction: Direction, timer: &Timer) -> PlayerResult<bool> {
        if self.step(direction, false, false)? == StepOutcome::GotNullFrame {
            let limit = if direction.is_forward() { Limit::Max } else { Limit::Min };
            debug!("No point beyond {}, seeking to {:?}", self.position, limit);
            self.go_to_limit(limit)?;
            return Ok(false);
        }

        let next = self.fetched.last_start_time().unwrap_or(self.position);
        let calculated_increment = (next - self.position).abs();
        let total_nap = nap_millis(calculated_increment, self.rate) - timer.elapsed_millis();

        if total_nap < MAX_SINGLE_NAP_MS {
            self.signals.sleep_as_needed(total_nap);
        } else {
            // Long gaps: nap in pieces so the display keeps moving
            let mut slept = 0;
            while slept < total_nap
                && !self.signals.was_interrupted()
                && self.handle_variable_changes() == ChangeKind::None
            {
                let chunk = (total_nap - slept).min(MAX_SINGLE_NAP_MS);
                self.signals.sleep_as_needed(chunk);
                slept += chunk;
                let advanced = direction.sign() * (slept as f64 / 1000.0) * self.rate;
                self.feedback.display_position(self.position + advanced);
            }
            if self.signals.was_interrupted() {
                self.display_position();
            }
        }

        if self.signals.was_interrupted() {
            // Forget the point that was never output
            if let Some(frame) = &self.last_output {
                self.fetched = frame.clone();
            }
        } else {
            self.emit_fetched()?;
            self.position = next;
            self.display_position();
            self.evaluate_limits();
        }

        let ave_play_time = 0.00001 * timer.elapsed_millis() as f64 + 0.99 * (calculated_increment / self.rate);
        if ave_play_time > 0.0 {
            self.feedback.display_rate(calculated_increment / ave_play_time);
        }
        trace!("Point at {}, gap {}", next, calculated_increment);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nap_millis() {
        // duration 1.0, fraction 0.5, rate 2.0
        assert_eq!(nap_millis(0.5, 2.0), 250);
        assert_eq!(nap_millis(1.0, 1.0), 1000);
        assert_eq!(nap_millis(0.0, 3.0), 0);
    }

    #[test]
    fn test_forward_gap_at_end_is_an_edge() {
        let bounds = Bounds::new(0.0, 10.0);
        // duration 2.0, frame ends 0.5s after the request start
        assert!(edge_gap_detected(Direction::Forward, 10.0, 2.0, bounds, Some(10.0), Some(10.5)));
        // Same gap inside the data is not an edge
        assert!(!edge_gap_detected(Direction::Forward, 8.0, 2.0, bounds, Some(8.0), Some(8.5)));
        // A full window past the old end means the data grew
        assert!(!edge_gap_detected(Direction::Forward, 10.0, 2.0, bounds, Some(10.0), Some(11.9)));
        assert!(!edge_gap_detected(Direction::Forward, 10.0, 2.0, bounds, None, None));
    }

    #[test]
    fn test_backward_gap() {
        let bounds = Bounds::new(0.0, 10.0);
        assert!(edge_gap_detected(Direction::Backward, 4.0, 2.0, bounds, Some(5.0), Some(5.5)));
        assert!(!edge_gap_detected(Direction::Backward, 4.0, 2.0, bounds, Some(3.0), Some(3.9)));
    }
}
