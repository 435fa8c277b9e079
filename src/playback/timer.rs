use std::time::Instant;

/// Stopwatch used for pacing measurements. Owned by a single thread.
#[derive(Debug, Clone)]
pub struct Timer {
    started: Instant,
    frozen: Option<i64>,
}

impl Timer {
    /// A timer that is already running
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            frozen: None,
        }
    }

    /// Reset the reference instant to now and resume running
    pub fn start(&mut self) {
        self.started = Instant::now();
        self.frozen = None;
    }

    /// Milliseconds since the last `start()`, or the value frozen by `pause()`
    pub fn elapsed_millis(&self) -> i64 {
        match self.frozen {
            Some(ms) => ms,
            None => self.started.elapsed().as_millis() as i64,
        }
    }

    pub fn pause(&mut self) -> i64 {
        let ms = self.elapsed_millis();
        self.frozen = Some(ms);
        ms
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_pause_freezes_elapsed() {
        let mut timer = Timer::new();
        thread::sleep(Duration::from_millis(20));
        let frozen = timer.pause();
        assert!(frozen >= 20);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(timer.elapsed_millis(), frozen);
    }

    #[test]
    fn test_start_resets() {
        let mut timer = Timer::new();
        thread::sleep(Duration::from_millis(20));
        timer.pause();
        timer.start();
        assert!(timer.elapsed_millis() < 20);
    }
}
