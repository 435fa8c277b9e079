use serde::{Deserialize, Serialize};

/// Registration info for one channel: the span of data the store holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBounds {
    pub name: String,
    pub start: f64,
    pub duration: f64,
}

impl ChannelBounds {
    pub fn new(name: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            name: name.into(),
            start,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Earliest and latest time available across a set of channels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Where a position sits relative to the bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitState {
    Lower,
    Upper,
    Within,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Combine per-channel registration into overall bounds.
    ///
    /// min is the earliest start and max the latest end; `None` when
    /// the registration is empty.
    pub fn from_registration(channels: &[ChannelBounds]) -> Option<Self> {
        if channels.is_empty() {
            return None;
        }
        let min = channels.iter().map(|c| c.start).fold(f64::MAX, f64::min);
        let max = channels.iter().map(|c| c.end()).fold(f64::MIN, f64::max);
        Some(Self { min, max })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, position: f64) -> f64 {
        if self.max < self.min {
            return position;
        }
        position.clamp(self.min, self.max)
    }

    /// Classify a position; the edges themselves count as out of range
    pub fn limit_state(&self, position: f64) -> LimitState {
        if position <= self.min {
            LimitState::Lower
        } else if position >= self.max {
            LimitState::Upper
        } else {
            LimitState::Within
        }
    }

    /// Position as a fraction of the span, 0.0 at min and 1.0 at max
    pub fn fraction(&self, position: f64) -> f64 {
        match self.limit_state(position) {
            LimitState::Lower => 0.0,
            LimitState::Upper => 1.0,
            LimitState::Within => (position - self.min) / self.span(),
        }
    }
}

/// The working set of channels requested from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    names: Vec<String>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.add(name);
        }
        set
    }

    /// Add a channel, ignoring duplicates
    pub fn add(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Last path component of a channel name ("src/sub/chan" -> "chan")
pub fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Channels whose top-level component starts with '_' are hidden
/// (they belong to other players and server internals).
pub fn is_hidden_channel(name: &str) -> bool {
    name.split('/').next().is_some_and(|first| first.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_registration() {
        let reg = vec![
            ChannelBounds::new("a", 2.0, 3.0),
            ChannelBounds::new("b", 1.0, 1.5),
        ];
        let bounds = Bounds::from_registration(&reg).unwrap();
        assert_eq!(bounds.min, 1.0);
        assert_eq!(bounds.max, 5.0);
        assert!(Bounds::from_registration(&[]).is_none());
    }

    #[test]
    fn test_limit_state_and_fraction() {
        let bounds = Bounds::new(10.0, 20.0);
        assert_eq!(bounds.limit_state(10.0), LimitState::Lower);
        assert_eq!(bounds.limit_state(25.0), LimitState::Upper);
        assert_eq!(bounds.limit_state(15.0), LimitState::Within);
        assert_eq!(bounds.fraction(15.0), 0.5);
        assert_eq!(bounds.fraction(5.0), 0.0);
        assert_eq!(bounds.clamp(30.0), 20.0);
    }

    #[test]
    fn test_channel_set_ignores_duplicates() {
        let set = ChannelSet::from_names(["a/x", "a/y", "a/x"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("a/y"));
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(short_name("src/sub/chan"), "chan");
        assert_eq!(short_name("chan"), "chan");
        assert!(is_hidden_channel("_Metrics/cpu"));
        assert!(!is_hidden_channel("src/_chan"));
    }
}
