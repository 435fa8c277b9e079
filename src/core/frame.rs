use serde::{Deserialize, Serialize};

/// A single typed sample as stored or parsed from a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    Bytes(Vec<u8>),
    Text(String),
    Float32(f32),
    Float64(f64),
}

impl SampleValue {
    /// Parse a textual value, preferring a number when it looks like one
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed.parse::<f64>() {
            Ok(v) => SampleValue::Float64(v),
            Err(_) => SampleValue::Text(trimmed.to_string()),
        }
    }

    /// Name of the payload type this value belongs to
    pub fn type_name(&self) -> &'static str {
        match self {
            SampleValue::Bytes(_) => "bytes",
            SampleValue::Text(_) => "string",
            SampleValue::Float32(_) => "float32",
            SampleValue::Float64(_) => "float64",
        }
    }
}

/// Typed payload for one channel of a frame.
///
/// Each variant holds one entry per point, so `len()` is always the
/// number of points carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Bytes(Vec<Vec<u8>>),
    Text(Vec<String>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl Payload {
    /// Build a payload from a run of samples.
    ///
    /// Returns `None` if the samples don't all share one type.
    pub fn from_samples<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a SampleValue>,
    {
        let mut iter = samples.into_iter().peekable();
        let mut payload = match iter.peek() {
            None => return Some(Payload::Float64(Vec::new())),
            Some(SampleValue::Bytes(_)) => Payload::Bytes(Vec::new()),
            Some(SampleValue::Text(_)) => Payload::Text(Vec::new()),
            Some(SampleValue::Float32(_)) => Payload::Float32(Vec::new()),
            Some(SampleValue::Float64(_)) => Payload::Float64(Vec::new()),
        };

        for sample in iter {
            match (&mut payload, sample) {
                (Payload::Bytes(v), SampleValue::Bytes(b)) => v.push(b.clone()),
                (Payload::Text(v), SampleValue::Text(s)) => v.push(s.clone()),
                (Payload::Float32(v), SampleValue::Float32(x)) => v.push(*x),
                (Payload::Float64(v), SampleValue::Float64(x)) => v.push(*x),
                _ => return None,
            }
        }
        Some(payload)
    }

    /// Number of points in the payload
    pub fn len(&self) -> usize {
        match self {
            Payload::Bytes(v) => v.len(),
            Payload::Text(v) => v.len(),
            Payload::Float32(v) => v.len(),
            Payload::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a single point back out as a sample
    pub fn get(&self, idx: usize) -> Option<SampleValue> {
        match self {
            Payload::Bytes(v) => v.get(idx).cloned().map(SampleValue::Bytes),
            Payload::Text(v) => v.get(idx).cloned().map(SampleValue::Text),
            Payload::Float32(v) => v.get(idx).copied().map(SampleValue::Float32),
            Payload::Float64(v) => v.get(idx).copied().map(SampleValue::Float64),
        }
    }

    /// Render a point as text (hex for byte blobs)
    pub fn display_point(&self, idx: usize) -> Option<String> {
        match self {
            Payload::Bytes(v) => v.get(idx).map(|b| {
                b.iter()
                    .map(|byte| format!("{:02X}", byte))
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
            Payload::Text(v) => v.get(idx).cloned(),
            Payload::Float32(v) => v.get(idx).map(|x| x.to_string()),
            Payload::Float64(v) => v.get(idx).map(|x| x.to_string()),
        }
    }

    /// Raw bytes of a point, as a datagram-style output would send them
    pub fn point_bytes(&self, idx: usize) -> Option<Vec<u8>> {
        match self {
            Payload::Bytes(v) => v.get(idx).cloned(),
            Payload::Text(v) => v.get(idx).map(|s| s.as_bytes().to_vec()),
            Payload::Float32(v) => v.get(idx).map(|x| x.to_le_bytes().to_vec()),
            Payload::Float64(v) => v.get(idx).map(|x| x.to_le_bytes().to_vec()),
        }
    }
}

/// Data for one channel within a fetched frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    /// Fully qualified channel name
    pub name: String,
    /// Start time of the data, in seconds
    pub start: f64,
    /// Time span covered by the data
    pub duration: f64,
    /// Per-point timestamps
    pub times: Vec<f64>,
    pub payload: Payload,
}

impl ChannelData {
    /// Build channel data from parallel time/payload vectors.
    ///
    /// Start and duration are derived from the first and last timestamps.
    pub fn new(name: impl Into<String>, times: Vec<f64>, payload: Payload) -> Self {
        let start = times.first().copied().unwrap_or(0.0);
        let end = times.last().copied().unwrap_or(start);
        Self {
            name: name.into(),
            start,
            duration: end - start,
            times,
            payload,
        }
    }

    /// An entry that carries only time information (registration results)
    pub fn registration(name: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            name: name.into(),
            start,
            duration,
            times: Vec::new(),
            payload: Payload::Float64(Vec::new()),
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn has_data(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// A batch of channel data returned by one store fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub channels: Vec<ChannelData>,
}

impl Frame {
    pub fn new(channels: Vec<ChannelData>) -> Self {
        Self { channels }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Drop channels that came back with no payload; returns how many remain
    pub fn retain_with_data(&mut self) -> usize {
        self.channels.retain(|c| c.has_data());
        self.channels.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Latest start time across all channels
    pub fn last_start_time(&self) -> Option<f64> {
        self.channels.iter().map(|c| c.start).reduce(f64::max)
    }

    /// Latest end time across all channels
    pub fn last_end_time(&self) -> Option<f64> {
        self.channels.iter().map(|c| c.end()).reduce(f64::max)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelData> {
        self.channels.iter().find(|c| c.name == name)
    }
}
