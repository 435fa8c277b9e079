use crate::core::{ChannelBounds, Frame};
use crate::output::{check_channel_limit, OutputError, OutputResult, PlaybackOutput};
use std::io::Write;

/// Datagram-style output: writes the raw payload bytes of one channel,
/// one write per point, with no framing or timestamps.
pub struct RawOutput<W: Write + Send> {
    name: String,
    writer: Option<W>,
}

impl<W: Write + Send> RawOutput<W> {
    pub fn new(name: &str, writer: W) -> Self {
        Self {
            name: name.to_string(),
            writer: Some(writer),
        }
    }

    pub fn into_inner(mut self) -> Option<W> {
        self.writer.take()
    }
}

impl<W: Write + Send> PlaybackOutput for RawOutput<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_channels(&self) -> Option<usize> {
        Some(1)
    }

    fn register_channels(
        &mut self,
        registration: &[ChannelBounds],
        _use_short_names: bool,
    ) -> OutputResult<()> {
        check_channel_limit(&*self, registration.len())
    }

    fn emit(&mut self, frame: &Frame) -> OutputResult<()> {
        check_channel_limit(&*self, frame.channel_count())?;
        let writer = self.writer.as_mut().ok_or(OutputError::Closed)?;

        if let Some(channel) = frame.channels.first() {
            for idx in 0..channel.payload.len() {
                if let Some(bytes) = channel.payload.point_bytes(idx) {
                    writer.write_all(&bytes)?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChannelData, Payload};

    #[test]
    fn test_single_channel_only() {
        let mut output = RawOutput::new("raw", Vec::new());
        let reg = [
            ChannelBounds::new("a", 0.0, 1.0),
            ChannelBounds::new("b", 0.0, 1.0),
        ];
        assert!(matches!(
            output.register_channels(&reg, true),
            Err(OutputError::TooManyChannels { max: 1, requested: 2 })
        ));
        assert!(output.register_channels(&reg[..1], true).is_ok());
    }

    #[test]
    fn test_writes_payload_bytes() {
        let mut output = RawOutput::new("raw", Vec::new());
        let frame = Frame::new(vec![ChannelData::new(
            "a",
            vec![1.0, 2.0],
            Payload::Bytes(vec![vec![1, 2], vec![3]]),
        )]);
        output.emit(&frame).unwrap();
        assert_eq!(output.into_inner().unwrap(), vec![1, 2, 3]);
    }
}
