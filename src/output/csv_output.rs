use crate::core::{short_name, ChannelBounds, Frame};
use crate::output::{OutputError, OutputResult, PlaybackOutput};
use std::io::Write;

/// Writes every emitted point as a `time,channel,value` CSV row
pub struct CsvOutput<W: Write + Send> {
    name: String,
    writer: Option<csv::Writer<W>>,
    use_short_names: bool,
}

impl<W: Write + Send> CsvOutput<W> {
    pub fn new(name: &str, writer: W) -> Self {
        Self {
            name: name.to_string(),
            writer: Some(csv::Writer::from_writer(writer)),
            use_short_names: true,
        }
    }

    /// Finish writing and hand back the underlying writer
    pub fn into_inner(mut self) -> Option<W> {
        self.writer.take().and_then(|w| w.into_inner().ok())
    }
}

impl<W: Write + Send> PlaybackOutput for CsvOutput<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_channels(
        &mut self,
        _registration: &[ChannelBounds],
        use_short_names: bool,
    ) -> OutputResult<()> {
        self.use_short_names = use_short_names;
        let writer = self.writer.as_mut().ok_or(OutputError::Closed)?;
        writer.write_record(["time", "channel", "value"])?;
        writer.flush()?;
        Ok(())
    }

    fn emit(&mut self, frame: &Frame) -> OutputResult<()> {
        let writer = self.writer.as_mut().ok_or(OutputError::Closed)?;

        for channel in &frame.channels {
            let name = if self.use_short_names {
                short_name(&channel.name)
            } else {
                channel.name.as_str()
            };
            for (idx, time) in channel.times.iter().enumerate() {
                let value = channel.payload.display_point(idx).unwrap_or_default();
                writer.write_record([format!("{:.6}", time), name.to_string(), value])?;
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
    fn test_rows_per_point() {
        let mut output = CsvOutput::new("csv", Vec::new());
        output
            .register_channels(&[ChannelBounds::new("src/temp", 0.0, 1.0)], true)
            .unwrap();
        let frame = Frame::new(vec![
            ChannelData::new("src/temp", vec![1.0, 1.5], Payload::Float64(vec![20.0, 20.5])),
            ChannelData::new("src/state", vec![1.2], Payload::Text(vec!["on".into()])),
        ]);
        output.emit(&frame).unwrap();

        let bytes = output.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,channel,value");
        assert_eq!(lines[1], "1.000000,temp,20");
        assert_eq!(lines[2], "1.500000,temp,20.5");
        assert_eq!(lines[3], "1.200000,state,on");
    }
}
