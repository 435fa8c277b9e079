use crate::core::SampleValue;
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use tracing::info;

#[derive(Debug, Deserialize)]
struct Record {
    time: f64,
    channel: String,
    value: serde_json::Value,
}

fn to_sample(value: serde_json::Value) -> Result<SampleValue> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(SampleValue::Float64)
            .context("Number out of range"),
        serde_json::Value::String(s) => Ok(SampleValue::Text(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .context("Byte arrays must hold values 0-255")
            })
            .collect::<Result<Vec<u8>>>()
            .map(SampleValue::Bytes),
        other => anyhow::bail!("Unsupported value {}", other),
    }
}

/// Load a recording with one JSON object per line:
/// `{"time": 1.5, "channel": "src/temp", "value": 20.5}`
///
/// Values may be numbers, strings or byte arrays.
pub fn load_jsonl(path: &str, store: &MemoryStore) -> Result<usize> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path))?;

    let mut count = 0;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("Line {}: invalid record", line_no + 1))?;
        let value = to_sample(record.value).with_context(|| format!("Line {}", line_no + 1))?;
        store
            .append(&record.channel, record.time, value)
            .with_context(|| format!("Line {}", line_no + 1))?;
        count += 1;
    }

    info!("Loaded {} samples from {}", count, path);
    Ok(count)
}
