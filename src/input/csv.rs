use crate::core::SampleValue;
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Load a recording from a CSV file into a store
///
/// Supports flexible column names:
/// - time,channel,value
/// - timestamp,name,data
/// - t,chan,sample
///
/// Values that parse as numbers are stored as 64-bit floats, anything else
/// as text. Rows must be time-ordered per channel.
pub fn load_csv(path: &str, store: &MemoryStore) -> Result<usize> {
    let mut rdr = csv::Reader::from_path(Path::new(path))
        .with_context(|| format!("Failed to open {}", path))?;

    let headers = rdr.headers()?;
    let (time_idx, channel_idx, value_idx) = detect_columns(headers)?;

    let mut count = 0;
    for (row, result) in rdr.records().enumerate() {
        let record = result.context("Failed to read CSV row")?;

        let time = record
            .get(time_idx)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .with_context(|| format!("Row {}: invalid time", row + 1))?;
        let channel = record
            .get(channel_idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .with_context(|| format!("Row {}: missing channel", row + 1))?;
        let value = record.get(value_idx).context("Missing value column")?;

        store
            .append(channel, time, SampleValue::parse(value.trim()))
            .with_context(|| format!("Row {}", row + 1))?;
        count += 1;
    }

    info!("Loaded {} samples from {}", count, path);
    Ok(count)
}

/// Detect column indices from CSV headers
fn detect_columns(headers: &csv::StringRecord) -> Result<(usize, usize, usize)> {
    let time_idx = find_column(headers, &["time", "timestamp", "t", "ts"])?;
    let channel_idx = find_column(headers, &["channel", "chan", "name", "signal"])?;
    let value_idx = find_column(headers, &["value", "data", "sample", "v"])?;

    Ok((time_idx, channel_idx, value_idx))
}

/// Find a column by checking possible names
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.trim().to_lowercase();
        if names.iter().any(|&name| header_lower == name) {
            return Ok(idx);
        }
    }

    anyhow::bail!("Could not find column with names: {:?}", names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = write_temp("Timestamp,Name,Data\n0.0,src/temp,20.5\n0.5,src/temp,21\n0.5,src/state,on\n");
        let store = MemoryStore::new("rec");
        let count = load_csv(file.path().to_str().unwrap(), &store).unwrap();

        assert_eq!(count, 3);
        assert_eq!(store.sample_count("src/temp"), 2);
        assert_eq!(store.sample_count("src/state"), 1);
        assert_eq!(store.newest_time(), Some(0.5));
    }

    #[test]
    fn test_missing_column() {
        let file = write_temp("time,value\n0,1\n");
        let store = MemoryStore::new("rec");
        assert!(load_csv(file.path().to_str().unwrap(), &store).is_err());
    }

    #[test]
    fn test_out_of_order_row_fails() {
        let file = write_temp("time,channel,value\n1.0,a,1\n0.5,a,2\n");
        let store = MemoryStore::new("rec");
        let err = load_csv(file.path().to_str().unwrap(), &store).unwrap_err();
        assert!(format!("{:#}", err).contains("Row 2"));
    }
}
