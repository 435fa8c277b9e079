pub mod csv;
pub mod jsonl;

pub use self::csv::load_csv;
pub use jsonl::load_jsonl;

use crate::store::MemoryStore;
use anyhow::{Context, Result};

/// Recording format detection result
#[derive(Debug, Clone, PartialEq)]
pub enum InputFormat {
    Csv,
    JsonLines,
    Unknown,
}

/// Detect the format of a recording by looking at its first lines
pub fn detect_format(data: &[u8]) -> InputFormat {
    let sample = match std::str::from_utf8(&data[..data.len().min(500)]) {
        Ok(text) => text,
        // A multi-byte char may straddle the cut
        Err(e) => match std::str::from_utf8(&data[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return InputFormat::Unknown,
        },
    };

    let first = sample.lines().map(str::trim).find(|l| !l.is_empty());
    match first {
        Some(line) if line.starts_with('{') => InputFormat::JsonLines,
        Some(line) if line.chars().filter(|&c| c == ',').count() >= 2 => InputFormat::Csv,
        _ => InputFormat::Unknown,
    }
}

/// Load a recording into a store, auto-detecting the format.
///
/// Returns the number of samples appended.
pub fn load_file(path: &str, store: &MemoryStore) -> Result<usize> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read recording {}", path))?;

    match detect_format(&data) {
        InputFormat::Csv => load_csv(path, store),
        InputFormat::JsonLines => load_jsonl(path, store),
        InputFormat::Unknown => anyhow::bail!("Unknown recording format: {}", path),
    }
}
