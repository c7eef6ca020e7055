//! Shared utilities for CLI commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rt_core::{CautionInterval, Dataset, SourceFormat, format_lap_time};

/// Parse a `SLOT=PATH` file argument.
pub fn parse_file_arg(s: &str) -> Result<(String, PathBuf), String> {
    let Some((slot, path)) = s.split_once('=') else {
        return Err(format!("expected SLOT=PATH, got `{s}`"));
    };
    let slot = slot.trim();
    if slot.is_empty() || path.is_empty() {
        return Err(format!("expected SLOT=PATH, got `{s}`"));
    }
    Ok((slot.to_string(), PathBuf::from(path)))
}

/// Read every `(slot, path)` pair into the slot map a parser takes.
pub fn read_files(args: &[(String, PathBuf)]) -> Result<HashMap<String, String>> {
    let mut files = HashMap::with_capacity(args.len());
    for (slot, path) in args {
        if files.contains_key(slot) {
            bail!("file slot `{slot}` given more than once");
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {slot} from {}", path.display()))?;
        files.insert(slot.clone(), content);
    }
    Ok(files)
}

/// Load a dataset and check its structural invariants.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let dataset: Dataset = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse dataset {}", path.display()))?;
    dataset
        .data
        .validate()
        .with_context(|| format!("dataset {} is inconsistent", path.display()))?;
    Ok(dataset)
}

/// Write a dataset as pretty JSON, creating parent directories.
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(dataset).context("failed to serialize dataset")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote dataset");
    Ok(())
}

/// Default dataset path: `<dir>/<format>-<stem of the first input>.json`.
pub fn default_output_path(dir: &Path, format: SourceFormat, inputs: &[(String, PathBuf)]) -> PathBuf {
    let stem = inputs
        .iter()
        .find_map(|(_, path)| path.file_stem())
        .map_or_else(|| "race".to_string(), |s| s.to_string_lossy().into_owned());
    dir.join(format!("{format}-{stem}.json"))
}

/// Render a caution interval as `12` or `10-12`.
pub fn format_interval((start, end): CautionInterval) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

/// Lap time text, or `-` when there is none.
pub fn format_optional_time(seconds: Option<f64>) -> String {
    seconds
        .map(format_lap_time)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string())
}
