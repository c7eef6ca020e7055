//! Ingest one race from export files.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rt_core::{Dataset, SourceFormat, ingest};

use super::util::{default_output_path, format_interval, read_files, write_dataset};
use crate::Config;

/// Parse, annotate and save a race, then print a summary or the dataset.
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    format: SourceFormat,
    inputs: &[(String, PathBuf)],
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let files = read_files(inputs)?;
    let dataset = ingest(format, &files, &config.pipeline())
        .with_context(|| format!("failed to ingest {format} race"))?;

    let path = out.map_or_else(
        || default_output_path(&config.output_dir, format, inputs),
        Path::to_path_buf,
    );
    write_dataset(&path, &dataset)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&dataset)?)?;
    } else {
        write!(writer, "{}", render_summary(&dataset, &path))?;
    }
    Ok(())
}

/// Human-readable overview of an ingested race.
pub fn render_summary(dataset: &Dataset, saved_to: &Path) -> String {
    let data = &dataset.data;
    let mut out = String::new();

    let classes: Vec<String> = data
        .class_car_counts
        .iter()
        .map(|(class, count)| format!("{class}: {count}"))
        .collect();
    let cautions: Vec<String> = data.fcy.iter().copied().map(format_interval).collect();

    writeln!(out, "Format:     {}", dataset.format).unwrap();
    writeln!(out, "Cars:       {} ({})", data.total_cars, classes.join(", ")).unwrap();
    writeln!(out, "Laps:       {}", data.max_lap).unwrap();
    if cautions.is_empty() {
        writeln!(out, "Cautions:   0").unwrap();
    } else {
        writeln!(out, "Cautions:   {} (laps {})", cautions.len(), cautions.join(", ")).unwrap();
    }
    writeln!(out, "Annotated:  {} cars", dataset.annotations.len()).unwrap();
    writeln!(out, "Warnings:   {}", dataset.warnings.len()).unwrap();
    for warning in &dataset.warnings {
        writeln!(out, "  - {warning}").unwrap();
    }
    writeln!(out, "Saved to:   {}", saved_to.display()).unwrap();
    out
}
