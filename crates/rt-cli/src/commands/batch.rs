//! Ingest several races listed in a manifest.
//!
//! ```json
//! { "races": [ { "format": "imsa",
//!                "files": { "lapChartJson": "chart.json", "flagsJson": "flags.json" },
//!                "out": "imsa-race.json" } ] }
//! ```
//!
//! Relative paths are resolved against the manifest's directory. A missing
//! `out` falls back to the configured output directory.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rt_core::{IngestJob, SourceFormat, ingest_batch};
use serde::Deserialize;

use super::util::{default_output_path, read_files, write_dataset};
use crate::Config;

#[derive(Debug, Deserialize)]
struct Manifest {
    races: Vec<ManifestRace>,
}

#[derive(Debug, Deserialize)]
struct ManifestRace {
    format: SourceFormat,
    files: BTreeMap<String, PathBuf>,
    #[serde(default)]
    out: Option<PathBuf>,
}

/// A manifest race after its input files were read.
enum Prepared {
    Ready { label: String, out: PathBuf },
    Unreadable { label: String, error: anyhow::Error },
}

/// Run every race in the manifest. Fails after reporting if any race failed.
pub fn run<W: Write>(writer: &mut W, config: &Config, manifest_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse manifest {}", manifest_path.display()))?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut jobs = Vec::with_capacity(manifest.races.len());
    let mut prepared = Vec::with_capacity(manifest.races.len());
    for race in &manifest.races {
        let inputs: Vec<(String, PathBuf)> = race
            .files
            .iter()
            .map(|(slot, path)| (slot.clone(), base.join(path)))
            .collect();
        let out = race.out.as_ref().map_or_else(
            || default_output_path(&config.output_dir, race.format, &inputs),
            |p| base.join(p),
        );
        let label = out.display().to_string();
        match read_files(&inputs) {
            Ok(files) => {
                jobs.push(IngestJob {
                    label: label.clone(),
                    format: race.format,
                    files,
                });
                prepared.push(Prepared::Ready { label, out });
            }
            Err(error) => prepared.push(Prepared::Unreadable { label, error }),
        }
    }

    tracing::debug!(races = prepared.len(), runnable = jobs.len(), "starting batch ingest");
    let mut results = ingest_batch(&jobs, &config.pipeline()).into_iter();

    let mut failed = 0;
    for race in &prepared {
        match race {
            Prepared::Unreadable { label, error } => {
                failed += 1;
                tracing::warn!(race = %label, error = %error, "race inputs could not be read");
                writeln!(writer, "FAIL  {label}: {error:#}")?;
            }
            Prepared::Ready { label, out } => {
                let (_, result) = results.next().context("batch ingest lost a race result")?;
                match result {
                    Ok(dataset) => {
                        write_dataset(out, &dataset)?;
                        writeln!(
                            writer,
                            "ok    {label} ({} cars, {} laps, {} warnings)",
                            dataset.data.total_cars,
                            dataset.data.max_lap,
                            dataset.warnings.len()
                        )?;
                    }
                    Err(err) => {
                        failed += 1;
                        tracing::warn!(race = %label, error = %err, "race failed to ingest");
                        writeln!(writer, "FAIL  {label}: {err}")?;
                    }
                }
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} races failed to ingest", prepared.len());
    }
    Ok(())
}
