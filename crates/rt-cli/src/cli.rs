//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rt_core::SourceFormat;

use crate::commands::util::parse_file_arg;

/// Race timing insight tool.
///
/// Turns raw timing exports into one canonical race model, explains every
/// position change, and scores each car's race strategy.
#[derive(Debug, Parser)]
#[command(name = "rt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List supported export formats and the files each one takes.
    Formats,

    /// Parse and annotate one race, then save it as a dataset.
    Ingest {
        /// Export format (speedhive, imsa).
        format: SourceFormat,

        /// Input file for a named slot, e.g. `--file lapsCsv=laps.csv`.
        #[arg(short, long = "file", value_name = "SLOT=PATH", value_parser = parse_file_arg, required = true)]
        files: Vec<(String, PathBuf)>,

        /// Where to write the dataset (defaults to the configured output directory).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the dataset as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Ingest every race listed in a manifest, in parallel.
    Batch {
        /// Manifest JSON listing `{ format, files, out }` jobs.
        manifest: PathBuf,
    },

    /// Score each car's race strategy.
    Strategy {
        /// Dataset written by `rt ingest`.
        dataset: PathBuf,

        /// Only show cars in this class.
        #[arg(long)]
        class: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rank lap times on every green lap.
    Rank {
        /// Dataset written by `rt ingest`.
        dataset: PathBuf,

        /// Only rank cars in this class.
        #[arg(long)]
        class: Option<String>,

        /// Only show this lap.
        #[arg(long)]
        lap: Option<u32>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the reasons and markers recorded for one car.
    Annotations {
        /// Dataset written by `rt ingest`.
        dataset: PathBuf,

        /// Car number.
        #[arg(long)]
        car: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
