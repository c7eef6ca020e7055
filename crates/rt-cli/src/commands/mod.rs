//! CLI subcommand implementations.

pub mod annotations;
pub mod batch;
pub mod formats;
pub mod ingest;
pub mod rank;
pub mod strategy;
pub mod util;
