//! Core domain logic for race timing analysis.
//!
//! This crate contains the fundamental types and logic for:
//! - Parsing: SpeedHive CSV and IMSA JSON exports into one canonical model
//! - Cautions: full-course yellow intervals and lap membership
//! - Annotations: explanations of position changes, pit and settle markers
//! - Scoring: per-car strategy scores and per-lap lap-time rankings

pub mod annotate;
pub mod annotations;
pub mod caution;
pub mod index;
pub mod parser;
pub mod pipeline;
pub mod ranking;
pub mod strategy;
pub mod table;
pub mod timing;
pub mod types;

pub use annotate::{AnnotationConfig, generate_annotations, generate_annotations_with};
pub use annotations::{Annotations, CarAnnotations, PitMarker, SettleMarker};
pub use caution::{CautionInterval, CautionSet};
pub use index::RaceIndex;
pub use parser::{
    FileSlot, ParseError, ParseOutput, ParserConfig, RaceParser, SourceFormat, UnknownFormat,
};
pub use pipeline::{Dataset, IngestJob, PipelineConfig, ingest, ingest_batch};
pub use ranking::rank_lap_times;
pub use strategy::{CarStrategy, ScoringWeights, score_strategies};
pub use timing::{format_lap_time, parse_lap_time};
pub use types::{CarData, Flag, LapRecord, RaceData, ValidationError};
