//! Timing export parsers.
//!
//! Every supported format implements [`RaceParser`]: named raw documents in,
//! canonical [`RaceData`] plus seed [`Annotations`] and warnings out. The set
//! of formats is closed and enumerated by [`SourceFormat`]; adding a format
//! means adding one implementation and one variant.

pub mod imsa;
pub mod race_control;
pub mod speedhive;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotations::Annotations;
use crate::caution::CautionInterval;
use crate::types::{CarData, RaceData, compare_car_numbers};

pub use imsa::ImsaParser;
pub use speedhive::SpeedHiveParser;

/// Class assigned to cars whose export carries no class.
pub(crate) const DEFAULT_CLASS: &str = "Overall";

/// Fatal ingestion errors. No partial data is produced when one occurs.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing required file `{slot}`")]
    MissingFile { slot: String },

    #[error("file `{slot}` is empty")]
    EmptyFile { slot: String },

    #[error("file `{slot}` is not valid CSV: {source}")]
    Csv {
        slot: String,
        #[source]
        source: csv::Error,
    },

    #[error("file `{slot}` has no `{column}` column")]
    MissingColumn { slot: String, column: &'static str },

    #[error("file `{slot}` is not valid JSON: {source}")]
    Json {
        slot: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("lap chart lists no participants")]
    NoParticipants,

    #[error("lap chart contains no laps")]
    NoLaps,

    #[error("no usable cars remain after parsing")]
    NoValidCars,
}

/// A named input document a parser consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileSlot {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Everything a parser produces for one race.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub data: RaceData,
    pub annotations: Annotations,
    pub warnings: Vec<String>,
}

/// Uniform contract implemented by each format.
pub trait RaceParser {
    /// The format this parser handles.
    fn format(&self) -> SourceFormat;

    /// Named file slots, so callers can validate before parsing.
    fn file_slots(&self) -> &'static [FileSlot];

    /// Parse a complete race export.
    fn parse(&self, files: &HashMap<String, String>) -> Result<ParseOutput, ParseError>;
}

/// Heuristic thresholds used while parsing.
///
/// The position-drop and majority thresholds are empirical and kept
/// configurable pending review by someone who runs race control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// A lap is caution when more than this fraction of cars report FCY.
    pub fcy_majority_threshold: f64,
    /// Single-lap position drop that implies an unreported pit stop.
    pub pit_drop_threshold: u32,
    /// Laps either side of a drop searched for a reported pit entry.
    pub pit_match_window: u32,
    /// Green pace cutoff when too few samples exist (seconds).
    pub default_green_pace_cutoff: f64,
    /// Percentile of green lap times the cutoff is based on.
    pub pace_percentile: f64,
    /// Multiplier applied to that percentile.
    pub pace_margin: f64,
    /// Minimum green lap samples before the adaptive cutoff is used.
    pub min_pace_samples: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fcy_majority_threshold: 0.5,
            pit_drop_threshold: 5,
            pit_match_window: 2,
            default_green_pace_cutoff: 300.0,
            pace_percentile: 0.95,
            pace_margin: 1.1,
            min_pace_samples: 10,
        }
    }
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    SpeedHive,
    Imsa,
}

impl SourceFormat {
    pub const ALL: [Self; 2] = [Self::SpeedHive, Self::Imsa];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SpeedHive => "speedhive",
            Self::Imsa => "imsa",
        }
    }

    /// Human-readable description of the export.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::SpeedHive => "SpeedHive/MyLaps results and all-laps CSV pair",
            Self::Imsa => "IMSA timing & scoring lap chart and flags JSON",
        }
    }

    /// Construct the parser for this format.
    pub fn parser(&self, config: &ParserConfig) -> Box<dyn RaceParser + Send + Sync> {
        match self {
            Self::SpeedHive => Box::new(SpeedHiveParser::new(config.clone())),
            Self::Imsa => Box::new(ImsaParser::new(config.clone())),
        }
    }

    pub const fn file_slots(&self) -> &'static [FileSlot] {
        match self {
            Self::SpeedHive => speedhive::FILE_SLOTS,
            Self::Imsa => imsa::FILE_SLOTS,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speedhive" | "mylaps" => Ok(Self::SpeedHive),
            "imsa" => Ok(Self::Imsa),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Error type for unknown format names.
#[derive(Debug, Clone)]
pub struct UnknownFormat(String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown export format: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

/// Check that every required slot is present and non-empty.
pub fn validate_files(
    slots: &[FileSlot],
    files: &HashMap<String, String>,
) -> Result<(), ParseError> {
    for slot in slots.iter().filter(|s| s.required) {
        required_file(files, slot.name)?;
    }
    Ok(())
}

/// Fetch a required document by slot name.
pub(crate) fn required_file<'a>(
    files: &'a HashMap<String, String>,
    slot: &str,
) -> Result<&'a str, ParseError> {
    let text = files.get(slot).ok_or_else(|| ParseError::MissingFile {
        slot: slot.to_string(),
    })?;
    if text.trim().is_empty() {
        return Err(ParseError::EmptyFile {
            slot: slot.to_string(),
        });
    }
    Ok(text)
}

/// Build the final [`RaceData`] from parsed cars.
///
/// Computes per-lap class positions, fills in class finishing positions the
/// export did not supply, and derives class groups and counts.
pub(crate) fn assemble_race_data(
    mut cars: BTreeMap<String, CarData>,
    fcy: Vec<CautionInterval>,
    green_pace_cutoff: f64,
) -> Result<RaceData, ParseError> {
    if cars.is_empty() {
        return Err(ParseError::NoValidCars);
    }

    assign_class_positions(&mut cars);
    assign_class_finish_positions(&mut cars);

    let mut class_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for car in cars.values() {
        class_groups
            .entry(car.class.clone())
            .or_default()
            .push(car.num.clone());
    }
    for members in class_groups.values_mut() {
        members.sort_by(|a, b| {
            let (ca, cb) = (&cars[a], &cars[b]);
            ca.finish_pos_class
                .cmp(&cb.finish_pos_class)
                .then(ca.finish_pos.cmp(&cb.finish_pos))
                .then_with(|| compare_car_numbers(a, b))
        });
    }
    let class_car_counts = class_groups
        .iter()
        .map(|(class, members)| (class.clone(), members.len()))
        .collect();

    Ok(RaceData {
        max_lap: cars.values().map(CarData::last_lap).max().unwrap_or(0),
        total_cars: cars.len(),
        green_pace_cutoff,
        cars,
        fcy,
        class_groups,
        class_car_counts,
    })
}

/// Rank cars within their class on every lap by overall position.
///
/// Ties in overall position fall back to car-number order so the result is
/// always a permutation of `1..=N`.
pub(crate) fn assign_class_positions(cars: &mut BTreeMap<String, CarData>) {
    let mut grouped: HashMap<(String, u32), Vec<(u32, String)>> = HashMap::new();
    for car in cars.values() {
        for record in &car.laps {
            grouped
                .entry((car.class.clone(), record.lap))
                .or_default()
                .push((record.overall_position, car.num.clone()));
        }
    }

    let mut ranks: HashMap<(String, u32), u32> = HashMap::new();
    for ((_, lap), mut entries) in grouped {
        entries.sort_by(|(pa, na), (pb, nb)| pa.cmp(pb).then_with(|| compare_car_numbers(na, nb)));
        for (rank, (_, num)) in (1u32..).zip(entries) {
            ranks.insert((num, lap), rank);
        }
    }

    for car in cars.values_mut() {
        for record in &mut car.laps {
            if let Some(rank) = ranks.get(&(car.num.clone(), record.lap)) {
                record.class_position = *rank;
            }
        }
    }
}

/// Derive class finishing positions for classes where any are missing (0).
fn assign_class_finish_positions(cars: &mut BTreeMap<String, CarData>) {
    let mut by_class: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
    for car in cars.values() {
        by_class
            .entry(car.class.clone())
            .or_default()
            .push((car.finish_pos, car.num.clone()));
    }

    for (class, mut members) in by_class {
        let complete = members
            .iter()
            .all(|(_, num)| cars[num].finish_pos_class > 0);
        if complete {
            continue;
        }
        tracing::debug!(class = %class, "deriving class finishing positions");
        members.sort_by(|(pa, na), (pb, nb)| pa.cmp(pb).then_with(|| compare_car_numbers(na, nb)));
        for (pos, (_, num)) in (1u32..).zip(members) {
            if let Some(car) = cars.get_mut(&num) {
                car.finish_pos_class = pos;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::lap;

    fn car(num: &str, class: &str, finish_pos: u32, positions: &[u32]) -> CarData {
        CarData {
            num: num.to_string(),
            team: String::new(),
            class: class.to_string(),
            finish_pos,
            finish_pos_class: 0,
            laps: (1u32..)
                .zip(positions)
                .map(|(l, &p)| lap(l, p, 90.0))
                .collect(),
        }
    }

    #[test]
    fn class_positions_are_dense_per_class() {
        let cars: BTreeMap<String, CarData> = [
            car("1", "GTP", 1, &[1, 3]),
            car("2", "GTD", 2, &[2, 1]),
            car("3", "GTP", 3, &[4, 2]),
            car("4", "GTD", 4, &[3, 4]),
        ]
        .into_iter()
        .map(|c| (c.num.clone(), c))
        .collect();

        let data = assemble_race_data(cars, vec![], 300.0).unwrap();
        data.validate().unwrap();

        assert_eq!(data.cars["1"].laps[1].class_position, 2);
        assert_eq!(data.cars["3"].laps[1].class_position, 1);
        assert_eq!(data.cars["2"].laps[0].class_position, 1);
        assert_eq!(data.cars["4"].laps[0].class_position, 2);
        assert_eq!(data.class_car_counts["GTP"], 2);
        assert_eq!(data.class_groups["GTD"], vec!["2", "4"]);
        assert_eq!(data.cars["4"].finish_pos_class, 2);
        assert_eq!(data.max_lap, 2);
    }

    #[test]
    fn tied_positions_still_form_a_permutation() {
        let cars: BTreeMap<String, CarData> = [car("10", "GT", 1, &[1]), car("9", "GT", 2, &[1])]
            .into_iter()
            .map(|c| (c.num.clone(), c))
            .collect();
        let data = assemble_race_data(cars, vec![], 300.0).unwrap();
        assert_eq!(data.cars["9"].laps[0].class_position, 1);
        assert_eq!(data.cars["10"].laps[0].class_position, 2);
    }

    #[test]
    fn no_cars_is_fatal() {
        let err = assemble_race_data(BTreeMap::new(), vec![], 300.0).unwrap_err();
        assert!(matches!(err, ParseError::NoValidCars));
    }

    #[test]
    fn validate_files_reports_missing_and_empty() {
        let mut files = HashMap::new();
        let err = validate_files(SourceFormat::SpeedHive.file_slots(), &files).unwrap_err();
        assert_eq!(err.to_string(), "missing required file `summaryCsv`");

        files.insert("summaryCsv".to_string(), "Pos,No\n".to_string());
        files.insert("lapsCsv".to_string(), "  \n".to_string());
        let err = validate_files(SourceFormat::SpeedHive.file_slots(), &files).unwrap_err();
        assert_eq!(err.to_string(), "file `lapsCsv` is empty");
    }

    #[test]
    fn source_format_roundtrip() {
        for format in SourceFormat::ALL {
            assert_eq!(format.as_str().parse::<SourceFormat>().unwrap(), format);
            let value = serde_json::to_value(format).unwrap();
            assert_eq!(value.as_str().unwrap(), format.as_str());
            assert_eq!(format.parser(&ParserConfig::default()).format(), format);
        }
        assert_eq!("MyLaps".parse::<SourceFormat>().unwrap(), SourceFormat::SpeedHive);
        let err = "rfactor".parse::<SourceFormat>().unwrap_err();
        assert_eq!(err.to_string(), "unknown export format: rfactor");
    }
}
