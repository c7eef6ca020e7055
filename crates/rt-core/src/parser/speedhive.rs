//! SpeedHive / MyLaps CSV export parsing.
//!
//! Input is a pair of CSV documents: a results summary (one row per car) and
//! an all-laps table (one row per car-lap). Caution laps are found by
//! majority vote over the per-lap status column.

use std::collections::{BTreeMap, HashMap};

use crate::annotations::Annotations;
use crate::caution::{CautionInterval, intervals_from_laps};
use crate::table::{HeaderIndex, Table, field, leading_number};
use crate::timing::parse_lap_time;
use crate::types::{CarData, Flag, LAP_TIME_SENTINEL, LapRecord};

use super::{
    DEFAULT_CLASS, FileSlot, ParseError, ParseOutput, ParserConfig, RaceParser, SourceFormat,
    assemble_race_data, required_file,
};

pub const SUMMARY_SLOT: &str = "summaryCsv";
pub const LAPS_SLOT: &str = "lapsCsv";

pub(crate) const FILE_SLOTS: &[FileSlot] = &[
    FileSlot {
        name: SUMMARY_SLOT,
        required: true,
        description: "results summary, one row per car",
    },
    FileSlot {
        name: LAPS_SLOT,
        required: true,
        description: "all laps, one row per car and lap",
    },
];

const POSITION: &[&str] = &["pos", "position", "overallposition", "overall", "place", "rank"];
const CLASS_POSITION: &[&str] = &["pic", "classpos", "classposition", "positioninclass", "clspos"];
const NUMBER: &[&str] = &["no", "number", "carnumber", "car", "num", "startnumber", "nr"];
const NAME: &[&str] = &["name", "team", "teamname", "competitor", "entrant", "driver", "drivers"];
const CLASS: &[&str] = &["class", "classname", "category", "cls"];
const LAP: &[&str] = &["lap", "lapnumber", "lapno", "laps"];
const LAP_TIME: &[&str] = &["laptime", "lastlaptime", "time"];
const SPEED: &[&str] = &["speed", "avgspeed", "kph", "mph"];
const IN_PIT: &[&str] = &["inpit", "pit", "pitlane", "pitstop"];
const FIELD_POSITION: &[&str] = &["position", "pos", "fieldposition", "fieldpos", "overall", "place"];
const STATUS: &[&str] = &["status", "flag", "flagstatus", "trackstatus"];

/// Parser for SpeedHive/MyLaps CSV exports.
#[derive(Debug, Clone, Default)]
pub struct SpeedHiveParser {
    config: ParserConfig,
}

impl SpeedHiveParser {
    pub const fn new(config: ParserConfig) -> Self {
        Self { config }
    }
}

impl RaceParser for SpeedHiveParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::SpeedHive
    }

    fn file_slots(&self) -> &'static [FileSlot] {
        FILE_SLOTS
    }

    fn parse(&self, files: &HashMap<String, String>) -> Result<ParseOutput, ParseError> {
        let summary_text = required_file(files, SUMMARY_SLOT)?;
        let laps_text = required_file(files, LAPS_SLOT)?;
        let mut warnings = Vec::new();

        let summary = read_summary(summary_text, &mut warnings)?;
        let mut laps_by_car = read_laps(laps_text, &mut warnings)?;

        let mut cars = BTreeMap::new();
        for (num, meta) in summary {
            let Some(laps) = laps_by_car.remove(&num) else {
                warnings.push(format!("car #{num} is in the summary but has no laps; dropped"));
                continue;
            };
            let laps = dedupe_laps(&num, laps, &mut warnings);
            cars.insert(
                num.clone(),
                CarData {
                    num,
                    team: meta.team,
                    class: meta.class,
                    finish_pos: meta.finish_pos,
                    finish_pos_class: meta.finish_pos_class.unwrap_or(0),
                    laps,
                },
            );
        }
        for num in laps_by_car.keys() {
            warnings.push(format!("car #{num} has laps but no summary row; dropped"));
        }

        let fcy = detect_majority_fcy(&cars, self.config.fcy_majority_threshold);
        let cutoff = green_pace_cutoff(&cars, &self.config);
        tracing::debug!(
            cars = cars.len(),
            cautions = fcy.len(),
            green_pace_cutoff = cutoff,
            "parsed SpeedHive export"
        );

        let data = assemble_race_data(cars, fcy, cutoff)?;
        Ok(ParseOutput {
            data,
            annotations: Annotations::default(),
            warnings,
        })
    }
}

/// Car metadata from the results summary.
#[derive(Debug)]
struct CarMeta {
    team: String,
    class: String,
    finish_pos: u32,
    finish_pos_class: Option<u32>,
}

fn parse_table(text: &str, slot: &str) -> Result<Table, ParseError> {
    let table = Table::parse(text).map_err(|source| ParseError::Csv {
        slot: slot.to_string(),
        source,
    })?;
    if table.is_empty() {
        return Err(ParseError::EmptyFile {
            slot: slot.to_string(),
        });
    }
    Ok(table)
}

fn locate_header<'t>(
    table: &'t Table,
    slot: &str,
    required: &[(&'static str, &[&str])],
) -> Result<(HeaderIndex, &'t [Vec<String>]), ParseError> {
    table
        .with_header(required)
        .map_err(|column| ParseError::MissingColumn {
            slot: slot.to_string(),
            column,
        })
}

fn read_summary(
    text: &str,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<String, CarMeta>, ParseError> {
    let table = parse_table(text, SUMMARY_SLOT)?;
    let (header, rows) = locate_header(
        &table,
        SUMMARY_SLOT,
        &[("position", POSITION), ("number", NUMBER)],
    )?;
    let pos_col = header.find(POSITION);
    let class_pos_col = header.find(CLASS_POSITION);
    let num_col = header.find(NUMBER);
    let name_col = header.find(NAME);
    let class_col = header.find(CLASS);

    let mut cars = BTreeMap::new();
    let mut unplaced = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let num = field(row, num_col).to_string();
        if num.is_empty() {
            warnings.push(format!("summary row {}: no car number; skipped", idx + 1));
            continue;
        }
        if cars.contains_key(&num) {
            warnings.push(format!("summary row {}: duplicate car #{num}; skipped", idx + 1));
            continue;
        }

        let class = match field(row, class_col) {
            "" => DEFAULT_CLASS.to_string(),
            class => class.to_string(),
        };
        let finish_pos = leading_number(field(row, pos_col)).filter(|p| *p > 0);
        if finish_pos.is_none() {
            unplaced.push(num.clone());
        }
        cars.insert(
            num,
            CarMeta {
                team: field(row, name_col).to_string(),
                class,
                finish_pos: finish_pos.unwrap_or(0),
                finish_pos_class: leading_number(field(row, class_pos_col)).filter(|p| *p > 0),
            },
        );
    }

    // Unclassified cars (DNF, DQ, ...) finish behind every classified car,
    // in summary order.
    let mut next = cars.values().map(|m| m.finish_pos).max().unwrap_or(0);
    for num in unplaced {
        if let Some(meta) = cars.get_mut(&num) {
            next += 1;
            meta.finish_pos = next;
        }
    }

    Ok(cars)
}

fn read_laps(
    text: &str,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<String, Vec<LapRecord>>, ParseError> {
    let table = parse_table(text, LAPS_SLOT)?;
    let (header, rows) = locate_header(
        &table,
        LAPS_SLOT,
        &[("number", NUMBER), ("lap", LAP), ("position", FIELD_POSITION)],
    )?;
    let num_col = header.find(NUMBER);
    let lap_col = header.find(LAP);
    let time_col = header.find(LAP_TIME);
    let speed_col = header.find(SPEED);
    let pit_col = header.find(IN_PIT);
    let pos_col = header.find(FIELD_POSITION);
    let status_col = header.find(STATUS);

    let mut laps: BTreeMap<String, Vec<LapRecord>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let num = field(row, num_col);
        let lap = leading_number(field(row, lap_col)).filter(|l| *l > 0);
        let position = leading_number(field(row, pos_col)).filter(|p| *p > 0);
        let (Some(lap), Some(position)) = (lap, position) else {
            warnings.push(format!(
                "lap row {}: unreadable lap or position for car #{num}; skipped",
                idx + 1
            ));
            continue;
        };
        if num.is_empty() {
            warnings.push(format!("lap row {}: no car number; skipped", idx + 1));
            continue;
        }

        let lap_time_text = field(row, time_col).to_string();
        let lap_time_seconds = parse_lap_time(&lap_time_text).unwrap_or(LAP_TIME_SENTINEL);
        laps.entry(num.to_string()).or_default().push(LapRecord {
            lap,
            overall_position: position,
            class_position: 0,
            lap_time_text,
            lap_time_seconds,
            flag: Flag::from_status(field(row, status_col)),
            is_pit: is_truthy(field(row, pit_col)),
            speed: field(row, speed_col).replace(',', ".").parse().ok(),
        });
    }
    Ok(laps)
}

/// Sort a car's laps and keep the first row for any repeated lap number.
fn dedupe_laps(num: &str, mut laps: Vec<LapRecord>, warnings: &mut Vec<String>) -> Vec<LapRecord> {
    laps.sort_by_key(|r| r.lap);
    let before = laps.len();
    laps.dedup_by_key(|r| r.lap);
    if laps.len() < before {
        warnings.push(format!(
            "car #{num}: {} duplicate lap rows ignored",
            before - laps.len()
        ));
    }
    laps
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "pit" | "in" | "p" | "x"
    )
}

/// Laps on which more than `threshold` of the reporting cars show FCY.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn detect_majority_fcy(
    cars: &BTreeMap<String, CarData>,
    threshold: f64,
) -> Vec<CautionInterval> {
    let mut counts: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for record in cars.values().flat_map(|c| &c.laps) {
        let (total, fcy) = counts.entry(record.lap).or_default();
        *total += 1;
        if record.flag == Flag::Fcy {
            *fcy += 1;
        }
    }

    intervals_from_laps(
        counts
            .into_iter()
            .filter(|(_, (total, fcy))| *total > 0 && (*fcy as f64 / *total as f64) > threshold)
            .map(|(lap, _)| lap),
    )
}

/// Adaptive green pace cutoff: a margin over a high percentile of green laps.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn green_pace_cutoff(cars: &BTreeMap<String, CarData>, config: &ParserConfig) -> f64 {
    let mut samples: Vec<f64> = cars
        .values()
        .flat_map(|c| &c.laps)
        .filter(|r| r.flag == Flag::Green && !r.is_pit && r.has_valid_time())
        .map(|r| r.lap_time_seconds)
        .collect();

    if samples.len() < config.min_pace_samples.max(1) {
        return config.default_green_pace_cutoff;
    }

    samples.sort_by(f64::total_cmp);
    // Nearest-rank percentile.
    let rank = (config.pace_percentile * samples.len() as f64).ceil() as usize;
    let idx = rank.clamp(1, samples.len()) - 1;
    samples[idx] * config.pace_margin
}
