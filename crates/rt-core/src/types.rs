//! Canonical race data model with invariant validation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caution::{CautionInterval, CautionSet};

/// Lap time stored when the real value is unknown or not representative.
///
/// Never zero so consumers can divide by it safely.
pub const LAP_TIME_SENTINEL: f64 = 0.001;

/// Lap times at or below this many seconds are treated as missing.
pub const MIN_VALID_LAP_TIME: f64 = 1.0;

/// Invariant violations in a [`RaceData`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A car's laps are not strictly increasing.
    #[error("car #{car}: lap {lap} does not follow lap {previous}")]
    LapOrder { car: String, previous: u32, lap: u32 },

    /// Class positions on a lap are not a permutation of `1..=N`.
    #[error("class {class} on lap {lap}: positions {positions:?} are not 1..={expected}")]
    ClassPositions {
        class: String,
        lap: u32,
        positions: Vec<u32>,
        expected: usize,
    },

    /// A caution interval ends before it starts.
    #[error("caution interval [{start}, {end}] is inverted")]
    InvertedInterval { start: u32, end: u32 },

    /// Caution intervals overlap or are out of order.
    #[error("caution interval starting at lap {start} overlaps the interval ending at lap {previous_end}")]
    OverlappingIntervals { previous_end: u32, start: u32 },

    /// The green pace cutoff is zero, negative or NaN.
    #[error("green pace cutoff must be positive, got {value}")]
    NonPositiveCutoff { value: f64 },

    /// Unknown flag value.
    #[error("invalid flag: {value}")]
    InvalidFlag { value: String },
}

/// Track condition for a single lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flag {
    #[default]
    Green,
    Fcy,
    Red,
}

impl Flag {
    /// String representation matching the serialized form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Fcy => "FCY",
            Self::Red => "RED",
        }
    }

    /// Classify a free-text timing status such as `"Code 60"` or `"Red Flag"`.
    ///
    /// Matching is done on whole words so that e.g. `"DISCONNECTED"` is not
    /// read as a safety car.
    pub fn from_status(status: &str) -> Self {
        let upper = status.to_ascii_uppercase();
        let words: Vec<&str> = upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words
            .iter()
            .any(|w| matches!(*w, "FCY" | "YELLOW" | "CAUTION" | "CODE" | "SC"))
        {
            Self::Fcy
        } else if words.contains(&"RED") {
            Self::Red
        } else {
            Self::Green
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Flag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GREEN" => Ok(Self::Green),
            "FCY" => Ok(Self::Fcy),
            "RED" => Ok(Self::Red),
            _ => Err(ValidationError::InvalidFlag {
                value: s.to_string(),
            }),
        }
    }
}

/// One recorded lap of one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    /// 1-based lap number.
    pub lap: u32,
    /// Position in the whole field at the end of this lap.
    pub overall_position: u32,
    /// Position within the car's class, computed after parsing.
    pub class_position: u32,
    /// Lap time as it appeared in the export (empty when absent).
    pub lap_time_text: String,
    /// Lap time in seconds, or [`LAP_TIME_SENTINEL`].
    pub lap_time_seconds: f64,
    pub flag: Flag,
    pub is_pit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl LapRecord {
    /// Whether the lap carries a real lap time.
    pub fn has_valid_time(&self) -> bool {
        self.lap_time_seconds > MIN_VALID_LAP_TIME
    }
}

/// A car and its recorded laps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarData {
    pub num: String,
    pub team: String,
    pub class: String,
    pub finish_pos: u32,
    pub finish_pos_class: u32,
    /// Sorted by lap number; gaps allowed.
    pub laps: Vec<LapRecord>,
}

impl CarData {
    /// Look up the record for a lap number.
    pub fn lap(&self, lap: u32) -> Option<&LapRecord> {
        self.laps
            .binary_search_by_key(&lap, |r| r.lap)
            .ok()
            .map(|idx| &self.laps[idx])
    }

    /// Number of pit laps.
    pub fn pit_count(&self) -> usize {
        self.laps.iter().filter(|r| r.is_pit).count()
    }

    /// Last recorded lap number, or 0 for a car with no laps.
    pub fn last_lap(&self) -> u32 {
        self.laps.last().map_or(0, |r| r.lap)
    }
}

/// The canonical per-car, per-lap dataset produced by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceData {
    pub max_lap: u32,
    pub total_cars: usize,
    /// Lap time above which a lap is not representative green pace.
    pub green_pace_cutoff: f64,
    pub cars: BTreeMap<String, CarData>,
    /// Inclusive `[start, end]` caution intervals, sorted and disjoint.
    pub fcy: Vec<CautionInterval>,
    /// Car numbers per class, ordered by class finishing position.
    pub class_groups: BTreeMap<String, Vec<String>>,
    pub class_car_counts: BTreeMap<String, usize>,
}

impl RaceData {
    /// Lap membership set for the caution intervals.
    pub fn cautions(&self) -> CautionSet {
        CautionSet::from_intervals(&self.fcy)
    }

    /// Cars belonging to a class, in class finishing order.
    pub fn cars_in_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a CarData> + 'a {
        self.class_groups
            .get(class)
            .into_iter()
            .flatten()
            .filter_map(|num| self.cars.get(num))
    }

    /// Check the structural invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.green_pace_cutoff.is_nan() || self.green_pace_cutoff <= 0.0 {
            return Err(ValidationError::NonPositiveCutoff {
                value: self.green_pace_cutoff,
            });
        }

        for car in self.cars.values() {
            for pair in car.laps.windows(2) {
                if pair[1].lap <= pair[0].lap {
                    return Err(ValidationError::LapOrder {
                        car: car.num.clone(),
                        previous: pair[0].lap,
                        lap: pair[1].lap,
                    });
                }
            }
        }

        let mut previous_end: Option<u32> = None;
        for &(start, end) in &self.fcy {
            if end < start {
                return Err(ValidationError::InvertedInterval { start, end });
            }
            if let Some(prev) = previous_end {
                if start <= prev {
                    return Err(ValidationError::OverlappingIntervals {
                        previous_end: prev,
                        start,
                    });
                }
            }
            previous_end = Some(end);
        }

        let mut by_class_lap: BTreeMap<(&str, u32), Vec<u32>> = BTreeMap::new();
        for car in self.cars.values() {
            for record in &car.laps {
                by_class_lap
                    .entry((car.class.as_str(), record.lap))
                    .or_default()
                    .push(record.class_position);
            }
        }
        for ((class, lap), mut positions) in by_class_lap {
            positions.sort_unstable();
            let is_permutation = positions
                .iter()
                .enumerate()
                .all(|(idx, &pos)| usize::try_from(pos).is_ok_and(|p| p == idx + 1));
            if !is_permutation {
                return Err(ValidationError::ClassPositions {
                    class: class.to_string(),
                    lap,
                    expected: positions.len(),
                    positions,
                });
            }
        }

        Ok(())
    }
}

/// Order car numbers naturally: `"2"` before `"10"`, then lexically.
pub fn compare_car_numbers(a: &str, b: &str) -> Ordering {
    fn numeric_prefix(s: &str) -> Option<u32> {
        let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a lap record with the fields tests usually care about.
    pub(crate) fn lap(lap: u32, position: u32, seconds: f64) -> LapRecord {
        LapRecord {
            lap,
            overall_position: position,
            class_position: 0,
            lap_time_text: String::new(),
            lap_time_seconds: seconds,
            flag: Flag::Green,
            is_pit: false,
            speed: None,
        }
    }

    fn car(num: &str, class: &str, laps: Vec<LapRecord>) -> CarData {
        CarData {
            num: num.to_string(),
            team: format!("Team {num}"),
            class: class.to_string(),
            finish_pos: 1,
            finish_pos_class: 1,
            laps,
        }
    }

    fn race(cars: Vec<CarData>, fcy: Vec<CautionInterval>) -> RaceData {
        RaceData {
            max_lap: 3,
            total_cars: cars.len(),
            green_pace_cutoff: 300.0,
            cars: cars.into_iter().map(|c| (c.num.clone(), c)).collect(),
            fcy,
            class_groups: BTreeMap::new(),
            class_car_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn flag_from_status_keywords() {
        assert_eq!(Flag::from_status("FCY"), Flag::Fcy);
        assert_eq!(Flag::from_status("Full Course Yellow"), Flag::Fcy);
        assert_eq!(Flag::from_status("Code 60"), Flag::Fcy);
        assert_eq!(Flag::from_status("sc deployed"), Flag::Fcy);
        assert_eq!(Flag::from_status("Red Flag"), Flag::Red);
        assert_eq!(Flag::from_status(""), Flag::Green);
        assert_eq!(Flag::from_status("Running"), Flag::Green);
        assert_eq!(Flag::from_status("DISCONNECTED"), Flag::Green);
    }

    #[test]
    fn flag_serde_matches_as_str() {
        for flag in [Flag::Green, Flag::Fcy, Flag::Red] {
            let value = serde_json::to_value(flag).unwrap();
            assert_eq!(value.as_str().unwrap(), flag.as_str());
            assert_eq!(flag.as_str().parse::<Flag>().unwrap(), flag);
        }
        assert!("yellow".parse::<Flag>().is_err());
    }

    #[test]
    fn car_lap_lookup_handles_gaps() {
        let c = car("7", "GT", vec![lap(1, 1, 90.0), lap(3, 1, 91.0)]);
        assert_eq!(c.lap(3).map(|r| r.overall_position), Some(1));
        assert!(c.lap(2).is_none());
        assert_eq!(c.last_lap(), 3);
    }

    #[test]
    fn validate_rejects_unordered_laps() {
        let data = race(
            vec![car("7", "GT", vec![lap(2, 1, 90.0), lap(2, 1, 90.0)])],
            vec![],
        );
        assert!(matches!(
            data.validate(),
            Err(ValidationError::LapOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_overlapping_cautions() {
        let mut a = lap(1, 1, 90.0);
        a.class_position = 1;
        let data = race(vec![car("7", "GT", vec![a])], vec![(2, 4), (4, 6)]);
        assert!(matches!(
            data.validate(),
            Err(ValidationError::OverlappingIntervals { .. })
        ));
    }

    #[test]
    fn validate_rejects_class_position_gaps() {
        let mut a = lap(1, 1, 90.0);
        a.class_position = 1;
        let mut b = lap(1, 2, 90.0);
        b.class_position = 3;
        let data = race(
            vec![car("7", "GT", vec![a]), car("8", "GT", vec![b])],
            vec![],
        );
        assert!(matches!(
            data.validate(),
            Err(ValidationError::ClassPositions { .. })
        ));
    }

    #[test]
    fn validate_rejects_non_positive_cutoff() {
        let mut data = race(vec![], vec![]);
        data.green_pace_cutoff = 0.0;
        assert!(data.validate().is_err());
    }

    #[test]
    fn car_numbers_sort_naturally() {
        let mut nums = vec!["10", "2", "01", "A1", "2B"];
        nums.sort_by(|a, b| compare_car_numbers(a, b));
        assert_eq!(nums, vec!["01", "2", "2B", "10", "A1"]);
    }

    #[test]
    fn race_data_serializes_camel_case() {
        let data = race(vec![], vec![(2, 2)]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["greenPaceCutoff"], 300.0);
        assert_eq!(json["fcy"], serde_json::json!([[2, 2]]));
        assert!(json.get("classCarCounts").is_some());
    }
}
