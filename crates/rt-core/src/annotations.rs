//! Per-car chart annotations and their append-only merge rules.
//!
//! Annotations are keyed by `(car number, lap)` and carry no identity of
//! their own. Parsers may seed them; the annotation engine only ever adds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Separator between reasons recorded for the same lap.
pub const REASON_SEPARATOR: &str = "; ";

/// Pit stop marker drawn on a car's position chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitMarker {
    pub lap: u32,
    pub label: String,
    pub color: String,
    /// Label stacking offset in pixels so nearby markers don't overlap.
    pub vertical_offset: i32,
    /// Net positions gained (positive) or lost over the pit cycle.
    #[serde(default)]
    pub position_delta: Option<i32>,
}

/// Marks where a car's running order settled after a pit stop or caution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleMarker {
    pub lap: u32,
    pub settled_position: u32,
    pub label: String,
    pub subtitle: String,
    pub color: String,
}

/// Everything annotated for one car.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarAnnotations {
    pub reasons: BTreeMap<u32, String>,
    pub pits: Vec<PitMarker>,
    pub settles: Vec<SettleMarker>,
}

impl CarAnnotations {
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty() && self.pits.is_empty() && self.settles.is_empty()
    }

    /// Append a reason after whatever is already recorded for the lap.
    pub fn push_reason(&mut self, lap: u32, text: &str) {
        match self.reasons.get_mut(&lap) {
            Some(existing) if contains_reason(existing, text) => {}
            Some(existing) => {
                existing.push_str(REASON_SEPARATOR);
                existing.push_str(text);
            }
            None => {
                self.reasons.insert(lap, text.to_string());
            }
        }
    }

    /// Merge an inferred reason: new text first, pre-existing text last.
    ///
    /// Text already present for the lap is not repeated, which keeps
    /// regeneration over a previous result stable.
    pub fn merge_reason(&mut self, lap: u32, text: &str) {
        match self.reasons.get_mut(&lap) {
            Some(existing) if contains_reason(existing, text) => {}
            Some(existing) => {
                *existing = format!("{text}{REASON_SEPARATOR}{existing}");
            }
            None => {
                self.reasons.insert(lap, text.to_string());
            }
        }
    }

    /// Append pit markers for laps not already covered, then sort by lap.
    pub fn merge_pits(&mut self, new: impl IntoIterator<Item = PitMarker>) {
        for marker in new {
            if !self.pits.iter().any(|m| m.lap == marker.lap) {
                self.pits.push(marker);
            }
        }
        self.pits.sort_by_key(|m| m.lap);
    }

    /// Append settle markers for laps not already covered, then sort by lap.
    pub fn merge_settles(&mut self, new: impl IntoIterator<Item = SettleMarker>) {
        for marker in new {
            if !self.settles.iter().any(|m| m.lap == marker.lap) {
                self.settles.push(marker);
            }
        }
        self.settles.sort_by_key(|m| m.lap);
    }
}

/// Whether `text` already appears in `existing` as whole reason segments.
fn contains_reason(existing: &str, text: &str) -> bool {
    existing == text
        || existing.starts_with(&format!("{text}{REASON_SEPARATOR}"))
        || existing.ends_with(&format!("{REASON_SEPARATOR}{text}"))
        || existing.contains(&format!("{REASON_SEPARATOR}{text}{REASON_SEPARATOR}"))
}

/// Annotations for every car, keyed by car number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations {
    cars: BTreeMap<String, CarAnnotations>,
}

impl Annotations {
    pub fn car(&self, num: &str) -> Option<&CarAnnotations> {
        self.cars.get(num)
    }

    /// Mutable access, creating an empty entry on first use.
    pub fn entry(&mut self, num: &str) -> &mut CarAnnotations {
        self.cars.entry(num.to_string()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CarAnnotations)> {
        self.cars.iter()
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    /// Drop cars whose annotations are all empty.
    pub fn prune(&mut self) {
        self.cars.retain(|_, car| !car.is_empty());
    }
}
