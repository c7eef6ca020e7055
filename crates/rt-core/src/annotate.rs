//! Annotation engine: explains position changes and marks pit stops and
//! settle points on top of whatever a parser seeded.
//!
//! The engine is pure: the same data and seed always produce the same
//! result, and feeding a result back in as the seed reproduces it.

use serde::{Deserialize, Serialize};

use crate::annotations::{Annotations, CarAnnotations, PitMarker, SettleMarker};
use crate::index::RaceIndex;
use crate::types::{CarData, LapRecord, RaceData, compare_car_numbers};

const PIT_COLOR: &str = "#f97316";
const PIT_CAUTION_COLOR: &str = "#eab308";
const GAIN_COLOR: &str = "#22c55e";
const LOSS_COLOR: &str = "#ef4444";

/// Pixels between stacked pit labels.
const LABEL_STACK_STEP: i32 = 14;

/// Window sizes and limits used by the engine, in laps unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Laps after a stop searched for a green, non-pit exit lap.
    pub pit_cycle_window: u32,
    /// Wider search that ignores cautions when the first finds nothing.
    pub pit_cycle_fallback_window: u32,
    /// Most cars listed by number in an "also pitting" note.
    pub also_pitting_limit: usize,
    /// Laps after a restart searched for the settled position.
    pub settle_window: u32,
    /// Pit settles closer than this to another settle are dropped.
    pub settle_dedupe_window: u32,
    /// Pit markers closer than this get stacked labels.
    pub marker_stack_window: u32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            pit_cycle_window: 8,
            pit_cycle_fallback_window: 12,
            also_pitting_limit: 5,
            settle_window: 5,
            settle_dedupe_window: 2,
            marker_stack_window: 3,
        }
    }
}

/// Generate annotations with the default configuration.
pub fn generate_annotations(data: &RaceData, existing: Option<&Annotations>) -> Annotations {
    generate_annotations_with(data, existing, &AnnotationConfig::default())
}

/// Generate annotations for every car and merge them into `existing`.
///
/// Existing reasons are kept after new text for the same lap, existing
/// markers are never removed, and settle markers are only generated for
/// cars that have none yet.
pub fn generate_annotations_with(
    data: &RaceData,
    existing: Option<&Annotations>,
    config: &AnnotationConfig,
) -> Annotations {
    let index = RaceIndex::build(data);
    let mut merged = existing.cloned().unwrap_or_default();

    for car in data.cars.values() {
        let has_settles = merged.car(&car.num).is_some_and(|a| !a.settles.is_empty());
        let inferred = annotate_car(&index, car, config, !has_settles);

        let entry = merged.entry(&car.num);
        for (lap, text) in &inferred.reasons {
            entry.merge_reason(*lap, text);
        }
        entry.merge_pits(inferred.pits);
        if !has_settles {
            entry.merge_settles(inferred.settles);
        }
    }

    merged.prune();
    merged
}

fn annotate_car(
    index: &RaceIndex<'_>,
    car: &CarData,
    config: &AnnotationConfig,
    with_settles: bool,
) -> CarAnnotations {
    let mut out = CarAnnotations::default();
    let mut last_marker: Option<(u32, i32)> = None;

    for pair in car.laps.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        if cur.is_pit {
            let (marker, reason) = pit_stop(index, car, prev, cur, last_marker, config);
            last_marker = Some((marker.lap, marker.vertical_offset));
            out.pits.push(marker);
            out.reasons.insert(cur.lap, reason);
        } else if cur.overall_position != prev.overall_position {
            out.reasons.insert(cur.lap, position_change(index, car, prev, cur));
        }
    }

    if with_settles {
        out.settles = settle_markers(index, car, config);
    }
    out
}

/// Positions gained (positive) or lost between two positions.
#[allow(clippy::cast_possible_wrap)]
const fn gain(before: u32, after: u32) -> i32 {
    before as i32 - after as i32
}

/// First lap after a stop that reflects the car's real running position.
fn pit_exit<'a>(
    index: &RaceIndex<'a>,
    num: &str,
    lap: u32,
    config: &AnnotationConfig,
) -> Option<&'a LapRecord> {
    index
        .laps_after(num, lap)
        .take_while(|r| r.lap <= lap + config.pit_cycle_window)
        .find(|r| !r.is_pit && !index.is_caution(r.lap))
        .or_else(|| {
            index
                .laps_after(num, lap)
                .take_while(|r| r.lap <= lap + config.pit_cycle_fallback_window)
                .find(|r| !r.is_pit)
        })
}

fn pit_stop(
    index: &RaceIndex<'_>,
    car: &CarData,
    prev: &LapRecord,
    cur: &LapRecord,
    last_marker: Option<(u32, i32)>,
    config: &AnnotationConfig,
) -> (PitMarker, String) {
    let under_caution = index.is_caution(cur.lap);
    let before = prev.overall_position;
    let after = pit_exit(index, &car.num, cur.lap, config).map(|r| r.overall_position);
    let delta = after.map(|a| gain(before, a));

    let vertical_offset = match last_marker {
        Some((lap, offset)) if cur.lap - lap <= config.marker_stack_window => {
            offset + LABEL_STACK_STEP
        }
        _ => 0,
    };
    let marker = PitMarker {
        lap: cur.lap,
        label: if under_caution { "Pit (FCY)" } else { "Pit" }.to_string(),
        color: if under_caution { PIT_CAUTION_COLOR } else { PIT_COLOR }.to_string(),
        vertical_offset,
        position_delta: delta,
    };

    let mut parts = Vec::new();
    let base = if under_caution {
        "Pit stop under caution"
    } else {
        "Pit stop"
    };
    parts.push(match (after, delta) {
        (Some(after), Some(delta)) => {
            format!("{base}: P{before} → P{after} ({})", describe_delta(delta))
        }
        _ => base.to_string(),
    });

    let mut others: Vec<&str> = index
        .pitting_on(cur.lap)
        .iter()
        .copied()
        .filter(|o| *o != car.num && index.car(o).is_some_and(|c| c.class == car.class))
        .collect();
    others.sort_by(|a, b| compare_car_numbers(a, b));
    if others.len() > config.also_pitting_limit {
        parts.push(format!("also pitting: {} cars", others.len()));
    } else if !others.is_empty() {
        let listed: Vec<String> = others.iter().map(|o| format!("#{o}")).collect();
        parts.push(format!("also pitting: {}", listed.join(", ")));
    }

    (marker, parts.join("; "))
}

fn describe_delta(delta: i32) -> String {
    match delta {
        0 => "held position".to_string(),
        d if d > 0 => format!("gained {d}"),
        d => format!("lost {}", d.unsigned_abs()),
    }
}

fn position_change(index: &RaceIndex<'_>, car: &CarData, prev: &LapRecord, cur: &LapRecord) -> String {
    let (my_prev, my_cur) = (prev.overall_position, cur.overall_position);
    let gained = my_cur < my_prev;

    let mut crossings: Vec<(u32, String)> = Vec::new();
    for other in index.data().cars.values().filter(|o| o.num != car.num) {
        let (Some(other_prev), Some(other_cur)) = (
            index.position(&other.num, prev.lap),
            index.position(&other.num, cur.lap),
        ) else {
            continue;
        };
        let crossed = if gained {
            other_prev < my_prev && other_cur > my_cur
        } else {
            other_prev > my_prev && other_cur < my_cur
        };
        if !crossed {
            continue;
        }

        let span = || prev.lap + 1..=cur.lap;
        let kind = if span().any(|l| index.is_pit(&other.num, l)) {
            "pitted"
        } else if span().any(|l| index.is_caution(l)) {
            "yellow"
        } else {
            "on pace"
        };
        let who = if other.team.is_empty() {
            format!("#{}", other.num)
        } else {
            format!("#{} {}", other.num, other.team)
        };
        crossings.push((other_cur, format!("{who} {kind}")));
    }
    crossings.sort_by_key(|(position, _)| *position);

    if crossings.is_empty() {
        let n = my_prev.abs_diff(my_cur);
        let noun = if n == 1 { "position" } else { "positions" };
        let verb = if gained { "Gained" } else { "Lost" };
        return format!("{verb} {n} {noun}");
    }

    let listed: Vec<String> = crossings.into_iter().map(|(_, text)| text).collect();
    if gained {
        format!("Gained — passed {}", listed.join("; "))
    } else {
        format!("Lost — passed by {}", listed.join("; "))
    }
}

fn settle_markers(index: &RaceIndex<'_>, car: &CarData, config: &AnnotationConfig) -> Vec<SettleMarker> {
    let num = car.num.as_str();
    let mut settles: Vec<SettleMarker> = Vec::new();

    for &(start, end) in &index.data().fcy {
        let Some(before) = index.last_before(num, start) else {
            continue;
        };
        let settled = index
            .laps_after(num, end)
            .take_while(|r| r.lap <= end + config.settle_window)
            .find(|r| !r.is_pit && !index.is_caution(r.lap))
            .or_else(|| index.laps_after(num, end).find(|r| !r.is_pit));
        if let Some(settled) = settled {
            if let Some(marker) = settle(before.overall_position, settled, "FCY") {
                settles.push(marker);
            }
        }
    }

    for stop in car.laps.iter().filter(|r| r.is_pit && !index.is_caution(r.lap)) {
        let Some(before) = index.last_before(num, stop.lap) else {
            continue;
        };
        let Some(settled) = pit_exit(index, num, stop.lap, config) else {
            continue;
        };
        if settles
            .iter()
            .any(|s| s.lap.abs_diff(settled.lap) <= config.settle_dedupe_window)
        {
            continue;
        }
        if let Some(marker) = settle(before.overall_position, settled, "pit") {
            settles.push(marker);
        }
    }

    settles.sort_by_key(|s| s.lap);
    settles
}

fn settle(before: u32, settled: &LapRecord, after_what: &str) -> Option<SettleMarker> {
    let after = settled.overall_position;
    let delta = gain(before, after);
    if delta == 0 {
        return None;
    }
    let (change, color) = if delta > 0 {
        (format!("Gained {delta}"), GAIN_COLOR)
    } else {
        (format!("Lost {}", delta.unsigned_abs()), LOSS_COLOR)
    };
    Some(SettleMarker {
        lap: settled.lap,
        settled_position: after,
        label: format!("P{after} after {after_what}"),
        subtitle: format!("Was P{before} · {change}"),
        color: color.to_string(),
    })
}
