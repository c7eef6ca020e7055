//! IMSA timing & scoring JSON export parsing.
//!
//! The lap chart gives running order per lap; flags and race-control
//! messages come from a second document. Messages carry only wall-clock
//! times, so their laps are estimated from flag events that carry both.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::annotations::Annotations;
use crate::caution::{CautionInterval, CautionSet, normalize_intervals};
use crate::timing::parse_clock;
use crate::types::{CarData, Flag, LAP_TIME_SENTINEL, LapRecord, compare_car_numbers};

use super::race_control::{LapInterpolator, RcEventKind, RuleTable};
use super::{
    DEFAULT_CLASS, FileSlot, ParseError, ParseOutput, ParserConfig, RaceParser, SourceFormat,
    assemble_race_data, required_file,
};

pub const LAP_CHART_SLOT: &str = "lapChartJson";
pub const FLAGS_SLOT: &str = "flagsJson";

pub(crate) const FILE_SLOTS: &[FileSlot] = &[
    FileSlot {
        name: LAP_CHART_SLOT,
        required: true,
        description: "lap chart with participants and per-lap running order",
    },
    FileSlot {
        name: FLAGS_SLOT,
        required: true,
        description: "flag transitions and race control messages",
    },
];

#[derive(Debug, Deserialize)]
struct LapChart {
    #[serde(default)]
    session: Option<Value>,
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(default)]
    laps: Vec<LapEntry>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    #[serde(alias = "car", alias = "carNumber", deserialize_with = "car_number")]
    number: String,
    #[serde(default, alias = "teamName")]
    team: String,
    #[serde(default, alias = "className")]
    class: String,
    #[serde(default)]
    vehicle: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LapEntry {
    lap: u32,
    #[serde(default)]
    positions: Vec<PositionEntry>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    #[serde(alias = "car", alias = "carNumber", deserialize_with = "car_number")]
    number: String,
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    driver: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlagsDoc {
    #[serde(default)]
    flags: Vec<FlagEvent>,
    #[serde(default, alias = "race_control", alias = "messages")]
    race_control: Vec<RcMessage>,
}

#[derive(Debug, Deserialize)]
struct FlagEvent {
    #[serde(rename = "type", alias = "flag")]
    kind: String,
    #[serde(default)]
    lap: Option<u32>,
    #[serde(default, deserialize_with = "clock")]
    time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RcMessage {
    #[serde(default, deserialize_with = "clock")]
    time: Option<f64>,
    #[serde(alias = "text")]
    message: String,
}

/// Car numbers appear both as strings and as bare JSON numbers.
fn car_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s.trim().trim_start_matches('#').to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid car number: {other}"))),
    }
}

fn clock<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_clock(&s),
        _ => None,
    })
}

/// Flag transition kinds that matter for caution detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    Green,
    Fcy,
    Red,
    Finish,
    Other,
}

impl FlagKind {
    fn parse(kind: &str) -> Self {
        let upper = kind.to_ascii_uppercase();
        let words: Vec<&str> = upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |pred: fn(&str) -> bool| words.iter().any(|w| pred(w));

        if has(|w| w == "LOCAL") {
            Self::Other
        } else if has(|w| w == "RED") {
            Self::Red
        } else if has(|w| matches!(w, "FCY" | "YELLOW" | "CAUTION" | "CODE" | "SC" | "SAFETY")) {
            Self::Fcy
        } else if has(|w| matches!(w, "FINISH" | "CHECKERED" | "CHEQUERED" | "CHECKER")) {
            Self::Finish
        } else if has(|w| matches!(w, "GREEN" | "GO")) {
            Self::Green
        } else {
            Self::Other
        }
    }
}

/// Participants keyed by car number.
struct Roster<'a> {
    cars: BTreeMap<&'a str, &'a Participant>,
    by_stripped: HashMap<&'a str, &'a str>,
}

impl<'a> Roster<'a> {
    fn new(participants: &'a [Participant], warnings: &mut Vec<String>) -> Self {
        let mut cars = BTreeMap::new();
        let mut by_stripped = HashMap::new();
        for participant in participants {
            let num = participant.number.as_str();
            if cars.insert(num, participant).is_some() {
                warnings.push(format!("participant #{num} is listed twice; last entry kept"));
            }
            by_stripped.entry(strip_zeros(num)).or_insert(num);
        }
        Self { cars, by_stripped }
    }

    /// Exact match first, then ignoring leading zeros.
    fn resolve(&self, raw: &str) -> Option<&'a str> {
        let raw = raw.trim().trim_start_matches('#');
        if let Some((num, _)) = self.cars.get_key_value(raw) {
            return Some(*num);
        }
        self.by_stripped.get(strip_zeros(raw)).copied()
    }
}

fn strip_zeros(num: &str) -> &str {
    match num.trim_start_matches('0') {
        "" if !num.is_empty() => "0",
        rest => rest,
    }
}

/// Per-car laps and driver names as they are read from the lap chart.
#[derive(Debug, Default)]
struct Timeline {
    laps: BTreeMap<u32, LapRecord>,
    drivers: BTreeMap<u32, String>,
}

impl Timeline {
    /// Mark the pit on `lap`, or the next recorded lap when it is missing.
    fn mark_pit(&mut self, lap: u32) -> Option<u32> {
        let (&marked, record) = self.laps.range_mut(lap..).next()?;
        record.is_pit = true;
        Some(marked)
    }
}

/// Caution windows plus the red-flagged part of each.
#[derive(Debug, Default)]
struct CautionPlan {
    intervals: Vec<CautionInterval>,
    red: Vec<CautionInterval>,
}

/// Parser for IMSA JSON exports.
#[derive(Debug, Clone, Default)]
pub struct ImsaParser {
    config: ParserConfig,
}

impl ImsaParser {
    pub const fn new(config: ParserConfig) -> Self {
        Self { config }
    }
}

impl RaceParser for ImsaParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Imsa
    }

    fn file_slots(&self) -> &'static [FileSlot] {
        FILE_SLOTS
    }

    fn parse(&self, files: &HashMap<String, String>) -> Result<ParseOutput, ParseError> {
        let chart: LapChart = parse_json(files, LAP_CHART_SLOT)?;
        let flags: FlagsDoc = parse_json(files, FLAGS_SLOT)?;

        if chart.participants.is_empty() {
            return Err(ParseError::NoParticipants);
        }
        if chart.laps.iter().all(|l| l.lap == 0 || l.positions.is_empty()) {
            return Err(ParseError::NoLaps);
        }
        if let Some(name) = chart.session.as_ref().and_then(|s| s.get("name")).and_then(Value::as_str) {
            tracing::debug!(session = name, "parsing IMSA lap chart");
        }

        let mut warnings = Vec::new();
        let roster = Roster::new(&chart.participants, &mut warnings);
        let mut timelines = read_lap_chart(&chart.laps, &roster, &mut warnings);
        let max_lap = timelines
            .values()
            .filter_map(|t| t.laps.keys().next_back().copied())
            .max()
            .unwrap_or(0);
        if max_lap == 0 {
            return Err(ParseError::NoValidCars);
        }

        let interpolator = LapInterpolator::new(
            flags
                .flags
                .iter()
                .filter_map(|f| Some((f.time?, f.lap.filter(|l| *l > 0)?))),
        );
        let plan = build_cautions(&flags.flags, &interpolator, max_lap, &mut warnings);

        let mut annotations = Annotations::default();
        let pit_entries = apply_race_control(
            &flags.race_control,
            &interpolator,
            &roster,
            max_lap,
            &mut timelines,
            &mut annotations,
            &mut warnings,
        );
        apply_driver_changes(
            &mut timelines,
            &pit_entries,
            self.config.pit_match_window,
            &mut annotations,
        );
        infer_pits_from_drops(&mut timelines, &pit_entries, &self.config);
        apply_flags(&mut timelines, &plan);

        let cars = build_cars(timelines, &roster);
        tracing::debug!(
            cars = cars.len(),
            cautions = plan.intervals.len(),
            "parsed IMSA export"
        );
        let data = assemble_race_data(cars, plan.intervals, self.config.default_green_pace_cutoff)?;

        Ok(ParseOutput {
            data,
            annotations,
            warnings,
        })
    }
}

fn parse_json<T: DeserializeOwned>(
    files: &HashMap<String, String>,
    slot: &str,
) -> Result<T, ParseError> {
    let text = required_file(files, slot)?;
    serde_json::from_str(text).map_err(|source| ParseError::Json {
        slot: slot.to_string(),
        source,
    })
}

fn read_lap_chart(
    entries: &[LapEntry],
    roster: &Roster<'_>,
    warnings: &mut Vec<String>,
) -> BTreeMap<String, Timeline> {
    let mut ordered: Vec<&LapEntry> = entries.iter().filter(|e| e.lap > 0).collect();
    ordered.sort_by_key(|e| e.lap);

    let mut timelines: BTreeMap<String, Timeline> = BTreeMap::new();
    let mut unknown = BTreeSet::new();
    for entry in ordered {
        for (running_order, pos) in (1u32..).zip(&entry.positions) {
            let Some(num) = roster.resolve(&pos.number) else {
                unknown.insert(pos.number.as_str());
                continue;
            };
            let timeline = timelines.entry(num.to_string()).or_default();
            if timeline.laps.contains_key(&entry.lap) {
                warnings.push(format!("car #{num}: lap {} listed twice; first kept", entry.lap));
                continue;
            }
            timeline.laps.insert(
                entry.lap,
                LapRecord {
                    lap: entry.lap,
                    overall_position: pos.position.filter(|p| *p > 0).unwrap_or(running_order),
                    class_position: 0,
                    lap_time_text: String::new(),
                    lap_time_seconds: LAP_TIME_SENTINEL,
                    flag: Flag::Green,
                    is_pit: false,
                    speed: None,
                },
            );
            if let Some(driver) = pos.driver.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                timeline.drivers.insert(entry.lap, driver.to_string());
            }
        }
    }

    for num in unknown {
        warnings.push(format!("car #{num} is not a listed participant; dropped"));
    }
    timelines
}

/// Walk flag events in race order and open/close caution windows.
///
/// Events are ordered by the lap they resolve to, then by time. Untimed
/// events on the same lap keep document order after the timed ones.
fn build_cautions(
    events: &[FlagEvent],
    interpolator: &LapInterpolator,
    max_lap: u32,
    warnings: &mut Vec<String>,
) -> CautionPlan {
    let mut ordered: Vec<(u32, Option<f64>, FlagKind)> = Vec::with_capacity(events.len());
    for event in events {
        let kind = FlagKind::parse(&event.kind);
        if kind == FlagKind::Other {
            continue;
        }
        let lap = event
            .lap
            .filter(|l| *l > 0)
            .or_else(|| event.time.and_then(|t| interpolator.estimate_lap(t, max_lap)));
        let Some(lap) = lap.map(|l| l.clamp(1, max_lap)) else {
            warnings.push(format!("{} flag has no lap or usable time; ignored", event.kind));
            continue;
        };
        ordered.push((lap, event.time, kind));
    }
    ordered.sort_by(|(lap_a, time_a, _), (lap_b, time_b, _)| {
        lap_a.cmp(lap_b).then_with(|| match (time_a, time_b) {
            (Some(a), Some(b)) => a.total_cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    });

    let mut plan = CautionPlan::default();
    let mut close = |start: u32, end: u32, red_from: Option<u32>| {
        plan.intervals.push((start, end));
        if let Some(red) = red_from.filter(|r| *r <= end) {
            plan.red.push((red.max(start), end));
        }
    };

    // (start lap, lap the red flag came out)
    let mut open: Option<(u32, Option<u32>)> = None;
    for (lap, _, kind) in ordered {
        match (kind, open) {
            (FlagKind::Fcy, None) => open = Some((lap, None)),
            (FlagKind::Red, None) => open = Some((lap, Some(lap))),
            (FlagKind::Red, Some((start, None))) => open = Some((start, Some(lap))),
            (FlagKind::Green | FlagKind::Finish, Some((start, red))) => {
                close(start, lap.saturating_sub(1).max(start), red);
                open = None;
            }
            _ => {}
        }
    }
    if let Some((start, red)) = open {
        close(start, max_lap.max(start), red);
    }

    plan.intervals = normalize_intervals(plan.intervals);
    plan
}

/// Classify race-control messages, seed annotations and mark reported pit
/// entries. Returns the `(car, lap)` pit entries for later matching.
fn apply_race_control(
    messages: &[RcMessage],
    interpolator: &LapInterpolator,
    roster: &Roster<'_>,
    max_lap: u32,
    timelines: &mut BTreeMap<String, Timeline>,
    annotations: &mut Annotations,
    warnings: &mut Vec<String>,
) -> Vec<(String, u32)> {
    let rules = RuleTable::standard();
    let mut pit_entries = Vec::new();

    for message in messages {
        let event = rules.classify(&message.message);
        if event.kind == RcEventKind::Info {
            continue;
        }
        let Some(lap) = message
            .time
            .and_then(|t| interpolator.estimate_lap(t, max_lap))
        else {
            warnings.push(format!(
                "race control message \"{}\" has no lap estimate; skipped",
                event.text
            ));
            continue;
        };

        let cars: Vec<&str> = event
            .cars
            .iter()
            .filter_map(|c| roster.resolve(c))
            .filter(|c| timelines.contains_key(*c))
            .collect();
        tracing::debug!(rule = event.rule, lap, cars = ?cars, "race control message");

        for car in cars {
            match event.kind {
                RcEventKind::Penalty => {
                    annotations.entry(car).push_reason(lap, &format!("Penalty: {}", event.text));
                }
                RcEventKind::Incident => {
                    annotations.entry(car).push_reason(lap, &format!("Incident: {}", event.text));
                }
                RcEventKind::PitEntry => {
                    if let Some(timeline) = timelines.get_mut(car) {
                        let marked = timeline.mark_pit(lap).unwrap_or(lap);
                        pit_entries.push((car.to_string(), marked));
                    }
                }
                RcEventKind::Info => {}
            }
        }
    }
    pit_entries
}

fn has_pit_entry_near(entries: &[(String, u32)], car: &str, lap: u32, window: u32) -> bool {
    entries
        .iter()
        .any(|(c, l)| c == car && l.abs_diff(lap) <= window)
}

/// A new driver name between consecutive laps means a driver change,
/// which implies a stop when race control reported none nearby.
fn apply_driver_changes(
    timelines: &mut BTreeMap<String, Timeline>,
    pit_entries: &[(String, u32)],
    window: u32,
    annotations: &mut Annotations,
) {
    for (num, timeline) in timelines.iter_mut() {
        let changes: Vec<(u32, String, String)> = timeline
            .drivers
            .iter()
            .zip(timeline.drivers.iter().skip(1))
            .filter(|((_, from), (_, to))| from != to)
            .map(|((_, from), (lap, to))| (*lap, from.clone(), to.clone()))
            .collect();

        for (lap, from, to) in changes {
            annotations
                .entry(num)
                .push_reason(lap, &format!("Driver change: {from} → {to}"));
            if !has_pit_entry_near(pit_entries, num, lap, window) {
                timeline.mark_pit(lap);
            }
        }
    }
}

/// Large single-lap drops with no reported stop nearby are treated as pits.
fn infer_pits_from_drops(
    timelines: &mut BTreeMap<String, Timeline>,
    pit_entries: &[(String, u32)],
    config: &ParserConfig,
) {
    for (num, timeline) in timelines.iter_mut() {
        let drops: Vec<u32> = timeline
            .laps
            .values()
            .zip(timeline.laps.values().skip(1))
            .filter(|(prev, cur)| {
                cur.lap == prev.lap + 1
                    && !prev.is_pit
                    && !cur.is_pit
                    && cur.overall_position >= prev.overall_position + config.pit_drop_threshold
            })
            .map(|(_, cur)| cur.lap)
            .collect();

        for lap in drops {
            if has_pit_entry_near(pit_entries, num, lap, config.pit_match_window) {
                continue;
            }
            tracing::debug!(car = %num, lap, "inferred pit stop from position drop");
            timeline.mark_pit(lap);
        }
    }
}

fn apply_flags(timelines: &mut BTreeMap<String, Timeline>, plan: &CautionPlan) {
    let caution = CautionSet::from_intervals(&plan.intervals);
    let red: HashSet<u32> = plan.red.iter().flat_map(|&(s, e)| s..=e).collect();

    for record in timelines.values_mut().flat_map(|t| t.laps.values_mut()) {
        record.flag = if red.contains(&record.lap) {
            Flag::Red
        } else if caution.contains(record.lap) {
            Flag::Fcy
        } else {
            Flag::Green
        };
    }
}

/// Finishing order: most laps completed, then last recorded position.
fn build_cars(
    timelines: BTreeMap<String, Timeline>,
    roster: &Roster<'_>,
) -> BTreeMap<String, CarData> {
    let mut order: Vec<(&str, u32, u32)> = timelines
        .iter()
        .filter_map(|(num, t)| {
            t.laps
                .values()
                .next_back()
                .map(|r| (num.as_str(), r.lap, r.overall_position))
        })
        .collect();
    order.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then(a.2.cmp(&b.2))
            .then_with(|| compare_car_numbers(a.0, b.0))
    });
    let finish: HashMap<String, u32> = (1u32..)
        .zip(order)
        .map(|(pos, (num, _, _))| (num.to_string(), pos))
        .collect();

    timelines
        .into_iter()
        .filter(|(_, t)| !t.laps.is_empty())
        .map(|(num, timeline)| {
            let participant = roster.cars.get(num.as_str());
            let class = participant
                .map(|p| p.class.trim())
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CLASS)
                .to_string();
            let team = participant.map_or_else(String::new, |p| {
                if p.team.is_empty() {
                    p.vehicle.clone().unwrap_or_default()
                } else {
                    p.team.clone()
                }
            });
            let car = CarData {
                finish_pos: finish.get(&num).copied().unwrap_or(0),
                num: num.clone(),
                team,
                class,
                finish_pos_class: 0,
                laps: timeline.laps.into_values().collect(),
            };
            (num, car)
        })
        .collect()
}
