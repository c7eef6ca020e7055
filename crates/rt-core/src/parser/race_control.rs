//! Race-control message classification and time-to-lap estimation.
//!
//! Messages are matched against an ordered [`RuleTable`]; the first rule
//! whose pattern matches and whose handler accepts the message wins, and a
//! generic rule catches everything else.

use std::sync::LazyLock;

use regex::Regex;

/// `#7`, `# 12A`
static HASH_CAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\s*(\d+[A-Za-z]?)\b").unwrap());

/// `CAR 7`, `CARS 7, 12 AND 25`
static CAR_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcars?\s+#?\d+[a-z]?\b(?:\s*(?:,|&|\band\b)\s*#?\d+[a-z]?\b)*").unwrap()
});

static CAR_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+[A-Za-z]?").unwrap());

static STANDARD_RULES: LazyLock<RuleTable> = LazyLock::new(RuleTable::build_standard);

const PENALTY_PATTERN: &str =
    r"(?i)\bpenalt(?:y|ies)\b|\bdrive[- ]?through\b|\bstop[- ]?(?:and|&|\+)[- ]?go\b|\bstop[- ]?hold\b";

/// What a race-control message means for the cars it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcEventKind {
    Penalty,
    PitEntry,
    Incident,
    Info,
}

/// A classified race-control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcEvent {
    pub kind: RcEventKind,
    /// Name of the rule that matched.
    pub rule: &'static str,
    /// Car numbers as written in the message; empty means global.
    pub cars: Vec<String>,
    pub text: String,
}

type Handler = fn(&str, Vec<String>) -> Option<RcEvent>;

/// One classification rule.
pub struct RcRule {
    pub name: &'static str,
    pattern: Regex,
    handler: Handler,
}

impl std::fmt::Debug for RcRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Ordered race-control rules, first match wins.
#[derive(Debug)]
pub struct RuleTable {
    rules: Vec<RcRule>,
}

impl RuleTable {
    /// The built-in rule set.
    pub fn standard() -> &'static Self {
        &STANDARD_RULES
    }

    fn build_standard() -> Self {
        let rule = |name, pattern: &str, handler: Handler| RcRule {
            name,
            pattern: Regex::new(pattern).unwrap(),
            handler,
        };

        Self {
            rules: vec![
                rule("multi_car_penalty", PENALTY_PATTERN, |text, cars| {
                    (cars.len() >= 2).then(|| event(RcEventKind::Penalty, "multi_car_penalty", cars, text))
                }),
                rule("single_car_penalty", PENALTY_PATTERN, |text, cars| {
                    (cars.len() == 1).then(|| event(RcEventKind::Penalty, "single_car_penalty", cars, text))
                }),
                rule(
                    "pit_entry",
                    r"(?i)\bpit\s*(?:lane\s*)?(?:entry|in)\b|\benter(?:s|ed|ing)?\s+(?:the\s+)?pits?\b|\binto\s+(?:the\s+)?pits?\b",
                    |text, cars| {
                        (!cars.is_empty()).then(|| event(RcEventKind::PitEntry, "pit_entry", cars, text))
                    },
                ),
                rule("incident_involving", r"(?i)\bincident\s+involving\b", |text, cars| {
                    (cars.len() >= 2).then(|| event(RcEventKind::Incident, "incident_involving", cars, text))
                }),
                rule(
                    "off_course",
                    r"(?i)\b(?:off[- ]?course|off[- ]?track|stopped|spin|spun|contact|crash|accident|incident|in the wall)\b",
                    |text, cars| Some(event(RcEventKind::Incident, "off_course", cars, text)),
                ),
                rule("generic", r"", |text, cars| {
                    Some(event(RcEventKind::Info, "generic", cars, text))
                }),
            ],
        }
    }

    /// Classify a message. Always succeeds thanks to the generic rule.
    pub fn classify(&self, message: &str) -> RcEvent {
        let text = message.trim();
        let cars = extract_cars(text);

        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(text))
            .find_map(|rule| (rule.handler)(text, cars.clone()))
            .unwrap_or_else(|| event(RcEventKind::Info, "generic", cars, text))
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name)
    }
}

fn event(kind: RcEventKind, rule: &'static str, cars: Vec<String>, text: &str) -> RcEvent {
    RcEvent {
        kind,
        rule,
        cars,
        text: text.to_string(),
    }
}

/// Car numbers mentioned in a message, in order of first appearance.
pub fn extract_cars(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = HASH_CAR_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect();

    for list in CAR_LIST_RE.find_iter(text) {
        // Skip the leading "car"/"cars" word.
        let body_start = list.as_str().find(char::is_whitespace).unwrap_or(0);
        let body = &list.as_str()[body_start..];
        for token in CAR_TOKEN_RE.find_iter(body) {
            found.push((list.start() + body_start + token.start(), token.as_str().to_string()));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);
    let mut cars: Vec<String> = Vec::with_capacity(found.len());
    for (_, car) in found {
        if !cars.contains(&car) {
            cars.push(car);
        }
    }
    cars
}

/// Piecewise-linear mapping from wall-clock seconds to lap number.
#[derive(Debug, Clone, Default)]
pub struct LapInterpolator {
    anchors: Vec<(f64, f64)>,
}

impl LapInterpolator {
    /// Build from `(timestamp, lap)` anchors. Anchors sharing a timestamp
    /// collapse to the first one given.
    pub fn new(anchors: impl IntoIterator<Item = (f64, u32)>) -> Self {
        let mut anchors: Vec<(f64, f64)> = anchors
            .into_iter()
            .filter(|(t, _)| t.is_finite())
            .map(|(t, lap)| (t, f64::from(lap)))
            .collect();
        anchors.sort_by(|a, b| a.0.total_cmp(&b.0));
        anchors.dedup_by(|later, earlier| later.0 == earlier.0);
        Self { anchors }
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Fractional lap at time `t`, extrapolating past either end.
    pub fn interpolate(&self, t: f64) -> Option<f64> {
        match self.anchors.as_slice() {
            [] => None,
            [(_, lap)] => Some(*lap),
            anchors => {
                let upper = anchors
                    .partition_point(|(at, _)| *at <= t)
                    .clamp(1, anchors.len() - 1);
                let (t0, l0) = anchors[upper - 1];
                let (t1, l1) = anchors[upper];
                Some(l0 + (t - t0) * (l1 - l0) / (t1 - t0))
            }
        }
    }

    /// Whole lap at time `t`, floored and clamped to `[1, max_lap]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn estimate_lap(&self, t: f64, max_lap: u32) -> Option<u32> {
        let lap = self.interpolate(t)?;
        if !lap.is_finite() {
            return None;
        }
        let max = f64::from(max_lap.max(1));
        Some(lap.floor().clamp(1.0, max) as u32)
    }
}
