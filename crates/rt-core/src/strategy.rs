//! Per-car strategy scoring.
//!
//! Each car gets raw metrics (green pace, pit cost, caution pit share,
//! consistency) which are min–max normalised within its class and combined
//! into a 0–100 composite.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::caution::CautionSet;
use crate::types::{CarData, Flag, RaceData, compare_car_numbers};

/// Score given when a metric can't discriminate between cars.
const NEUTRAL_SCORE: f64 = 50.0;

/// Relative weight of each signal in the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub pace: f64,
    pub caution_pits: f64,
    pub pit_efficiency: f64,
    pub consistency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            pace: 0.4,
            caution_pits: 0.3,
            pit_efficiency: 0.2,
            consistency: 0.1,
        }
    }
}

impl ScoringWeights {
    fn total(&self) -> f64 {
        self.pace + self.caution_pits + self.pit_efficiency + self.consistency
    }
}

/// Strategy metrics and scores for one car.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarStrategy {
    pub num: String,
    pub team: String,
    pub class: String,
    pub finish_pos: u32,
    pub finish_pos_class: u32,
    /// Mean green lap time in seconds.
    pub avg_green_pace: Option<f64>,
    pub best_lap: Option<f64>,
    pub pit_count: usize,
    /// Seconds lost in the pits beyond green pace.
    pub total_pit_time: f64,
    /// Share of stops made under caution, 0–100.
    pub caution_pit_pct: Option<f64>,
    pub stint_count: usize,
    /// Population standard deviation of green lap times.
    pub lap_time_std_dev: Option<f64>,
    pub pace_score: f64,
    pub caution_pit_score: f64,
    pub pit_efficiency_score: f64,
    pub consistency_score: f64,
    /// Weighted composite, 0–100.
    pub score: u32,
}

/// Raw metrics before normalisation.
#[derive(Debug, Clone)]
struct Metrics<'a> {
    car: &'a CarData,
    avg_green_pace: Option<f64>,
    best_lap: Option<f64>,
    pit_count: usize,
    total_pit_time: f64,
    caution_pit_pct: Option<f64>,
    std_dev: Option<f64>,
}

/// Score every car, sorted by class then class finishing position.
pub fn score_strategies(data: &RaceData, weights: &ScoringWeights) -> Vec<CarStrategy> {
    let cautions = data.cautions();
    let mut by_class: BTreeMap<&str, Vec<Metrics<'_>>> = BTreeMap::new();
    for car in data.cars.values() {
        by_class
            .entry(car.class.as_str())
            .or_default()
            .push(car_metrics(car, &cautions, data.green_pace_cutoff));
    }

    let mut results = Vec::with_capacity(data.cars.len());
    for members in by_class.values() {
        let pace = column(members, |m| m.avg_green_pace);
        let caution = column(members, |m| m.caution_pit_pct);
        let pit_time = column(members, |m| m.avg_green_pace.map(|_| m.total_pit_time));
        let spread = column(members, |m| m.std_dev);

        for (idx, metrics) in members.iter().enumerate() {
            let pace_score = normalize(&pace, idx, false);
            let caution_pit_score = normalize(&caution, idx, true);
            let pit_efficiency_score = normalize(&pit_time, idx, false);
            let consistency_score = normalize(&spread, idx, false);
            let score = composite(
                weights,
                [pace_score, caution_pit_score, pit_efficiency_score, consistency_score],
            );

            let car = metrics.car;
            results.push(CarStrategy {
                num: car.num.clone(),
                team: car.team.clone(),
                class: car.class.clone(),
                finish_pos: car.finish_pos,
                finish_pos_class: car.finish_pos_class,
                avg_green_pace: metrics.avg_green_pace,
                best_lap: metrics.best_lap,
                pit_count: metrics.pit_count,
                total_pit_time: metrics.total_pit_time,
                caution_pit_pct: metrics.caution_pit_pct,
                stint_count: metrics.pit_count + 1,
                lap_time_std_dev: metrics.std_dev,
                pace_score,
                caution_pit_score,
                pit_efficiency_score,
                consistency_score,
                score,
            });
        }
    }

    results.sort_by(|a, b| {
        a.class
            .cmp(&b.class)
            .then(a.finish_pos_class.cmp(&b.finish_pos_class))
            .then_with(|| compare_car_numbers(&a.num, &b.num))
    });
    results
}

#[allow(clippy::cast_precision_loss)]
fn car_metrics<'a>(car: &'a CarData, cautions: &CautionSet, cutoff: f64) -> Metrics<'a> {
    let green: Vec<f64> = car
        .laps
        .iter()
        .filter(|r| {
            !r.is_pit
                && !cautions.contains(r.lap)
                && r.flag == Flag::Green
                && r.has_valid_time()
                && r.lap_time_seconds < cutoff
        })
        .map(|r| r.lap_time_seconds)
        .collect();

    let avg_green_pace = (!green.is_empty()).then(|| green.iter().sum::<f64>() / green.len() as f64);
    let best_lap = green.iter().copied().reduce(f64::min);
    let std_dev = avg_green_pace.filter(|_| green.len() >= 2).map(|mean| {
        let variance = green.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / green.len() as f64;
        variance.sqrt()
    });

    let pits: Vec<_> = car.laps.iter().filter(|r| r.is_pit).collect();
    let total_pit_time = avg_green_pace.map_or(0.0, |avg| {
        pits.iter()
            .filter(|r| r.has_valid_time())
            .map(|r| (r.lap_time_seconds - avg).max(0.0))
            .sum()
    });
    // None for cars without stops, which scores neutral rather than 0%.
    let caution_pit_pct = (!pits.is_empty()).then(|| {
        let under_caution = pits.iter().filter(|r| cautions.contains(r.lap)).count();
        under_caution as f64 / pits.len() as f64 * 100.0
    });

    Metrics {
        car,
        avg_green_pace,
        best_lap,
        pit_count: pits.len(),
        total_pit_time,
        caution_pit_pct,
        std_dev,
    }
}

fn column(members: &[Metrics<'_>], metric: impl Fn(&Metrics<'_>) -> Option<f64>) -> Vec<Option<f64>> {
    members.iter().map(metric).collect()
}

/// Min–max normalise `values[idx]` to 0–100 within its class.
fn normalize(values: &[Option<f64>], idx: usize, higher_is_better: bool) -> f64 {
    if values.len() <= 1 {
        return NEUTRAL_SCORE;
    }
    let Some(value) = values.get(idx).copied().flatten() else {
        return NEUTRAL_SCORE;
    };
    let present = values.iter().flatten().copied();
    let (min, max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let range = max - min;
    if range <= f64::EPSILON {
        return NEUTRAL_SCORE;
    }

    let ratio = (value - min) / range;
    if higher_is_better {
        ratio * 100.0
    } else {
        (1.0 - ratio) * 100.0
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn composite(weights: &ScoringWeights, scores: [f64; 4]) -> u32 {
    let total = weights.total();
    if total <= 0.0 {
        return NEUTRAL_SCORE as u32;
    }
    let weighted = weights.pace * scores[0]
        + weights.caution_pits * scores[1]
        + weights.pit_efficiency * scores[2]
        + weights.consistency * scores[3];
    (weighted / total).round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LapRecord;
    use crate::types::tests::lap;

    fn car(num: &str, class: &str, finish_pos_class: u32, laps: Vec<LapRecord>) -> CarData {
        CarData {
            num: num.to_string(),
            team: format!("Team {num}"),
            class: class.to_string(),
            finish_pos: finish_pos_class,
            finish_pos_class,
            laps,
        }
    }

    fn race(cars: Vec<CarData>, fcy: Vec<(u32, u32)>) -> RaceData {
        RaceData {
            max_lap: 10,
            total_cars: cars.len(),
            green_pace_cutoff: 300.0,
            cars: cars.into_iter().map(|c| (c.num.clone(), c)).collect(),
            fcy,
            class_groups: BTreeMap::new(),
            class_car_counts: BTreeMap::new(),
        }
    }

    fn timed(times: &[f64]) -> Vec<LapRecord> {
        (1u32..).zip(times).map(|(l, &t)| lap(l, 1, t)).collect()
    }

    #[test]
    fn single_car_class_scores_fifty() {
        let data = race(vec![car("7", "LMP2", 1, timed(&[90.0, 92.0, 91.0]))], vec![]);
        let scores = score_strategies(&data, &ScoringWeights::default());
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 50);
        assert!((scores[0].pace_score - 50.0).abs() < f64::EPSILON);
        assert_eq!(scores[0].stint_count, 1);
    }

    #[test]
    fn faster_car_wins_pace() {
        let data = race(
            vec![
                car("1", "GT", 1, timed(&[90.0, 91.0])),
                car("2", "GT", 2, timed(&[95.0, 96.0])),
            ],
            vec![],
        );
        let scores = score_strategies(&data, &ScoringWeights::default());
        assert_eq!(scores[0].num, "1");
        assert!((scores[0].pace_score - 100.0).abs() < 1e-9);
        assert!(scores[1].pace_score.abs() < 1e-9);
        assert_eq!(scores[0].score, 70);
        assert_eq!(scores[1].score, 30);
        assert_eq!(scores[0].avg_green_pace, Some(90.5));
        assert_eq!(scores[0].best_lap, Some(90.0));
        assert!((scores[0].lap_time_std_dev.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn pit_metrics_and_caution_laps() {
        let mut laps = timed(&[90.0, 120.0, 150.0, 90.0, 92.0]);
        laps[1].flag = Flag::Fcy;
        laps[2].is_pit = true;
        let data = race(vec![car("3", "GT", 1, laps)], vec![(2, 3)]);
        let scores = score_strategies(&data, &ScoringWeights::default());
        let s = &scores[0];

        // Lap 2 (caution) and lap 3 (pit) are not green pace.
        let avg = (90.0 + 90.0 + 92.0) / 3.0;
        assert!((s.avg_green_pace.unwrap() - avg).abs() < 1e-9);
        assert!((s.total_pit_time - (150.0 - avg)).abs() < 1e-9);
        assert_eq!(s.caution_pit_pct, Some(100.0));
        assert_eq!(s.pit_count, 1);
        assert_eq!(s.stint_count, 2);
    }

    #[test]
    fn scores_stay_in_range_and_sorted() {
        let mut slow_pit = timed(&[100.0, 180.0, 101.0, 99.0]);
        slow_pit[1].is_pit = true;
        let mut fast_pit = timed(&[98.0, 130.0, 97.0, 99.5]);
        fast_pit[1].is_pit = true;
        let data = race(
            vec![
                car("10", "GT", 2, slow_pit),
                car("9", "GT", 1, fast_pit),
                car("2", "AA", 1, timed(&[80.0, 81.0])),
            ],
            vec![],
        );
        let scores = score_strategies(&data, &ScoringWeights::default());
        let order: Vec<_> = scores.iter().map(|s| s.num.as_str()).collect();
        assert_eq!(order, vec!["2", "9", "10"]);
        assert!(scores.iter().all(|s| s.score <= 100));
        assert!(scores[1].pit_efficiency_score > scores[2].pit_efficiency_score);
    }

    #[test]
    fn car_without_stops_gets_neutral_caution_score() {
        let mut under_caution = timed(&[90.0, 130.0, 91.0]);
        under_caution[1].is_pit = true;
        let mut green_stop = timed(&[90.0, 91.0, 140.0]);
        green_stop[2].is_pit = true;
        let data = race(
            vec![
                car("1", "GT", 1, timed(&[90.0, 91.0, 92.0])),
                car("2", "GT", 2, under_caution),
                car("3", "GT", 3, green_stop),
            ],
            vec![(2, 2)],
        );
        let scores = score_strategies(&data, &ScoringWeights::default());

        assert_eq!(scores[0].num, "1");
        assert_eq!(scores[0].caution_pit_pct, None);
        assert!((scores[0].caution_pit_score - 50.0).abs() < f64::EPSILON);
        assert_eq!(scores[1].caution_pit_pct, Some(100.0));
        assert!((scores[1].caution_pit_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(scores[2].caution_pit_pct, Some(0.0));
        assert!(scores[2].caution_pit_score.abs() < f64::EPSILON);
    }

    #[test]
    fn missing_metric_is_neutral() {
        let values = [Some(1.0), None, Some(3.0)];
        assert!((normalize(&values, 1, true) - 50.0).abs() < f64::EPSILON);
        assert!((normalize(&values, 0, true)).abs() < f64::EPSILON);
        assert!((normalize(&values, 0, false) - 100.0).abs() < f64::EPSILON);
    }
}
