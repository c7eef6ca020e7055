//! Per-lap lap-time rankings.

use std::collections::BTreeMap;

use crate::types::{RaceData, compare_car_numbers};

/// Rank cars by lap time on every green lap.
///
/// Caution laps are skipped entirely. Only non-pit laps with a real time
/// are ranked, equal times share a rank and ranks are dense. Laps with no
/// eligible car are absent from the result.
pub fn rank_lap_times(data: &RaceData, class: Option<&str>) -> BTreeMap<u32, BTreeMap<String, u32>> {
    let cautions = data.cautions();
    let mut by_lap: BTreeMap<u32, Vec<(f64, &str)>> = BTreeMap::new();

    for car in data.cars.values().filter(|c| class.is_none_or(|cl| c.class == cl)) {
        for record in &car.laps {
            if cautions.contains(record.lap) || record.is_pit || !record.has_valid_time() {
                continue;
            }
            by_lap
                .entry(record.lap)
                .or_default()
                .push((record.lap_time_seconds, car.num.as_str()));
        }
    }

    by_lap
        .into_iter()
        .map(|(lap, mut entries)| {
            entries.sort_by(|(ta, na), (tb, nb)| ta.total_cmp(tb).then_with(|| compare_car_numbers(na, nb)));

            let mut ranks = BTreeMap::new();
            let mut rank = 0;
            let mut previous: Option<f64> = None;
            for (time, num) in entries {
                if previous.is_none_or(|p| time > p) {
                    rank += 1;
                    previous = Some(time);
                }
                ranks.insert(num.to_string(), rank);
            }
            (lap, ranks)
        })
        .collect()
}
