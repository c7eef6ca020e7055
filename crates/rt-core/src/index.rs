//! Pre-built lookup structures over a [`RaceData`].
//!
//! Engines receive a [`RaceIndex`] instead of rebuilding ad hoc maps.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::caution::CautionSet;
use crate::types::{CarData, LapRecord, RaceData};

/// Read-only indexes shared by the inference passes.
#[derive(Debug)]
pub struct RaceIndex<'a> {
    data: &'a RaceData,
    laps: HashMap<&'a str, BTreeMap<u32, &'a LapRecord>>,
    pits_by_lap: BTreeMap<u32, Vec<&'a str>>,
    cautions: CautionSet,
}

impl<'a> RaceIndex<'a> {
    pub fn build(data: &'a RaceData) -> Self {
        let mut laps = HashMap::with_capacity(data.cars.len());
        let mut pits_by_lap: BTreeMap<u32, Vec<&'a str>> = BTreeMap::new();

        for (num, car) in &data.cars {
            let by_lap: BTreeMap<u32, &LapRecord> = car.laps.iter().map(|r| (r.lap, r)).collect();
            for record in car.laps.iter().filter(|r| r.is_pit) {
                pits_by_lap.entry(record.lap).or_default().push(num.as_str());
            }
            laps.insert(num.as_str(), by_lap);
        }

        Self {
            data,
            laps,
            pits_by_lap,
            cautions: data.cautions(),
        }
    }

    pub const fn data(&self) -> &'a RaceData {
        self.data
    }

    pub fn car(&self, num: &str) -> Option<&'a CarData> {
        self.data.cars.get(num)
    }

    pub fn record(&self, num: &str, lap: u32) -> Option<&'a LapRecord> {
        self.laps.get(num)?.get(&lap).copied()
    }

    pub fn position(&self, num: &str, lap: u32) -> Option<u32> {
        self.record(num, lap).map(|r| r.overall_position)
    }

    pub fn is_pit(&self, num: &str, lap: u32) -> bool {
        self.record(num, lap).is_some_and(|r| r.is_pit)
    }

    pub fn is_caution(&self, lap: u32) -> bool {
        self.cautions.contains(lap)
    }

    /// Cars that pitted on a lap, in car-number order of the dataset.
    pub fn pitting_on(&self, lap: u32) -> &[&'a str] {
        self.pits_by_lap
            .get(&lap)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Last recorded lap strictly before `lap`.
    pub fn last_before(&self, num: &str, lap: u32) -> Option<&'a LapRecord> {
        self.laps
            .get(num)?
            .range(..lap)
            .next_back()
            .map(|(_, r)| *r)
    }

    /// Recorded laps strictly after `lap`, in order.
    pub fn laps_after(&self, num: &str, lap: u32) -> impl Iterator<Item = &'a LapRecord> + '_ {
        self.laps
            .get(num)
            .into_iter()
            .flat_map(move |by_lap| by_lap.range((Bound::Excluded(lap), Bound::Unbounded)))
            .map(|(_, r)| *r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::lap;

    fn data() -> RaceData {
        let mut pit = lap(3, 4, 120.0);
        pit.is_pit = true;
        let car = CarData {
            num: "7".to_string(),
            team: "Team 7".to_string(),
            class: "GT".to_string(),
            finish_pos: 1,
            finish_pos_class: 1,
            laps: vec![lap(1, 1, 90.0), pit, lap(5, 2, 91.0)],
        };
        RaceData {
            max_lap: 5,
            total_cars: 1,
            green_pace_cutoff: 300.0,
            cars: [("7".to_string(), car)].into_iter().collect(),
            fcy: vec![(4, 4)],
            class_groups: BTreeMap::new(),
            class_car_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn lookups_by_car_and_lap() {
        let data = data();
        let index = RaceIndex::build(&data);
        assert_eq!(index.position("7", 3), Some(4));
        assert_eq!(index.position("7", 2), None);
        assert!(index.is_pit("7", 3));
        assert_eq!(index.pitting_on(3), &["7"]);
        assert!(index.pitting_on(4).is_empty());
        assert!(index.is_caution(4));
    }

    #[test]
    fn neighbours_skip_gaps() {
        let data = data();
        let index = RaceIndex::build(&data);
        assert_eq!(index.last_before("7", 3).map(|r| r.lap), Some(1));
        assert!(index.last_before("7", 1).is_none());
        let after: Vec<u32> = index.laps_after("7", 1).map(|r| r.lap).collect();
        assert_eq!(after, vec![3, 5]);
        assert_eq!(index.laps_after("99", 1).count(), 0);
    }
}
