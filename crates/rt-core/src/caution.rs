//! Caution (full-course yellow) intervals and lap membership.
//!
//! Every parser reports cautions as inclusive `[start, end]` lap intervals.
//! Consumers never walk the intervals directly; they build a [`CautionSet`]
//! and ask whether a lap is under caution.

use std::collections::HashSet;

/// Inclusive `(start_lap, end_lap)` caution interval.
pub type CautionInterval = (u32, u32);

/// Membership set of laps run under caution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CautionSet {
    laps: HashSet<u32>,
}

impl CautionSet {
    pub fn from_intervals(intervals: &[CautionInterval]) -> Self {
        let laps = intervals
            .iter()
            .filter(|(start, end)| start <= end)
            .flat_map(|&(start, end)| start..=end)
            .collect();
        Self { laps }
    }

    pub fn contains(&self, lap: u32) -> bool {
        self.laps.contains(&lap)
    }

    pub fn len(&self) -> usize {
        self.laps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }
}

/// Collapse a set of caution laps into contiguous intervals.
pub fn intervals_from_laps(laps: impl IntoIterator<Item = u32>) -> Vec<CautionInterval> {
    let mut sorted: Vec<u32> = laps.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut intervals: Vec<CautionInterval> = Vec::new();
    for lap in sorted {
        match intervals.last_mut() {
            Some((_, end)) if *end + 1 == lap => *end = lap,
            _ => intervals.push((lap, lap)),
        }
    }
    intervals
}

/// Sort intervals, drop inverted ones and merge overlapping or adjacent ones.
pub fn normalize_intervals(mut intervals: Vec<CautionInterval>) -> Vec<CautionInterval> {
    intervals.retain(|(start, end)| start <= end);
    intervals.sort_unstable();

    let mut merged: Vec<CautionInterval> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some((_, prev_end)) if start <= prev_end.saturating_add(1) => {
                *prev_end = (*prev_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_laps_merge() {
        assert_eq!(
            intervals_from_laps([5, 3, 4, 9, 10, 12]),
            vec![(3, 5), (9, 10), (12, 12)]
        );
        assert!(intervals_from_laps([]).is_empty());
    }

    #[test]
    fn normalize_merges_overlaps_and_adjacency() {
        assert_eq!(
            normalize_intervals(vec![(10, 12), (2, 4), (4, 6), (13, 14), (20, 18)]),
            vec![(2, 6), (10, 14)]
        );
    }

    #[test]
    fn normalized_intervals_are_sorted_and_disjoint() {
        let merged = normalize_intervals(vec![(30, 31), (1, 1), (5, 9), (7, 8), (3, 3)]);
        for pair in merged.windows(2) {
            assert!(pair[0].1 < pair[1].0);
        }
    }

    #[test]
    fn membership_covers_inclusive_bounds() {
        let set = CautionSet::from_intervals(&[(2, 4), (8, 8)]);
        assert!(set.contains(2));
        assert!(set.contains(4));
        assert!(set.contains(8));
        assert!(!set.contains(5));
        assert_eq!(set.len(), 4);
    }
}
