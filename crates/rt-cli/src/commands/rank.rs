//! Per-lap lap-time rankings.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use rt_core::{RaceData, rank_lap_times};

use super::util::{format_optional_time, load_dataset};

type LapRanks = BTreeMap<u32, BTreeMap<String, u32>>;

/// Rank green laps in a dataset and print them.
pub fn run<W: Write>(
    writer: &mut W,
    dataset_path: &Path,
    class: Option<&str>,
    lap: Option<u32>,
    json: bool,
) -> Result<()> {
    let dataset = load_dataset(dataset_path)?;
    let mut ranks = rank_lap_times(&dataset.data, class);
    if let Some(lap) = lap {
        ranks.retain(|l, _| *l == lap);
    }

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&ranks)?)?;
    } else if ranks.is_empty() {
        match lap {
            Some(lap) => writeln!(writer, "Lap {lap} has no ranked times (caution or no green laps).")?,
            None => writeln!(writer, "No green laps to rank.")?,
        }
    } else {
        write!(writer, "{}", format_ranks(&dataset.data, &ranks))?;
    }
    Ok(())
}

/// Render each lap's ranking with the lap time that earned it.
pub fn format_ranks(data: &RaceData, ranks: &LapRanks) -> String {
    let mut out = String::new();
    for (lap, cars) in ranks {
        writeln!(out, "Lap {lap}").unwrap();

        let mut ordered: Vec<(&String, &u32)> = cars.iter().collect();
        ordered.sort_by_key(|(_, rank)| **rank);
        for (num, rank) in ordered {
            let time = data
                .cars
                .get(num)
                .and_then(|c| c.lap(*lap))
                .map(|r| r.lap_time_seconds);
            writeln!(
                out,
                "  {rank:>2}  {:<6}{}",
                format!("#{num}"),
                format_optional_time(time)
            )
            .unwrap();
        }
    }
    out
}
