//! Strategy score table.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use rt_core::{CarStrategy, ScoringWeights, score_strategies};

use super::util::{format_optional_time, load_dataset};

/// Score every car in a dataset and print the table or JSON.
pub fn run<W: Write>(
    writer: &mut W,
    weights: &ScoringWeights,
    dataset_path: &Path,
    class: Option<&str>,
    json: bool,
) -> Result<()> {
    let dataset = load_dataset(dataset_path)?;
    let mut strategies = score_strategies(&dataset.data, weights);
    if let Some(class) = class {
        strategies.retain(|s| s.class == class);
        if strategies.is_empty() {
            bail!("no cars in class `{class}`");
        }
    }

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&strategies)?)?;
    } else {
        write!(writer, "{}", format_strategy_table(&strategies))?;
    }
    Ok(())
}

/// Render strategies as a fixed-width table, one row per car.
pub fn format_strategy_table(strategies: &[CarStrategy]) -> String {
    let mut out = String::new();
    writeln!(
        out,
        "{:<8}{:>4}  {:<6}{:<14}{:>5}  {:>9}  {:>9}  {:>4}  {:>8}  {:>8}  {:>7}",
        "Class", "Pos", "Car", "Team", "Score", "Avg pace", "Best", "Pits", "Pit loss", "Caution%", "Std dev"
    )
    .unwrap();
    for s in strategies {
        let caution = s
            .caution_pit_pct
            .map_or_else(|| "-".to_string(), |pct| format!("{pct:.0}%"));
        let spread = s
            .lap_time_std_dev
            .map_or_else(|| "-".to_string(), |sd| format!("{sd:.3}"));
        writeln!(
            out,
            "{:<8}{:>4}  {:<6}{:<14}{:>5}  {:>9}  {:>9}  {:>4}  {:>8}  {:>8}  {:>7}",
            s.class,
            s.finish_pos_class,
            format!("#{}", s.num),
            s.team,
            s.score,
            format_optional_time(s.avg_green_pace),
            format_optional_time(s.best_lap),
            s.pit_count,
            format!("{:.1}s", s.total_pit_time),
            caution,
            spread,
        )
        .unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tempfile::TempDir;

    use super::*;
    use crate::commands::util::tests::sample_dataset;
    use crate::commands::util::write_dataset;

    #[test]
    fn test_strategy_table() {
        let dataset = sample_dataset();
        let strategies = score_strategies(&dataset.data, &ScoringWeights::default());
        assert_snapshot!(format_strategy_table(&strategies), @r"
        Class    Pos  Car   Team          Score   Avg pace       Best  Pits  Pit loss  Caution%  Std dev
        GT3        1  #1    Alpha            25   1:30.550   1:30.100     0      0.0s         -    0.450
        GT3        2  #2    Bravo            75   1:30.200   1:29.900     0      0.0s         -    0.300
        ");
    }

    #[test]
    fn test_run_json_and_class_filter() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("race.json");
        write_dataset(&path, &sample_dataset()).unwrap();

        let mut output = Vec::new();
        run(&mut output, &ScoringWeights::default(), &path, Some("GT3"), true).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[1]["num"], "2");
        assert_eq!(json[1]["score"], 75);

        let err = run(&mut Vec::new(), &ScoringWeights::default(), &path, Some("LMP2"), false)
            .unwrap_err();
        assert_eq!(err.to_string(), "no cars in class `LMP2`");
    }
}
