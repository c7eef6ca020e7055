//! End-to-end tests driving the `rt` binary.
//!
//! Tests the full pipeline: ingest → dataset on disk → rank/strategy/annotations

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const SUMMARY_CSV: &str = "Pos,No.,Name,Class\n1,1,Alpha,GT3\n2,2,Bravo,GT3\n";
const LAPS_CSV: &str = "\
No.,Lap,Lap Time,Position,Status
1,1,1:30.100,1,
1,2,2:10.000,2,FCY
1,3,1:31.000,2,
2,1,1:30.500,2,
2,2,2:09.000,1,FCY
2,3,1:29.900,1,
";

fn rt_binary() -> String {
    env!("CARGO_BIN_EXE_rt").to_string()
}

/// Run `rt` with an isolated home so no user config leaks in.
fn rt(home: &Path, args: &[&str]) -> Output {
    Command::new(rt_binary())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run rt")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "rt should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

/// Write the two-car SpeedHive export and ingest it to `race.json`.
fn ingest_sample(temp: &TempDir) -> String {
    let summary = temp.path().join("results.csv");
    let laps = temp.path().join("laps.csv");
    std::fs::write(&summary, SUMMARY_CSV).unwrap();
    std::fs::write(&laps, LAPS_CSV).unwrap();
    let dataset = temp.path().join("race.json");

    let output = rt(
        temp.path(),
        &[
            "ingest",
            "speedhive",
            "--file",
            &format!("summaryCsv={}", summary.display()),
            "--file",
            &format!("lapsCsv={}", laps.display()),
            "--out",
            &dataset.display().to_string(),
        ],
    );
    let summary = stdout(&output);
    assert!(summary.contains("Cars:       2 (GT3: 2)"), "{summary}");
    assert!(summary.contains("Cautions:   1 (laps 2)"), "{summary}");
    dataset.display().to_string()
}

#[test]
fn test_ingest_writes_dataset() {
    let temp = TempDir::new().unwrap();
    let dataset = ingest_sample(&temp);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dataset).unwrap()).unwrap();
    assert_eq!(json["format"], "speedhive");
    assert_eq!(json["data"]["fcy"], serde_json::json!([[2, 2]]));
    assert_eq!(json["data"]["maxLap"], 3);
}

#[test]
fn test_rank_omits_caution_lap() {
    let temp = TempDir::new().unwrap();
    let dataset = ingest_sample(&temp);

    let output = rt(temp.path(), &["rank", &dataset, "--json"]);
    let ranks: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        ranks,
        serde_json::json!({
            "1": {"1": 1, "2": 2},
            "3": {"1": 2, "2": 1}
        })
    );
}

#[test]
fn test_strategy_json_scores() {
    let temp = TempDir::new().unwrap();
    let dataset = ingest_sample(&temp);

    let output = rt(temp.path(), &["strategy", &dataset, "--json"]);
    let strategies: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let rows = strategies.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        let score = row["score"].as_u64().unwrap();
        assert!(score <= 100);
        assert_eq!(row["pitCount"], 0);
    }
    assert_eq!(rows[0]["num"], "1");
    assert_eq!(rows[1]["score"], 75);
}

#[test]
fn test_annotations_for_car() {
    let temp = TempDir::new().unwrap();
    let dataset = ingest_sample(&temp);

    let output = rt(temp.path(), &["annotations", &dataset, "--car", "2"]);
    let text = stdout(&output);
    assert!(text.contains("Lap 2: Gained — passed #1 Alpha yellow"), "{text}");
    assert!(text.contains("Lap 3: P1 after FCY (Was P2 · Gained 1)"), "{text}");
}

#[test]
fn test_scoring_weights_from_config_file() {
    let temp = TempDir::new().unwrap();
    let dataset = ingest_sample(&temp);
    let config = temp.path().join("rt.toml");
    // consistency only: the steadier car takes everything
    std::fs::write(
        &config,
        "[scoring]\npace = 0.0\ncaution_pits = 0.0\npit_efficiency = 0.0\nconsistency = 1.0\n",
    )
    .unwrap();

    let output = rt(
        temp.path(),
        &["--config", &config.display().to_string(), "strategy", &dataset, "--json"],
    );
    let strategies: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(strategies[0]["score"], 0);
    assert_eq!(strategies[1]["score"], 100);
}

#[test]
fn test_ingest_missing_slot_fails() {
    let temp = TempDir::new().unwrap();
    let laps = temp.path().join("laps.csv");
    std::fs::write(&laps, LAPS_CSV).unwrap();

    let output = rt(
        temp.path(),
        &["ingest", "speedhive", "--file", &format!("lapsCsv={}", laps.display())],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing required file `summaryCsv`"), "{stderr}");
}

#[test]
fn test_formats_lists_slots() {
    let temp = TempDir::new().unwrap();
    let text = stdout(&rt(temp.path(), &["formats"]));
    assert!(text.contains("speedhive:"));
    assert!(text.contains("lapChartJson"));
}
