//! Show one car's annotations.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use rt_core::{CarAnnotations, CarData};

use super::util::load_dataset;

pub fn run<W: Write>(writer: &mut W, dataset_path: &Path, car: &str, json: bool) -> Result<()> {
    let dataset = load_dataset(dataset_path)?;
    let car = car.trim_start_matches('#');
    let Some(data) = dataset.data.cars.get(car) else {
        bail!("car #{car} is not in {}", dataset_path.display());
    };
    let annotations = dataset.annotations.car(car).cloned().unwrap_or_default();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&annotations)?)?;
    } else {
        write!(writer, "{}", format_car_annotations(data, &annotations))?;
    }
    Ok(())
}

pub fn format_car_annotations(car: &CarData, annotations: &CarAnnotations) -> String {
    let mut out = String::new();
    if car.team.is_empty() {
        writeln!(out, "#{} ({})", car.num, car.class).unwrap();
    } else {
        writeln!(out, "#{} {} ({})", car.num, car.team, car.class).unwrap();
    }

    writeln!(out, "Reasons:").unwrap();
    if annotations.reasons.is_empty() {
        writeln!(out, "  none").unwrap();
    }
    for (lap, reason) in &annotations.reasons {
        writeln!(out, "  Lap {lap}: {reason}").unwrap();
    }

    writeln!(out, "Pits:").unwrap();
    if annotations.pits.is_empty() {
        writeln!(out, "  none").unwrap();
    }
    for pit in &annotations.pits {
        let delta = pit
            .position_delta
            .map_or_else(|| "exit unknown".to_string(), |d| format!("{d:+}"));
        writeln!(out, "  Lap {}: {} ({delta})", pit.lap, pit.label).unwrap();
    }

    writeln!(out, "Settles:").unwrap();
    if annotations.settles.is_empty() {
        writeln!(out, "  none").unwrap();
    }
    for settle in &annotations.settles {
        writeln!(out, "  Lap {}: {} ({})", settle.lap, settle.label, settle.subtitle).unwrap();
    }
    out
}
