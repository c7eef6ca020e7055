//! Ingestion pipeline: parse an export, extend its annotations, and bundle
//! the result into a [`Dataset`].

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::annotate::{AnnotationConfig, generate_annotations_with};
use crate::annotations::Annotations;
use crate::parser::{ParseError, ParserConfig, SourceFormat, validate_files};
use crate::types::RaceData;

/// A fully processed race, the unit persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub format: SourceFormat,
    pub data: RaceData,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Configuration for every pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub parser: ParserConfig,
    pub annotation: AnnotationConfig,
}

/// Parse and annotate one race.
pub fn ingest(
    format: SourceFormat,
    files: &HashMap<String, String>,
    config: &PipelineConfig,
) -> Result<Dataset, ParseError> {
    validate_files(format.file_slots(), files)?;
    let output = format.parser(&config.parser).parse(files)?;

    for warning in &output.warnings {
        tracing::warn!(format = %format, "{warning}");
    }

    let annotations =
        generate_annotations_with(&output.data, Some(&output.annotations), &config.annotation);
    tracing::debug!(
        format = %format,
        cars = output.data.total_cars,
        max_lap = output.data.max_lap,
        cautions = output.data.fcy.len(),
        annotated_cars = annotations.len(),
        "ingested race"
    );

    Ok(Dataset {
        format,
        data: output.data,
        annotations,
        warnings: output.warnings,
    })
}

/// One race to ingest as part of a batch.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub label: String,
    pub format: SourceFormat,
    pub files: HashMap<String, String>,
}

/// Ingest independent races in parallel. Results keep the job order.
pub fn ingest_batch(
    jobs: &[IngestJob],
    config: &PipelineConfig,
) -> Vec<(String, Result<Dataset, ParseError>)> {
    jobs.par_iter()
        .map(|job| (job.label.clone(), ingest(job.format, &job.files, config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "Pos,No.,Name,Class\n1,1,Alpha,GT3\n2,2,Bravo,GT3\n";
    const LAPS: &str = "\
No.,Lap,Lap Time,Position,Status
1,1,1:30.100,1,
1,2,2:10.000,2,FCY
1,3,1:31.000,2,
2,1,1:30.500,2,
2,2,2:09.000,1,FCY
2,3,1:29.900,1,
";

    fn speedhive_files(laps: &str) -> HashMap<String, String> {
        HashMap::from([
            ("summaryCsv".to_string(), SUMMARY.to_string()),
            ("lapsCsv".to_string(), laps.to_string()),
        ])
    }

    #[test]
    fn ingest_parses_and_annotates() {
        let dataset = ingest(
            SourceFormat::SpeedHive,
            &speedhive_files(LAPS),
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(dataset.format, SourceFormat::SpeedHive);
        assert_eq!(dataset.data.fcy, vec![(2, 2)]);
        let two = dataset.annotations.car("2").unwrap();
        assert_eq!(two.reasons[&2], "Gained — passed #1 Alpha yellow");
    }

    #[test]
    fn dataset_json_shape() {
        let dataset = ingest(
            SourceFormat::SpeedHive,
            &speedhive_files(LAPS),
            &PipelineConfig::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&dataset).unwrap();
        assert_eq!(json["format"], "speedhive");
        assert_eq!(json["data"]["maxLap"], 3);
        assert!(json["annotations"]["2"]["reasons"]["2"].is_string());

        let back: Dataset = serde_json::from_value(json).unwrap();
        assert_eq!(back.data.cars.len(), 2);
        assert_eq!(back.annotations, dataset.annotations);
    }

    #[test]
    fn batch_keeps_job_order_and_isolates_failures() {
        let jobs = vec![
            IngestJob {
                label: "good".to_string(),
                format: SourceFormat::SpeedHive,
                files: speedhive_files(LAPS),
            },
            IngestJob {
                label: "missing".to_string(),
                format: SourceFormat::Imsa,
                files: HashMap::new(),
            },
        ];
        let results = ingest_batch(&jobs, &PipelineConfig::default());
        assert_eq!(results[0].0, "good");
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, "missing");
        assert!(matches!(results[1].1, Err(ParseError::MissingFile { .. })));
    }
}
