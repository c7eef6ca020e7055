//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rt_core::{AnnotationConfig, ParserConfig, PipelineConfig, ScoringWeights};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory datasets are written to when no `--out` is given.
    pub output_dir: PathBuf,
    pub parser: ParserConfig,
    pub annotation: AnnotationConfig,
    pub scoring: ScoringWeights,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            output_dir: data_dir.join("datasets"),
            parser: ParserConfig::default(),
            annotation: AnnotationConfig::default(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // RT_PARSER__PIT_DROP_THRESHOLD=6 sets parser.pit_drop_threshold
        figment = figment.merge(Env::prefixed("RT_").split("__"));

        figment.extract()
    }

    /// Settings for the ingestion pipeline.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            parser: self.parser.clone(),
            annotation: self.annotation.clone(),
        }
    }
}

/// Returns the platform-specific config directory for rt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rt"))
}

/// Returns the platform-specific data directory for rt.
///
/// On Linux: `~/.local/share/rt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("rt"))
}
