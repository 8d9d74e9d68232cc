//! Runtime configuration.
//!
//! Values come from, in increasing priority:
//! - built-in defaults
//! - a TOML file (`--config <path>`, else `odds.toml` in the working directory)
//! - `ODDS_*` environment variables

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "odds.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub data: DataConfig,
}

/// Tunables for the range and cascade pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Total-level count below which a low sample warning is attached.
    pub min_sample: usize,
    /// Minimum count a cascade level needs to be picked as best estimate.
    pub scenario_min_n: usize,
    /// Applications whose earliest activity falls after this date are late.
    pub on_time_cutoff: NaiveDate,
    /// Gap kept below the GPA median for the 25th-to-median band.
    pub gpa_median_epsilon: f64,
    /// One LSAT score point.
    pub lsat_step: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            min_sample: 10,
            scenario_min_n: 10,
            on_time_cutoff: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            gpa_median_epsilon: 0.01,
            lsat_step: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV export of the official first-year class percentiles.
    pub percentiles_path: PathBuf,
    /// Directory holding one `<slug>.csv` outcome file per school.
    pub outcomes_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            percentiles_path: PathBuf::from("data/percentiles.csv"),
            outcomes_dir: PathBuf::from("data/outcomes"),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Settings::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables override everything else.
    fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ODDS_MIN_SAMPLE") {
            self.analysis.min_sample = value
                .trim()
                .parse()
                .context("ODDS_MIN_SAMPLE must be a non-negative integer")?;
        }
        if let Some(value) = lookup("ODDS_SCENARIO_MIN_N") {
            self.analysis.scenario_min_n = value
                .trim()
                .parse()
                .context("ODDS_SCENARIO_MIN_N must be a non-negative integer")?;
        }
        if let Some(value) = lookup("ODDS_ONTIME_CUTOFF") {
            self.analysis.on_time_cutoff = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .context("ODDS_ONTIME_CUTOFF must be a YYYY-MM-DD date")?;
        }
        if let Some(value) = lookup("ODDS_PERCENTILES") {
            self.data.percentiles_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ODDS_OUTCOMES_DIR") {
            self.data.outcomes_dir = PathBuf::from(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.min_sample, 10);
        assert_eq!(config.scenario_min_n, 10);
        assert_eq!(
            config.on_time_cutoff,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(config.gpa_median_epsilon, 0.01);
        assert_eq!(config.lsat_step, 1.0);
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let settings = Settings::from_toml(
            r#"
            [analysis]
            min_sample = 5
            on_time_cutoff = "2024-12-15"

            [data]
            outcomes_dir = "/srv/outcomes"
            "#,
        )
        .unwrap();

        assert_eq!(settings.analysis.min_sample, 5);
        assert_eq!(settings.analysis.scenario_min_n, 10);
        assert_eq!(
            settings.analysis.on_time_cutoff,
            NaiveDate::from_ymd_opt(2024, 12, 15).unwrap()
        );
        assert_eq!(settings.data.outcomes_dir, PathBuf::from("/srv/outcomes"));
        assert_eq!(
            settings.data.percentiles_path,
            PathBuf::from("data/percentiles.csv")
        );
    }

    #[test]
    fn environment_wins_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ODDS_SCENARIO_MIN_N", "20"),
            ("ODDS_ONTIME_CUTOFF", "2025-02-01"),
        ]);
        let mut settings = Settings::from_toml("[analysis]\nscenario_min_n = 3\n").unwrap();
        settings
            .apply_env(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(settings.analysis.scenario_min_n, 20);
        assert_eq!(
            settings.analysis.on_time_cutoff,
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
        );
    }

    #[test]
    fn malformed_environment_value_is_an_error() {
        let mut settings = Settings::default();
        let result = settings.apply_env(|key| {
            (key == "ODDS_MIN_SAMPLE").then(|| "ten".to_string())
        });
        assert!(result.is_err());
    }
}
