use std::path::Path;

use anyhow::{Context, Result};
use config as cfg;
use serde::{Deserialize, Serialize};

/// How `files_changed` computes the set of documents depending on a
/// changed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependantStrategy {
    /// Transitive closure over the incrementally maintained dependency graph.
    #[default]
    Graph,
    /// Rebuild an inverted import index from the settled documents of the
    /// current generation on every change.
    InvertedIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub dependant_strategy: DependantStrategy,
    #[serde(default = "AnalysisConfig::default_max_concurrent_analyses")]
    pub max_concurrent_analyses: usize,
}

impl AnalysisConfig {
    fn default_max_concurrent_analyses() -> usize {
        16
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dependant_strategy: DependantStrategy::default(),
            max_concurrent_analyses: Self::default_max_concurrent_analyses(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.analysis.max_concurrent_analyses > 0,
            "analysis.max_concurrent_analyses must be > 0"
        );
        anyhow::ensure!(
            !self.logging.level.trim().is_empty(),
            "logging.level cannot be empty"
        );
        Ok(())
    }

    /// Layered load: `default.toml`, `{env}.toml`, `local.toml`, then
    /// `DOCGRAPH__*` environment variables. Missing files are skipped.
    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("DOCGRAPH").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Settings> {
        let settings: Settings = toml::from_str(raw).context("parsing settings")?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.analysis.dependant_strategy, DependantStrategy::Graph);
        assert_eq!(s.analysis.max_concurrent_analyses, 16);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let s = Settings::from_toml_str(
            r#"
            [analysis]
            dependant_strategy = "inverted_index"
            "#,
        )
        .unwrap();
        assert_eq!(s.analysis.dependant_strategy, DependantStrategy::InvertedIndex);
        assert_eq!(s.analysis.max_concurrent_analyses, 16);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = Settings::from_toml_str(
            r#"
            [analysis]
            max_concurrent_analyses = 0
            "#,
        );
        assert!(err.is_err());
    }
}
