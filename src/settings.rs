use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CategorizeError, Result};
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ClassifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: String,
    pub default_company: Option<String>,
    pub confidence_threshold: f64,
    pub cache_ttl_days: i64,
    pub history_limit: usize,
    pub history_min_similarity: f64,
    pub strong_cache: f64,
    pub strong_rules: f64,
    pub strong_history: f64,
    pub cache_min_confidence: f64,
    pub batch_concurrency: usize,
    pub classifier: Option<ClassifierSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            default_company: None,
            confidence_threshold: 70.0,
            cache_ttl_days: 30,
            history_limit: pipeline.history_limit,
            history_min_similarity: pipeline.history_min_similarity,
            strong_cache: pipeline.strong_cache,
            strong_rules: pipeline.strong_rules,
            strong_history: pipeline.strong_history,
            cache_min_confidence: pipeline.cache_min_confidence,
            batch_concurrency: pipeline.batch_concurrency,
            classifier: None,
        }
    }
}

impl Settings {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            strong_cache: self.strong_cache,
            strong_rules: self.strong_rules,
            strong_history: self.strong_history,
            cache_min_confidence: self.cache_min_confidence,
            history_limit: self.history_limit,
            history_min_similarity: self.history_min_similarity,
            batch_concurrency: self.batch_concurrency,
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.cache_ttl_days.max(0)).unwrap_or(chrono::Duration::MAX)
    }

    /// Company from the command line, else the configured default.
    pub fn resolve_company(&self, explicit: Option<String>) -> Result<String> {
        explicit
            .or_else(|| self.default_company.clone())
            .ok_or_else(|| {
                CategorizeError::Settings(
                    "no company given; pass --company or set default_company".to_string(),
                )
            })
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("ledger-triage")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("ledger-triage")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("ignoring unreadable {}: {e}", path.display());
                Settings::default()
            }
        }
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir())?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| CategorizeError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn db_path(settings: &Settings) -> PathBuf {
    PathBuf::from(&settings.data_dir).join("ledger-triage.db")
}

/// Leading `~` replaced with the home directory.
pub fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        return expand_home(path);
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
