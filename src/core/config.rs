//! Pipeline configuration, read from `<root>/pipeline.toml`.
//!
//! A missing file means defaults. A malformed file is a validation error.

use crate::core::error::PipelineError;
use crate::core::scoring::{HumanAggregation, Thresholds};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "pipeline.toml";
pub const STARTER_TASK_COUNT: usize = 3;
/// Upper bound on `provisioning.window_days`, ten years.
pub const MAX_WINDOW_DAYS: i64 = 3_650;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub provisioning: ProvisioningConfig,
    pub judging: JudgingConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub window_days: i64,
    pub default_pm_name: String,
    /// Due-date offsets of the starter tasks, in days from project start.
    pub task_offsets_days: Vec<i64>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            default_pm_name: "Unassigned PM".to_string(),
            task_offsets_days: vec![0, 30, 60],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JudgingConfig {
    pub strength_threshold: f64,
    pub weakness_threshold: f64,
    pub summary_cap: usize,
    pub human_aggregation: HumanAggregation,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        Self {
            strength_threshold: 75.0,
            weakness_threshold: 60.0,
            summary_cap: 3,
            human_aggregation: HumanAggregation::AllRows,
        }
    }
}

impl JudgingConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            strength: self.strength_threshold,
            weakness: self.weakness_threshold,
            cap: self.summary_cap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub log_file: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file: "audit.events.jsonl".to_string(),
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

pub fn load_config(root: &Path) -> Result<PipelineConfig, PipelineError> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: PipelineConfig = toml::from_str(&content).map_err(|e| {
        PipelineError::ValidationError(format!("invalid config {}: {}", path.display(), e))
    })?;
    config.validate()?;
    Ok(config)
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let p = &self.provisioning;
        if p.window_days <= 0 || p.window_days > MAX_WINDOW_DAYS {
            return Err(PipelineError::ValidationError(format!(
                "provisioning.window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }
        if p.task_offsets_days.len() != STARTER_TASK_COUNT
            || p.task_offsets_days
                .iter()
                .any(|d| *d < 0 || *d > p.window_days)
        {
            return Err(PipelineError::ValidationError(
                "provisioning.task_offsets_days must hold three offsets inside the window"
                    .to_string(),
            ));
        }
        if self.judging.weakness_threshold > self.judging.strength_threshold {
            return Err(PipelineError::ValidationError(
                "judging.weakness_threshold cannot exceed judging.strength_threshold".to_string(),
            ));
        }
        Ok(())
    }
}
