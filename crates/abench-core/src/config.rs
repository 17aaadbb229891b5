use crate::errors::ConfigError;
use crate::model::ExperimentPlan;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://api.uat1.unique.app/public/chat";
pub const DEFAULT_GOLDEN_MODEL: &str = "gpt-4";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// Harness configuration: API identity plus golden-answer defaults.
/// Stored as a single well-known YAML record; loading a missing file
/// yields the defaults (blank identity, not configured).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub company_id: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_golden_model")]
    pub default_golden_model: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_golden_model() -> String {
    DEFAULT_GOLDEN_MODEL.to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            company_id: String::new(),
            app_id: String::new(),
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            default_golden_model: default_golden_model(),
        }
    }
}

impl BenchConfig {
    /// All identity fields present. Experiment creation is rejected
    /// until this holds.
    pub fn is_configured(&self) -> bool {
        !self.user_id.is_empty()
            && !self.company_id.is_empty()
            && !self.app_id.is_empty()
            && !self.api_key.is_empty()
            && !self.base_url.is_empty()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.user_id.is_empty() {
            missing.push("user_id");
        }
        if self.company_id.is_empty() {
            missing.push("company_id");
        }
        if self.app_id.is_empty() {
            missing.push("app_id");
        }
        if self.api_key.is_empty() {
            missing.push("api_key");
        }
        if self.base_url.is_empty() {
            missing.push("base_url");
        }
        missing
    }
}

pub fn load_config(path: &Path) -> Result<BenchConfig, ConfigError> {
    if !path.exists() {
        return Ok(BenchConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse config YAML: {}", e)))
}

pub fn save_config(path: &Path, cfg: &BenchConfig) -> Result<(), ConfigError> {
    let raw = serde_yaml::to_string(cfg)
        .map_err(|e| ConfigError(format!("failed to serialize config: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, raw)
        .map_err(|e| ConfigError(format!("failed to write config {}: {}", path.display(), e)))
}

/// Loads and validates an experiment plan. Empty assistant or question
/// lists are caller errors, rejected before any durable artifact.
pub fn load_plan(path: &Path) -> Result<ExperimentPlan, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read plan {}: {}", path.display(), e)))?;
    let plan: ExperimentPlan = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse plan YAML: {}", e)))?;
    validate_plan(&plan)?;
    Ok(plan)
}

pub fn validate_plan(plan: &ExperimentPlan) -> Result<(), ConfigError> {
    if plan.assistant_ids.is_empty() {
        return Err(ConfigError("plan has no assistant ids".into()));
    }
    if plan.questions.is_empty() {
        return Err(ConfigError("plan has no questions".into()));
    }
    for id in &plan.assistant_ids {
        if !id.starts_with("assistant_") {
            tracing::warn!(assistant_id = %id, "assistant id does not start with 'assistant_'");
        }
    }
    Ok(())
}

pub fn write_sample_plan(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"assistant_ids:
  - assistant_abc123def456
  - assistant_xyz789ghi012
questions:
  - "What is the capital of France?"
  - "How does photosynthesis work?"
# golden_model: gpt-4
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample plan: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_not_configured() {
        let cfg = BenchConfig::default();
        assert!(!cfg.is_configured());
        assert_eq!(
            cfg.missing_fields(),
            vec!["user_id", "company_id", "app_id", "api_key"]
        );
        assert_eq!(cfg.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let cfg = BenchConfig {
            user_id: "u1".into(),
            company_id: "c1".into(),
            app_id: "app1".into(),
            api_key: "key".into(),
            ..Default::default()
        };
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();
        assert!(loaded.is_configured());
        assert_eq!(loaded.user_id, "u1");
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let cfg = load_config(Path::new("/nonexistent/abench-config.yaml")).unwrap();
        assert!(!cfg.is_configured());
    }

    #[test]
    fn empty_plan_lists_are_rejected() {
        let plan = ExperimentPlan {
            assistant_ids: vec!["assistant_a".into()],
            questions: vec![],
            golden_model: None,
        };
        assert!(validate_plan(&plan).is_err());

        let plan = ExperimentPlan {
            assistant_ids: vec![],
            questions: vec!["q".into()],
            golden_model: None,
        };
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn sample_plan_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.yaml");
        write_sample_plan(&path).unwrap();
        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.assistant_ids.len(), 2);
        assert_eq!(plan.questions.len(), 2);
    }
}
