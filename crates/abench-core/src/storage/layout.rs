//! File-backed experiment artifacts.
//!
//! Each experiment owns one directory under the experiments root:
//!
//! ```text
//! experiments/experiment_<ts>/
//!   experiment_config.json
//!   success/<chat_id>.json
//!   error/failed_test_<test_id>.json
//!   golden_answers/question_<n>.json
//!   question_rounds/question_<n>.json
//!   experiment_summary.json
//! ```
//!
//! Per-item writes are lenient: a failed write is logged and the run
//! continues. The final summary write is the one fatal exception.

use crate::model::{ExperimentResult, ExperimentSummary, GoldenAnswer, QuestionResult};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_FILE: &str = "experiment_config.json";
const SUMMARY_FILE: &str = "experiment_summary.json";
const DIR_PREFIX: &str = "experiment_";

#[derive(Debug, Clone)]
pub struct ExperimentDir {
    experiment_id: String,
    path: PathBuf,
}

/// Everything the config snapshot records about how the experiment was
/// set up.
#[derive(Debug, Clone)]
pub struct ExperimentSetup {
    pub user_id: String,
    pub company_id: String,
    pub app_id: String,
    pub assistant_ids: Vec<String>,
    pub questions: Vec<String>,
}

impl ExperimentDir {
    /// Picks a timestamp-derived directory name that does not yet exist
    /// under `root`, suffixing `_2`, `_3`, ... on collision.
    pub fn allocate_id(root: &Path, now: DateTime<Utc>) -> String {
        let base = format!("{DIR_PREFIX}{}", now.format("%Y%m%d_%H%M%S"));
        if !root.join(&base).exists() {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if !root.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Creates the directory tree and writes the config snapshot.
    pub fn create(root: &Path, experiment_id: &str, setup: &ExperimentSetup) -> anyhow::Result<Self> {
        let path = root.join(experiment_id);
        for sub in ["success", "error", "golden_answers", "question_rounds"] {
            fs::create_dir_all(path.join(sub))
                .with_context(|| format!("creating {}", path.join(sub).display()))?;
        }

        let timestamp = experiment_id.strip_prefix(DIR_PREFIX).unwrap_or(experiment_id);
        let config = json!({
            "experiment_id": experiment_id,
            "timestamp": timestamp,
            "created_at": Utc::now().to_rfc3339(),
            "configuration": {
                "user_id": setup.user_id,
                "company_id": setup.company_id,
                "app_id": setup.app_id,
            },
            "experiment_setup": {
                "assistant_ids": setup.assistant_ids,
                "questions": setup.questions,
                "total_combinations": setup.assistant_ids.len() * setup.questions.len(),
            },
            "directory_structure": {
                "base": path.display().to_string(),
                "success": path.join("success").display().to_string(),
                "error": path.join("error").display().to_string(),
                "golden_answers": path.join("golden_answers").display().to_string(),
                "question_rounds": path.join("question_rounds").display().to_string(),
            },
        });
        write_json(&path.join(CONFIG_FILE), &config)?;

        info!(experiment_id, path = %path.display(), "created experiment directory");
        Ok(Self {
            experiment_id: experiment_id.to_string(),
            path,
        })
    }

    pub fn open(root: &Path, experiment_id: &str) -> Option<Self> {
        let path = root.join(experiment_id);
        if path.join(CONFIG_FILE).is_file() {
            Some(Self {
                experiment_id: experiment_id.to_string(),
                path,
            })
        } else {
            None
        }
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves one (assistant, question) outcome, partitioned on success.
    /// Successful results key on the chat id, failures on the test id.
    pub fn save_result(&self, result: &ExperimentResult) -> Option<PathBuf> {
        let (folder, key) = match result.transcript.as_ref().filter(|_| result.success) {
            Some(t) => ("success", t.chat_id.clone()),
            None => ("error", format!("failed_test_{}", result.test_id)),
        };
        let filepath = self.path.join(folder).join(format!("{key}.json"));
        self.write_lenient(&filepath, result)
    }

    pub fn save_golden(&self, question_id: u32, answer: &GoldenAnswer) -> Option<PathBuf> {
        let filepath = self
            .path
            .join("golden_answers")
            .join(format!("question_{question_id}.json"));
        self.write_lenient(&filepath, answer)
    }

    pub fn save_round(&self, round: &QuestionResult) -> Option<PathBuf> {
        let filepath = self
            .path
            .join("question_rounds")
            .join(format!("question_{}.json", round.question_id));
        self.write_lenient(&filepath, round)
    }

    /// The summary is the artifact the whole run exists to produce, so
    /// a failed write here is fatal.
    pub fn save_summary(&self, summary: &ExperimentSummary) -> anyhow::Result<PathBuf> {
        let filepath = self.path.join(SUMMARY_FILE);
        write_json(&filepath, summary)?;
        info!(experiment_id = %self.experiment_id, "experiment summary saved");
        Ok(filepath)
    }

    pub fn load_summary(&self) -> anyhow::Result<ExperimentSummary> {
        let filepath = self.path.join(SUMMARY_FILE);
        let raw = fs::read_to_string(&filepath)
            .with_context(|| format!("reading {}", filepath.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", filepath.display()))
    }

    pub fn has_summary(&self) -> bool {
        self.path.join(SUMMARY_FILE).is_file()
    }

    fn write_lenient<T: serde::Serialize>(&self, filepath: &Path, value: &T) -> Option<PathBuf> {
        match write_json(filepath, value) {
            Ok(()) => Some(filepath.to_path_buf()),
            Err(e) => {
                warn!(path = %filepath.display(), error = %e, "failed to save artifact");
                None
            }
        }
    }
}

/// Experiment directory names under `root`, newest first.
pub fn list_experiments(root: &Path) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    if !root.is_dir() {
        return Ok(out);
    }
    for entry in fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() && name.starts_with(DIR_PREFIX) {
            out.push(name);
        }
    }
    out.sort_by(|a, b| b.cmp(a));
    Ok(out)
}

fn write_json<T: serde::Serialize>(filepath: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    fs::write(filepath, data).with_context(|| format!("writing {}", filepath.display()))?;
    Ok(())
}
