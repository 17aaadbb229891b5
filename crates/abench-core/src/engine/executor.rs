//! Experiment lifecycle: creation, the full run loop, progress and
//! stats lookups.

use crate::cache::GoldenAnswerCache;
use crate::config::BenchConfig;
use crate::engine::{CancelFlag, RoundProcessor};
use crate::errors::ConfigError;
use crate::model::{
    ExperimentPlan, ExperimentRecord, ExperimentStats, ExperimentStatus, ExperimentSummary,
};
use crate::progress::ProgressTracker;
use crate::providers::chat::ChatClient;
use crate::providers::golden::GoldenClient;
use crate::storage::{ExperimentDir, ExperimentSetup, Store};
use anyhow::bail;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct Executor {
    store: Store,
    chat: Arc<dyn ChatClient>,
    golden: Arc<dyn GoldenClient>,
    config: BenchConfig,
    experiments_root: PathBuf,
    cancel: CancelFlag,
}

impl Executor {
    pub fn new(
        store: Store,
        chat: Arc<dyn ChatClient>,
        golden: Arc<dyn GoldenClient>,
        config: BenchConfig,
        experiments_root: PathBuf,
    ) -> Self {
        Self {
            store,
            chat,
            golden,
            config,
            experiments_root,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for cancelling a run in flight, e.g. from a signal
    /// handler.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Allocates an experiment id, creates the artifact directory and
    /// the durable record. The experiment starts in `created` and runs
    /// nothing yet.
    pub fn create_experiment(&self, plan: &ExperimentPlan) -> anyhow::Result<String> {
        if !self.config.is_configured() {
            return Err(ConfigError(format!(
                "missing configuration: {}",
                self.config.missing_fields().join(", ")
            ))
            .into());
        }
        crate::config::validate_plan(plan)?;

        let experiment_id = ExperimentDir::allocate_id(&self.experiments_root, Utc::now());
        ExperimentDir::create(
            &self.experiments_root,
            &experiment_id,
            &ExperimentSetup {
                user_id: self.config.user_id.clone(),
                company_id: self.config.company_id.clone(),
                app_id: self.config.app_id.clone(),
                assistant_ids: plan.assistant_ids.clone(),
                questions: plan.questions.clone(),
            },
        )?;

        let total_tasks = (plan.assistant_ids.len() * plan.questions.len()) as u32;
        self.store.create_experiment(&ExperimentRecord {
            experiment_id: experiment_id.clone(),
            user_id: self.config.user_id.clone(),
            company_id: self.config.company_id.clone(),
            assistant_ids: plan.assistant_ids.clone(),
            questions: plan.questions.clone(),
            start_time: Utc::now(),
            end_time: None,
            status: ExperimentStatus::Created,
            progress_percentage: 0.0,
            current_step: None,
            total_tasks,
            completed_tasks: 0,
            estimated_completion: None,
        })?;

        info!(experiment_id, total_tasks, "created experiment");
        Ok(experiment_id)
    }

    /// Runs every question round of an existing experiment.
    ///
    /// A second runner is rejected while the experiment is `running`.
    /// Rerunning a finished experiment first clears its prior
    /// responses. Returns `None` when the run was cancelled; no summary
    /// is written in that case.
    pub async fn run_experiment(
        &self,
        experiment_id: &str,
        golden_model: Option<&str>,
    ) -> anyhow::Result<Option<ExperimentSummary>> {
        let Some(record) = self.store.get_experiment(experiment_id)? else {
            bail!("unknown experiment: {experiment_id}");
        };
        if record.status == ExperimentStatus::Running {
            bail!("experiment {experiment_id} is already running");
        }
        if record.status.is_terminal() {
            let removed = self.store.delete_responses(experiment_id)?;
            if removed > 0 {
                info!(experiment_id, removed, "cleared responses from previous run");
            }
        }

        let total_tasks = (record.assistant_ids.len() * record.questions.len()) as u32;
        let tracker = ProgressTracker::new(self.store.clone(), experiment_id, total_tasks);
        tracker.begin("Starting experiment");

        // Storage initialization happens under the tracker so a failure
        // here still lands on the durable row as status=failed.
        let dir = match self.open_or_create_dir(experiment_id, &record) {
            Ok(dir) => dir,
            Err(e) => {
                tracker.fail(&format!("Experiment failed: {e}"));
                return Err(e);
            }
        };
        info!(
            experiment_id,
            assistants = record.assistant_ids.len(),
            questions = record.questions.len(),
            total_tasks,
            "starting experiment run"
        );

        let processor = RoundProcessor::new(
            self.chat.clone(),
            GoldenAnswerCache::new(self.store.clone(), self.golden.clone()),
            self.store.clone(),
            Duration::from_secs(self.config.timeout_seconds),
        );
        let golden_model = golden_model.unwrap_or(&self.config.default_golden_model);

        let start_time = Utc::now();
        let mut question_results = Vec::with_capacity(record.questions.len());
        for (i, question) in record.questions.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracker.cancel();
                return Ok(None);
            }
            let round = processor
                .run_round(
                    experiment_id,
                    &dir,
                    &tracker,
                    &self.cancel,
                    i as u32 + 1,
                    question,
                    &record.assistant_ids,
                    golden_model,
                )
                .await;
            match round {
                Ok(Some(result)) => question_results.push(result),
                Ok(None) => {
                    tracker.cancel();
                    return Ok(None);
                }
                Err(e) => {
                    tracker.fail(&format!("Experiment failed: {e}"));
                    return Err(e);
                }
            }
        }

        let summary = ExperimentSummary::assemble(
            total_tasks as usize,
            start_time,
            question_results,
            Some(dir.path().display().to_string()),
        );
        if let Err(e) = dir.save_summary(&summary) {
            tracker.fail(&format!("Failed to save summary: {e}"));
            return Err(e);
        }
        tracker.complete();
        info!(
            experiment_id,
            completed = summary.completed_tests,
            failed = summary.failed_tests,
            "experiment run finished"
        );
        Ok(Some(summary))
    }

    /// Create-then-run convenience covering the common CLI path.
    pub async fn run_full_experiment(
        &self,
        plan: &ExperimentPlan,
    ) -> anyhow::Result<(String, Option<ExperimentSummary>)> {
        let experiment_id = self.create_experiment(plan)?;
        let summary = self
            .run_experiment(&experiment_id, plan.golden_model.as_deref())
            .await?;
        Ok((experiment_id, summary))
    }

    fn open_or_create_dir(
        &self,
        experiment_id: &str,
        record: &ExperimentRecord,
    ) -> anyhow::Result<ExperimentDir> {
        match ExperimentDir::open(&self.experiments_root, experiment_id) {
            Some(dir) => Ok(dir),
            None => ExperimentDir::create(
                &self.experiments_root,
                experiment_id,
                &ExperimentSetup {
                    user_id: record.user_id.clone(),
                    company_id: record.company_id.clone(),
                    app_id: self.config.app_id.clone(),
                    assistant_ids: record.assistant_ids.clone(),
                    questions: record.questions.clone(),
                },
            ),
        }
    }

    pub fn progress(&self, experiment_id: &str) -> anyhow::Result<Option<ExperimentRecord>> {
        self.store.get_experiment(experiment_id)
    }

    pub fn stats(&self, experiment_id: &str) -> anyhow::Result<Option<ExperimentStats>> {
        self.store.experiment_stats(experiment_id)
    }
}
