//! Experiment progress tracking with completion estimates.
//!
//! The tracker owns the in-memory state; every mutation is mirrored to
//! the experiment row so pollers in other processes see the same view.

use crate::model::ExperimentStatus;
use crate::storage::Store;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub status: ExperimentStatus,
    pub progress_percentage: f64,
    pub current_step: Option<String>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl ProgressState {
    fn new(total_tasks: u32) -> Self {
        Self {
            status: ExperimentStatus::Created,
            progress_percentage: 0.0,
            current_step: None,
            total_tasks,
            completed_tasks: 0,
            start_time: Utc::now(),
            end_time: None,
            estimated_completion: None,
        }
    }

    /// Linear extrapolation from elapsed time and percent done. Only
    /// meaningful while running with nonzero progress.
    fn estimate(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.status != ExperimentStatus::Running || self.progress_percentage <= 0.0 {
            return None;
        }
        let elapsed = now - self.start_time;
        let total_ms = elapsed.num_milliseconds() as f64 * (100.0 / self.progress_percentage);
        Some(self.start_time + Duration::milliseconds(total_ms as i64))
    }
}

#[derive(Clone)]
pub struct ProgressTracker {
    experiment_id: String,
    store: Store,
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    pub fn new(store: Store, experiment_id: &str, total_tasks: u32) -> Self {
        Self {
            experiment_id: experiment_id.to_string(),
            store,
            state: Arc::new(Mutex::new(ProgressState::new(total_tasks))),
        }
    }

    pub fn begin(&self, step: &str) {
        self.mutate(|s| {
            s.status = ExperimentStatus::Running;
            s.start_time = Utc::now();
            s.current_step = Some(step.to_string());
        });
    }

    pub fn step(&self, step: &str) {
        self.mutate(|s| s.current_step = Some(step.to_string()));
    }

    /// Marks one more task done and refreshes percentage and estimate.
    pub fn advance(&self, step: &str) {
        self.mutate(|s| {
            s.completed_tasks = (s.completed_tasks + 1).min(s.total_tasks);
            s.progress_percentage = if s.total_tasks > 0 {
                s.completed_tasks as f64 / s.total_tasks as f64 * 100.0
            } else {
                100.0
            };
            s.current_step = Some(step.to_string());
        });
    }

    pub fn complete(&self) {
        self.finish(ExperimentStatus::Completed, "Experiment completed");
    }

    pub fn fail(&self, error: &str) {
        self.finish(ExperimentStatus::Failed, error);
    }

    pub fn cancel(&self) {
        self.finish(ExperimentStatus::Cancelled, "Experiment cancelled");
    }

    fn finish(&self, status: ExperimentStatus, step: &str) {
        self.mutate(|s| {
            if status == ExperimentStatus::Completed {
                s.progress_percentage = 100.0;
                s.completed_tasks = s.total_tasks;
            }
            s.status = status;
            s.current_step = Some(step.to_string());
            s.end_time = Some(Utc::now());
        });
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.lock().unwrap().clone()
    }

    fn mutate(&self, f: impl FnOnce(&mut ProgressState)) {
        let snapshot = {
            let mut s = self.state.lock().unwrap();
            f(&mut s);
            s.estimated_completion = s.estimate(Utc::now());
            s.clone()
        };
        // Progress is advisory; a failed mirror must not sink the run.
        if let Err(e) = self.store.update_progress(&self.experiment_id, &snapshot) {
            warn!(experiment_id = %self.experiment_id, error = %e, "failed to persist progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExperimentRecord;
    use tempfile::TempDir;

    fn store_with_experiment(dir: &TempDir, id: &str) -> Store {
        let store = Store::open(&dir.path().join("bench.db")).unwrap();
        store.init_schema().unwrap();
        store
            .create_experiment(&ExperimentRecord {
                experiment_id: id.to_string(),
                user_id: "u".into(),
                company_id: "c".into(),
                assistant_ids: vec!["assistant_a".into()],
                questions: vec!["q".into()],
                start_time: Utc::now(),
                end_time: None,
                status: ExperimentStatus::Created,
                progress_percentage: 0.0,
                current_step: None,
                total_tasks: 4,
                completed_tasks: 0,
                estimated_completion: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn advance_updates_percentage_and_mirrors_to_store() {
        let dir = TempDir::new().unwrap();
        let store = store_with_experiment(&dir, "exp_1");
        let tracker = ProgressTracker::new(store.clone(), "exp_1", 4);

        tracker.begin("Starting");
        tracker.advance("Task 1 done");
        let state = tracker.snapshot();
        assert_eq!(state.status, ExperimentStatus::Running);
        assert_eq!(state.completed_tasks, 1);
        assert!((state.progress_percentage - 25.0).abs() < 1e-9);
        assert!(state.estimated_completion.is_some());

        let rec = store.get_experiment("exp_1").unwrap().unwrap();
        assert_eq!(rec.status, ExperimentStatus::Running);
        assert_eq!(rec.completed_tasks, 1);
    }

    #[test]
    fn terminal_states_clear_estimate_and_set_end_time() {
        let dir = TempDir::new().unwrap();
        let store = store_with_experiment(&dir, "exp_2");
        let tracker = ProgressTracker::new(store.clone(), "exp_2", 4);

        tracker.begin("Starting");
        tracker.advance("1");
        tracker.complete();

        let state = tracker.snapshot();
        assert_eq!(state.status, ExperimentStatus::Completed);
        assert!((state.progress_percentage - 100.0).abs() < 1e-9);
        assert_eq!(state.completed_tasks, 4);
        assert!(state.end_time.is_some());
        assert!(state.estimated_completion.is_none());
        assert!(state.status.is_terminal());
    }

    #[test]
    fn failure_records_error_text_as_current_step() {
        let dir = TempDir::new().unwrap();
        let store = store_with_experiment(&dir, "exp_3");
        let tracker = ProgressTracker::new(store.clone(), "exp_3", 4);

        tracker.begin("Starting");
        tracker.fail("store unavailable");

        let rec = store.get_experiment("exp_3").unwrap().unwrap();
        assert_eq!(rec.status, ExperimentStatus::Failed);
        assert_eq!(rec.current_step.as_deref(), Some("store unavailable"));
        assert!(rec.end_time.is_some());
    }

    #[test]
    fn zero_progress_has_no_estimate() {
        let dir = TempDir::new().unwrap();
        let store = store_with_experiment(&dir, "exp_4");
        let tracker = ProgressTracker::new(store, "exp_4", 4);
        tracker.begin("Starting");
        assert!(tracker.snapshot().estimated_completion.is_none());
    }
}
