//! One question round: fetch the golden answer, then ask every
//! configured assistant the same question.

use crate::cache::GoldenAnswerCache;
use crate::engine::CancelFlag;
use crate::model::{AssistantResponse, ExperimentResult, QuestionResult};
use crate::progress::ProgressTracker;
use crate::providers::chat::ChatClient;
use crate::storage::{ExperimentDir, Store};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

pub struct RoundProcessor {
    chat: Arc<dyn ChatClient>,
    golden: GoldenAnswerCache,
    store: Store,
    call_timeout: Duration,
}

impl RoundProcessor {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        golden: GoldenAnswerCache,
        store: Store,
        call_timeout: Duration,
    ) -> Self {
        Self {
            chat,
            golden,
            store,
            call_timeout,
        }
    }

    /// Runs one question against every assistant, persisting each
    /// result as soon as it is known. Assistant calls run sequentially
    /// in configured order; a single call never takes down the round,
    /// its error becomes data on the result instead.
    ///
    /// Returns `None` when cancellation was observed; results persisted
    /// before that point are kept.
    pub async fn run_round(
        &self,
        experiment_id: &str,
        dir: &ExperimentDir,
        tracker: &ProgressTracker,
        cancel: &CancelFlag,
        question_id: u32,
        question: &str,
        assistant_ids: &[String],
        golden_model: &str,
    ) -> anyhow::Result<Option<QuestionResult>> {
        info!(question_id, "starting question round");
        tracker.step(&format!("Generating golden answer for question {question_id}"));
        let golden_answer = self.golden.get_or_create(question, golden_model).await?;
        dir.save_golden(question_id, &golden_answer);

        let mut results = Vec::with_capacity(assistant_ids.len());
        for (idx, assistant_id) in assistant_ids.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(question_id, "round cancelled");
                return Ok(None);
            }

            // Question-major numbering, 1-based across the whole matrix.
            let test_id = (question_id - 1) * assistant_ids.len() as u32 + idx as u32 + 1;
            let started_at = Utc::now();
            let result = self.run_single(test_id, assistant_id, question).await;

            dir.save_result(&result);
            let response = AssistantResponse::from_result(experiment_id, &result, started_at, Utc::now());
            if let Err(e) = self.store.insert_response(&response) {
                warn!(test_id, error = %e, "failed to record response");
            }

            // Progress advances only after the result is durable.
            tracker.advance(&format!(
                "Question {question_id}: {} ({}/{})",
                assistant_id,
                idx + 1,
                assistant_ids.len()
            ));
            results.push(result);
        }

        let round = QuestionResult::aggregate(question_id, question, Some(golden_answer), results);
        dir.save_round(&round);
        info!(
            question_id,
            successful = round.successful_assistants,
            failed = round.failed_assistants,
            "question round finished"
        );
        Ok(Some(round))
    }

    /// One (assistant, question) call. Success iff a transcript came
    /// back before the timeout.
    async fn run_single(&self, test_id: u32, assistant_id: &str, question: &str) -> ExperimentResult {
        let start = Instant::now();
        let outcome = timeout(self.call_timeout, self.chat.send_message(assistant_id, question)).await;
        let execution_time = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(mut transcript)) => {
                transcript.postprocess();
                ExperimentResult::succeeded(test_id, assistant_id, question, transcript, execution_time)
            }
            Ok(Err(e)) => {
                warn!(test_id, assistant_id, error = %e, "assistant call failed");
                ExperimentResult::failed(test_id, assistant_id, question, e.to_string(), execution_time)
            }
            Err(_) => {
                warn!(test_id, assistant_id, "assistant call timed out");
                ExperimentResult::failed(
                    test_id,
                    assistant_id,
                    question,
                    format!("timed out after {}s", self.call_timeout.as_secs()),
                    execution_time,
                )
            }
        }
    }
}
