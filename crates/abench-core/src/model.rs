use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Hallucination verdict attached to an assistant message by the
/// platform's evaluation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssessmentLabel {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub label: AssessmentLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Citation emitted alongside an assistant answer. `sequence_number`
/// matches the `<sup>N</sup>` markers embedded in the raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub sequence_number: u32,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeInfo {
    #[serde(default)]
    pub search_time: f64,
    #[serde(default)]
    pub crawl_time: f64,
    #[serde(default)]
    pub clean_time: f64,
    #[serde(default)]
    pub total_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugTool {
    #[serde(default)]
    pub time_info: TimeInfo,
    #[serde(default)]
    pub search_query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    #[serde(default)]
    pub tools: Option<Vec<DebugTool>>,
}

/// Normalized assistant message as returned by the chat API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub chat_id: String,
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub assessment: Vec<Assessment>,
}

impl Transcript {
    /// Post-processes the raw answer text for presentation: strips
    /// `<follow-up-question>` blocks and inlines `<sup>N</sup>` citation
    /// markers as `[name](url)` markdown links. Keeps the untouched text
    /// in `original_text` the first time it runs.
    pub fn postprocess(&mut self) {
        let Some(text) = self.text.as_ref() else {
            return;
        };
        if self.original_text.is_none() {
            self.original_text = Some(text.clone());
        }

        static FOLLOWUP: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        let followup = FOLLOWUP.get_or_init(|| {
            regex::Regex::new(r"(?s)<follow-up-question>.*?</follow-up-question>")
                .expect("static regex")
        });
        let mut out = followup.replace_all(text, "").into_owned();

        for r in &self.references {
            let marker = format!("<sup>{}</sup>", r.sequence_number);
            let link = format!("[{}]({})", r.name, r.url);
            out = out.replace(&marker, &link);
        }
        self.text = Some(out);
    }

    /// The representative hallucination verdict: the first assessment
    /// entry, by policy. No aggregation across entries.
    pub fn verdict(&self) -> Option<&Assessment> {
        self.assessment.first()
    }

    /// Timing breakdown from the first debug tool invocation, if any.
    pub fn timing(&self) -> Option<&TimeInfo> {
        self.debug_info
            .as_ref()
            .and_then(|d| d.tools.as_ref())
            .and_then(|tools| tools.first())
            .map(|t| &t.time_info)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExperimentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => ExperimentStatus::Created,
            "running" => ExperimentStatus::Running,
            "completed" => ExperimentStatus::Completed,
            "cancelled" => ExperimentStatus::Cancelled,
            _ => ExperimentStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Created => "created",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Failed => "failed",
            ExperimentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExperimentStatus::Completed | ExperimentStatus::Failed | ExperimentStatus::Cancelled
        )
    }
}

/// One (assistant, question) execution. `success` holds iff a
/// transcript was obtained; `error` is set iff it was not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub test_id: u32,
    pub assistant_id: String,
    pub question: String,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
    pub transcript: Option<Transcript>,
}

impl ExperimentResult {
    pub fn succeeded(
        test_id: u32,
        assistant_id: &str,
        question: &str,
        transcript: Transcript,
        execution_time: f64,
    ) -> Self {
        Self {
            test_id,
            assistant_id: assistant_id.to_string(),
            question: question.to_string(),
            success: true,
            error: None,
            execution_time,
            timestamp: Utc::now(),
            transcript: Some(transcript),
        }
    }

    pub fn failed(
        test_id: u32,
        assistant_id: &str,
        question: &str,
        error: String,
        execution_time: f64,
    ) -> Self {
        Self {
            test_id,
            assistant_id: assistant_id.to_string(),
            question: question.to_string(),
            success: false,
            error: Some(error),
            execution_time,
            timestamp: Utc::now(),
            transcript: None,
        }
    }
}

/// Cached reference answer, content-addressed on (question, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenAnswer {
    pub question_hash: String,
    pub model_name: String,
    pub question: String,
    pub answer: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl GoldenAnswer {
    pub fn question_hash(question: &str, model_name: &str) -> String {
        let mut h = Sha256::new();
        h.update(format!("{} - {}", question, model_name).as_bytes());
        hex::encode(h.finalize())
    }

    pub fn generation_time(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Round aggregate: one question against every configured assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: u32,
    pub question: String,
    pub golden_answer: Option<GoldenAnswer>,
    pub assistant_results: Vec<ExperimentResult>,
    pub total_assistants: usize,
    pub successful_assistants: usize,
    pub failed_assistants: usize,
    pub success_rate: f64,
    pub total_execution_time: f64,
}

impl QuestionResult {
    pub fn aggregate(
        question_id: u32,
        question: &str,
        golden_answer: Option<GoldenAnswer>,
        assistant_results: Vec<ExperimentResult>,
    ) -> Self {
        let total = assistant_results.len();
        let successful = assistant_results.iter().filter(|r| r.success).count();
        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        // Exact sum, not an average: cross-round totals depend on it.
        let total_execution_time = assistant_results.iter().map(|r| r.execution_time).sum();
        Self {
            question_id,
            question: question.to_string(),
            golden_answer,
            total_assistants: total,
            successful_assistants: successful,
            failed_assistants: total - successful,
            success_rate,
            total_execution_time,
            assistant_results,
        }
    }
}

/// Final durable artifact, written exactly once on normal completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub failed_tests: usize,
    pub success_rate: f64,
    pub total_execution_time: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub results: Vec<ExperimentResult>,
    #[serde(default)]
    pub question_results: Vec<QuestionResult>,
    #[serde(default)]
    pub experiment_directory: Option<String>,
}

impl ExperimentSummary {
    pub fn assemble(
        total_tests: usize,
        start_time: DateTime<Utc>,
        question_results: Vec<QuestionResult>,
        experiment_directory: Option<String>,
    ) -> Self {
        let results: Vec<ExperimentResult> = question_results
            .iter()
            .flat_map(|qr| qr.assistant_results.iter().cloned())
            .collect();
        let completed_tests = results.iter().filter(|r| r.success).count();
        let failed_tests = total_tests - completed_tests;
        let success_rate = if total_tests > 0 {
            completed_tests as f64 / total_tests as f64 * 100.0
        } else {
            0.0
        };
        let total_execution_time = results.iter().map(|r| r.execution_time).sum();
        Self {
            total_tests,
            completed_tests,
            failed_tests,
            success_rate,
            total_execution_time,
            start_time,
            end_time: Some(Utc::now()),
            results,
            question_results,
            experiment_directory,
        }
    }
}

/// Declarative experiment request: which assistants, which questions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub assistant_ids: Vec<String>,
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden_model: Option<String>,
}

/// Durable experiment row, including the progress fields polled by
/// external readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub user_id: String,
    pub company_id: String,
    pub assistant_ids: Vec<String>,
    pub questions: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExperimentStatus,
    pub progress_percentage: f64,
    pub current_step: Option<String>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Append-only response row; immutable once written. Uniqueness is
/// (experiment_id, assistant_id, chat_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub experiment_id: String,
    pub question: String,
    pub assistant_id: String,
    pub chat_id: String,
    pub answer: Option<String>,
    pub processed_answer: Option<String>,
    pub debug_info: serde_json::Value,
    pub hallucination_level: Option<String>,
    pub hallucination_reason: Option<String>,
    pub references: Vec<Reference>,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl AssistantResponse {
    pub fn from_result(
        experiment_id: &str,
        result: &ExperimentResult,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let t = result.transcript.as_ref();
        let verdict = t.and_then(|t| t.verdict());
        Self {
            experiment_id: experiment_id.to_string(),
            question: result.question.clone(),
            assistant_id: result.assistant_id.clone(),
            chat_id: t
                .map(|t| t.chat_id.clone())
                .unwrap_or_else(|| format!("failed_test_{}", result.test_id)),
            answer: t.and_then(|t| t.original_text.clone().or_else(|| t.text.clone())),
            processed_answer: t.and_then(|t| t.text.clone()),
            debug_info: t
                .and_then(|t| t.debug_info.as_ref())
                .map(|d| serde_json::to_value(d).unwrap_or_default())
                .unwrap_or_default(),
            hallucination_level: verdict.map(|a| format!("{:?}", a.label).to_uppercase()),
            hallucination_reason: verdict.and_then(|a| a.explanation.clone()),
            references: t.map(|t| t.references.clone()).unwrap_or_default(),
            success: result.success,
            started_at,
            ended_at,
        }
    }
}

/// Aggregate counters for one experiment, computed from stored rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentStats {
    pub total_queries: usize,
    pub total_assistants: usize,
    pub total_responses: usize,
    pub completed_responses: usize,
    pub failed_responses: usize,
    pub success_rate: f64,
    pub average_response_time: Option<f64>,
    pub status: ExperimentStatus,
}
