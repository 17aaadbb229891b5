//! Presentation model for experiment reports.
//!
//! Pure transformation of a summary into rows the writers (HTML,
//! console) can format without touching the domain types again.

use crate::model::{AssessmentLabel, ExperimentResult, ExperimentSummary, QuestionResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RenderModel {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub failed_tests: usize,
    pub success_rate: f64,
    pub total_execution_time: f64,
    pub assistant_timings: Vec<AssistantTiming>,
    pub questions: Vec<QuestionGroup>,
}

/// Mean per-phase times for one assistant across the whole run.
/// Missing phases average to 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantTiming {
    pub assistant_id: String,
    pub search_time: f64,
    pub crawl_time: f64,
    pub execution_time: f64,
}

#[derive(Debug, Clone)]
pub struct QuestionGroup {
    pub question_id: u32,
    pub question: String,
    pub golden_answer: Option<String>,
    pub success_rate: f64,
    pub rows: Vec<ResultRow>,
}

#[derive(Debug, Clone)]
pub struct ResultRow {
    pub test_id: u32,
    pub assistant_id: String,
    pub chat_id: String,
    pub success: bool,
    pub assessment: Option<AssessmentLabel>,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub execution_time: f64,
}

impl RenderModel {
    pub fn from_summary(summary: &ExperimentSummary) -> Self {
        let questions = if summary.question_results.is_empty() {
            group_flat_results(&summary.results)
        } else {
            summary.question_results.iter().map(question_group).collect()
        };

        Self {
            total_tests: summary.total_tests,
            completed_tests: summary.completed_tests,
            failed_tests: summary.failed_tests,
            success_rate: summary.success_rate,
            total_execution_time: summary.total_execution_time,
            assistant_timings: aggregate_timings(&summary.results),
            questions,
        }
    }
}

fn question_group(round: &QuestionResult) -> QuestionGroup {
    QuestionGroup {
        question_id: round.question_id,
        question: round.question.clone(),
        golden_answer: round.golden_answer.as_ref().map(|g| g.answer.clone()),
        success_rate: round.success_rate,
        rows: round.assistant_results.iter().map(result_row).collect(),
    }
}

/// Legacy artifacts carry only the flat result list; reconstruct the
/// question grouping from it, numbering questions in first-seen order.
fn group_flat_results(results: &[ExperimentResult]) -> Vec<QuestionGroup> {
    let mut groups: Vec<QuestionGroup> = Vec::new();
    for result in results {
        let idx = match groups.iter().position(|g| g.question == result.question) {
            Some(idx) => idx,
            None => {
                groups.push(QuestionGroup {
                    question_id: groups.len() as u32 + 1,
                    question: result.question.clone(),
                    golden_answer: None,
                    success_rate: 0.0,
                    rows: Vec::new(),
                });
                groups.len() - 1
            }
        };
        groups[idx].rows.push(result_row(result));
    }
    for group in &mut groups {
        let ok = group.rows.iter().filter(|r| r.success).count();
        group.success_rate = if group.rows.is_empty() {
            0.0
        } else {
            ok as f64 / group.rows.len() as f64 * 100.0
        };
    }
    groups
}

fn result_row(result: &ExperimentResult) -> ResultRow {
    let t = result.transcript.as_ref();
    ResultRow {
        test_id: result.test_id,
        assistant_id: result.assistant_id.clone(),
        chat_id: t.map(|t| t.chat_id.clone()).unwrap_or_else(|| "N/A".into()),
        success: result.success,
        assessment: t.and_then(|t| t.verdict()).map(|a| a.label),
        answer: t.and_then(|t| t.text.clone()),
        error: result.error.clone(),
        execution_time: result.execution_time,
    }
}

/// Per-assistant means over search, crawl and wall-clock time. Phase
/// samples of zero are treated as absent, matching how the platform
/// reports unused phases.
fn aggregate_timings(results: &[ExperimentResult]) -> Vec<AssistantTiming> {
    #[derive(Default)]
    struct Samples {
        search: Vec<f64>,
        crawl: Vec<f64>,
        execution: Vec<f64>,
    }

    let mut per_assistant: BTreeMap<String, Samples> = BTreeMap::new();
    for result in results {
        let samples = per_assistant.entry(result.assistant_id.clone()).or_default();
        if result.execution_time > 0.0 {
            samples.execution.push(result.execution_time);
        }
        let tools = result
            .transcript
            .as_ref()
            .and_then(|t| t.debug_info.as_ref())
            .and_then(|d| d.tools.as_deref())
            .unwrap_or_default();
        for tool in tools {
            if tool.time_info.search_time > 0.0 {
                samples.search.push(tool.time_info.search_time);
            }
            if tool.time_info.crawl_time > 0.0 {
                samples.crawl.push(tool.time_info.crawl_time);
            }
        }
    }

    per_assistant
        .into_iter()
        .map(|(assistant_id, s)| AssistantTiming {
            assistant_id,
            search_time: mean(&s.search),
            crawl_time: mean(&s.crawl),
            execution_time: mean(&s.execution),
        })
        .collect()
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}
