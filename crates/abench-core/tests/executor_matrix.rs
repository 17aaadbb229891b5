//! End-to-end runs of the executor against scripted providers.

use abench_core::config::BenchConfig;
use abench_core::engine::Executor;
use abench_core::model::{ExperimentPlan, ExperimentStatus};
use abench_core::providers::fake::{FakeGoldenClient, ScriptedChatClient, ScriptedReply};
use abench_core::storage::{ExperimentDir, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn test_config(timeout_seconds: u64) -> BenchConfig {
    BenchConfig {
        user_id: "user_1".into(),
        company_id: "company_1".into(),
        app_id: "app_1".into(),
        api_key: "key".into(),
        timeout_seconds,
        ..Default::default()
    }
}

fn build_executor(
    dir: &TempDir,
    chat: ScriptedChatClient,
    timeout_seconds: u64,
) -> (Executor, Store, PathBuf) {
    let store = Store::open(&dir.path().join("bench.db")).unwrap();
    store.init_schema().unwrap();
    let root = dir.path().join("experiments");
    let executor = Executor::new(
        store.clone(),
        Arc::new(chat),
        Arc::new(FakeGoldenClient::answering("golden answer")),
        test_config(timeout_seconds),
        root.clone(),
    );
    (executor, store, root)
}

fn plan(assistants: &[&str], questions: &[&str]) -> ExperimentPlan {
    ExperimentPlan {
        assistant_ids: assistants.iter().map(|s| s.to_string()).collect(),
        questions: questions.iter().map(|s| s.to_string()).collect(),
        golden_model: None,
    }
}

#[tokio::test]
async fn full_matrix_run_produces_summary_artifacts_and_rows() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new()
        .with_reply("assistant_a", ScriptedReply::Text("answer a".into()))
        .with_reply("assistant_b", ScriptedReply::Text("answer b".into()));
    let (executor, store, root) = build_executor(&dir, chat, 30);

    let (experiment_id, summary) = executor
        .run_full_experiment(&plan(&["assistant_a", "assistant_b"], &["q1", "q2"]))
        .await
        .unwrap();
    let summary = summary.expect("run was not cancelled");

    assert_eq!(summary.total_tests, 4);
    assert_eq!(summary.completed_tests, 4);
    assert_eq!(summary.failed_tests, 0);
    assert!((summary.success_rate - 100.0).abs() < 1e-9);
    assert_eq!(summary.question_results.len(), 2);

    // Question-major, 1-based test ids.
    let ids: Vec<u32> = summary.results.iter().map(|r| r.test_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(summary.results[2].assistant_id, "assistant_a");
    assert_eq!(summary.results[2].question, "q2");

    // Durable rows, one per (assistant, question), with wall-clock
    // started_at captured before the call rather than derived from it.
    let rec = store.get_experiment(&experiment_id).unwrap().unwrap();
    let rows = store.list_responses(&experiment_id).unwrap();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert!(row.started_at >= rec.start_time);
        assert!(row.started_at <= row.ended_at);
    }
    assert_eq!(rec.status, ExperimentStatus::Completed);
    assert!((rec.progress_percentage - 100.0).abs() < 1e-9);
    assert_eq!(rec.completed_tasks, 4);
    assert!(rec.end_time.is_some());

    // Artifact tree: config, per-result files, rounds, golden, summary.
    let exp_dir = ExperimentDir::open(&root, &experiment_id).unwrap();
    assert!(exp_dir.path().join("experiment_config.json").is_file());
    assert!(exp_dir.has_summary());
    for n in 1..=2 {
        assert!(exp_dir
            .path()
            .join(format!("question_rounds/question_{n}.json"))
            .is_file());
        assert!(exp_dir
            .path()
            .join(format!("golden_answers/question_{n}.json"))
            .is_file());
    }
    let successes = std::fs::read_dir(exp_dir.path().join("success")).unwrap().count();
    assert_eq!(successes, 4);

    let loaded = exp_dir.load_summary().unwrap();
    assert_eq!(loaded, summary);
}

#[tokio::test]
async fn assistant_failure_becomes_data_not_a_run_error() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new()
        .with_reply("assistant_a", ScriptedReply::Text("fine".into()))
        .with_reply("assistant_b", ScriptedReply::Fail("upstream 500".into()));
    let (executor, store, root) = build_executor(&dir, chat, 30);

    let (experiment_id, summary) = executor
        .run_full_experiment(&plan(&["assistant_a", "assistant_b"], &["q1"]))
        .await
        .unwrap();
    let summary = summary.unwrap();

    assert_eq!(summary.completed_tests, 1);
    assert_eq!(summary.failed_tests, 1);

    let failed = &summary.results[1];
    assert!(!failed.success);
    assert!(failed.transcript.is_none());
    assert_eq!(failed.error.as_deref(), Some("upstream 500"));

    // Failure keyed on the test id in the error folder.
    let exp_dir = ExperimentDir::open(&root, &experiment_id).unwrap();
    assert!(exp_dir.path().join("error/failed_test_2.json").is_file());

    // Run still completed; both rows durable.
    let rec = store.get_experiment(&experiment_id).unwrap().unwrap();
    assert_eq!(rec.status, ExperimentStatus::Completed);
    let rows = store.list_responses(&experiment_id).unwrap();
    assert_eq!(rows.len(), 2);
    let failed_row = rows.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed_row.chat_id, "failed_test_2");
    assert!(failed_row.answer.is_none());
}

#[tokio::test]
async fn hung_assistant_call_times_out_and_is_recorded_as_failure() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new().with_reply("assistant_a", ScriptedReply::Hang);
    let (executor, _store, _root) = build_executor(&dir, chat, 1);

    let (_id, summary) = executor
        .run_full_experiment(&plan(&["assistant_a"], &["q1"]))
        .await
        .unwrap();
    let summary = summary.unwrap();

    assert_eq!(summary.failed_tests, 1);
    let result = &summary.results[0];
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
    assert!(result.execution_time >= 0.9);
}

#[tokio::test]
async fn running_experiment_rejects_a_second_runner() {
    let dir = TempDir::new().unwrap();
    let (executor, store, _root) =
        build_executor(&dir, ScriptedChatClient::new(), 30);

    let experiment_id = executor
        .create_experiment(&plan(&["assistant_a"], &["q1"]))
        .unwrap();

    // Simulate another runner owning the experiment.
    let tracker =
        abench_core::progress::ProgressTracker::new(store.clone(), &experiment_id, 1);
    tracker.begin("Starting experiment");

    let err = executor
        .run_experiment(&experiment_id, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already running"));
}

#[tokio::test]
async fn rerun_clears_previous_responses_instead_of_duplicating() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new()
        .with_reply("assistant_a", ScriptedReply::Text("answer".into()));
    let (executor, store, _root) = build_executor(&dir, chat, 30);

    let experiment_id = executor
        .create_experiment(&plan(&["assistant_a"], &["q1", "q2"]))
        .unwrap();
    executor.run_experiment(&experiment_id, None).await.unwrap();
    assert_eq!(store.list_responses(&experiment_id).unwrap().len(), 2);

    executor.run_experiment(&experiment_id, None).await.unwrap();
    assert_eq!(store.list_responses(&experiment_id).unwrap().len(), 2);
}

#[tokio::test]
async fn cancelled_run_writes_no_summary_and_marks_the_experiment() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new()
        .with_reply("assistant_a", ScriptedReply::Text("answer".into()));
    let (executor, store, root) = build_executor(&dir, chat, 30);

    let experiment_id = executor
        .create_experiment(&plan(&["assistant_a"], &["q1"]))
        .unwrap();
    executor.cancel_flag().cancel();

    let summary = executor.run_experiment(&experiment_id, None).await.unwrap();
    assert!(summary.is_none());

    let rec = store.get_experiment(&experiment_id).unwrap().unwrap();
    assert_eq!(rec.status, ExperimentStatus::Cancelled);
    let exp_dir = ExperimentDir::open(&root, &experiment_id).unwrap();
    assert!(!exp_dir.has_summary());
}

#[tokio::test]
async fn directory_creation_failure_marks_the_experiment_failed() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new()
        .with_reply("assistant_a", ScriptedReply::Text("answer".into()));
    let (executor, store, _root) = build_executor(&dir, chat, 30);

    let experiment_id = executor
        .create_experiment(&plan(&["assistant_a"], &["q1"]))
        .unwrap();

    // Same store, but the experiments root is a plain file, so the
    // directory has to be recreated and cannot be.
    let bad_root = dir.path().join("not_a_directory");
    std::fs::write(&bad_root, "occupied").unwrap();
    let broken = Executor::new(
        store.clone(),
        Arc::new(ScriptedChatClient::new()),
        Arc::new(FakeGoldenClient::answering("golden")),
        test_config(30),
        bad_root,
    );

    broken.run_experiment(&experiment_id, None).await.unwrap_err();

    let rec = store.get_experiment(&experiment_id).unwrap().unwrap();
    assert_eq!(rec.status, ExperimentStatus::Failed);
    assert!(rec
        .current_step
        .as_deref()
        .unwrap()
        .starts_with("Experiment failed:"));
    assert!(rec.end_time.is_some());
}

#[tokio::test]
async fn failing_golden_generation_does_not_block_the_assistant_phase() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("bench.db")).unwrap();
    store.init_schema().unwrap();
    let executor = Executor::new(
        store,
        Arc::new(
            ScriptedChatClient::new()
                .with_reply("assistant_a", ScriptedReply::Text("answer".into())),
        ),
        Arc::new(FakeGoldenClient::failing()),
        test_config(30),
        dir.path().join("experiments"),
    );

    let (_id, summary) = executor
        .run_full_experiment(&plan(&["assistant_a"], &["q1", "q2"]))
        .await
        .unwrap();
    let summary = summary.unwrap();

    // Every assistant call still ran and succeeded.
    assert_eq!(summary.total_tests, 2);
    assert_eq!(summary.completed_tests, 2);
    assert_eq!(summary.question_results.len(), 2);

    // Each round carries the unsuccessful golden answer as data.
    for round in &summary.question_results {
        let golden = round.golden_answer.as_ref().unwrap();
        assert!(!golden.success);
        assert!(golden.answer.starts_with("Error generating golden answer:"));
        assert_eq!(round.successful_assistants, 1);
    }
}

#[tokio::test]
async fn unconfigured_harness_cannot_create_experiments() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("bench.db")).unwrap();
    store.init_schema().unwrap();
    let executor = Executor::new(
        store,
        Arc::new(ScriptedChatClient::new()),
        Arc::new(FakeGoldenClient::answering("golden")),
        BenchConfig::default(),
        dir.path().join("experiments"),
    );

    let err = executor
        .create_experiment(&plan(&["assistant_a"], &["q1"]))
        .unwrap_err();
    assert!(err.to_string().contains("missing configuration"));
    assert!(err.to_string().contains("user_id"));
}

#[tokio::test]
async fn stats_reflect_stored_responses() {
    let dir = TempDir::new().unwrap();
    let chat = ScriptedChatClient::new()
        .with_reply("assistant_a", ScriptedReply::Text("fine".into()))
        .with_reply("assistant_b", ScriptedReply::Fail("boom".into()));
    let (executor, _store, _root) = build_executor(&dir, chat, 30);

    let (experiment_id, _) = executor
        .run_full_experiment(&plan(&["assistant_a", "assistant_b"], &["q1", "q2"]))
        .await
        .unwrap();

    let stats = executor.stats(&experiment_id).unwrap().unwrap();
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.total_assistants, 2);
    assert_eq!(stats.total_responses, 4);
    assert_eq!(stats.completed_responses, 2);
    assert_eq!(stats.failed_responses, 2);
    assert!((stats.success_rate - 50.0).abs() < 1e-9);
    assert!(stats.average_response_time.is_some());
    assert_eq!(stats.status, ExperimentStatus::Completed);
}
