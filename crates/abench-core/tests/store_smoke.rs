use abench_core::model::{
    AssistantResponse, ExperimentRecord, ExperimentStatus, GoldenAnswer,
};
use abench_core::storage::Store;
use chrono::Utc;
use tempfile::TempDir;

fn record(id: &str) -> ExperimentRecord {
    ExperimentRecord {
        experiment_id: id.to_string(),
        user_id: "user_1".into(),
        company_id: "company_1".into(),
        assistant_ids: vec!["assistant_a".into()],
        questions: vec!["q1".into()],
        start_time: Utc::now(),
        end_time: None,
        status: ExperimentStatus::Created,
        progress_percentage: 0.0,
        current_step: None,
        total_tasks: 1,
        completed_tasks: 0,
        estimated_completion: None,
    }
}

fn response(experiment_id: &str, chat_id: &str) -> AssistantResponse {
    AssistantResponse {
        experiment_id: experiment_id.to_string(),
        question: "q1".into(),
        assistant_id: "assistant_a".into(),
        chat_id: chat_id.to_string(),
        answer: Some("raw".into()),
        processed_answer: Some("processed".into()),
        debug_info: serde_json::Value::Null,
        hallucination_level: Some("GREEN".into()),
        hallucination_reason: None,
        references: vec![],
        success: true,
        started_at: Utc::now(),
        ended_at: Utc::now(),
    }
}

#[test]
fn experiment_record_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("bench.db")).unwrap();
    store.init_schema().unwrap();

    let rec = record("experiment_1");
    store.create_experiment(&rec).unwrap();
    let loaded = store.get_experiment("experiment_1").unwrap().unwrap();
    assert_eq!(loaded, rec);
    assert!(store.get_experiment("missing").unwrap().is_none());
}

#[test]
fn duplicate_response_key_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("bench.db")).unwrap();
    store.init_schema().unwrap();
    store.create_experiment(&record("experiment_1")).unwrap();

    assert!(store.insert_response(&response("experiment_1", "chat_1")).unwrap());
    assert!(!store.insert_response(&response("experiment_1", "chat_1")).unwrap());
    assert!(store.insert_response(&response("experiment_1", "chat_2")).unwrap());
    assert_eq!(store.list_responses("experiment_1").unwrap().len(), 2);
}

#[test]
fn first_golden_answer_wins_on_conflicting_insert() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("bench.db")).unwrap();
    store.init_schema().unwrap();

    let hash = GoldenAnswer::question_hash("q", "gpt-4");
    let first = GoldenAnswer {
        question_hash: hash.clone(),
        model_name: "gpt-4".into(),
        question: "q".into(),
        answer: "first".into(),
        success: true,
        started_at: Utc::now(),
        ended_at: Utc::now(),
    };
    let second = GoldenAnswer {
        answer: "second".into(),
        ..first.clone()
    };

    assert!(store.insert_golden_answer_if_absent(&first).unwrap());
    assert!(!store.insert_golden_answer_if_absent(&second).unwrap());
    assert_eq!(
        store.get_golden_answer(&hash).unwrap().unwrap().answer,
        "first"
    );
}
