pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS experiments (
  experiment_id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  company_id TEXT NOT NULL,
  assistant_ids_json TEXT NOT NULL,
  questions_json TEXT NOT NULL,
  start_time TEXT NOT NULL,
  end_time TEXT,
  status TEXT NOT NULL DEFAULT 'created',
  progress_percentage REAL NOT NULL DEFAULT 0,
  current_step TEXT,
  total_tasks INTEGER NOT NULL DEFAULT 0,
  completed_tasks INTEGER NOT NULL DEFAULT 0,
  estimated_completion TEXT,
  last_updated TEXT
);

CREATE TABLE IF NOT EXISTS responses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id),
  question TEXT NOT NULL,
  assistant_id TEXT NOT NULL,
  chat_id TEXT NOT NULL,
  answer TEXT,
  processed_answer TEXT,
  debug_info_json TEXT,
  hallucination_level TEXT,
  hallucination_reason TEXT,
  references_json TEXT,
  success INTEGER NOT NULL,
  started_at TEXT NOT NULL,
  ended_at TEXT NOT NULL,
  UNIQUE (experiment_id, assistant_id, chat_id)
);

CREATE TABLE IF NOT EXISTS golden_answers (
  question_hash TEXT PRIMARY KEY,
  model_name TEXT NOT NULL,
  question TEXT NOT NULL,
  answer TEXT NOT NULL,
  success INTEGER NOT NULL,
  started_at TEXT NOT NULL,
  ended_at TEXT NOT NULL
);
"#;
