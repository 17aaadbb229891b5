use crate::model::{
    AssistantResponse, ExperimentRecord, ExperimentStats, ExperimentStatus, GoldenAnswer,
    Reference,
};
use crate::progress::ProgressState;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn create_experiment(&self, rec: &ExperimentRecord) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO experiments(
                experiment_id, user_id, company_id, assistant_ids_json, questions_json,
                start_time, status, progress_percentage, total_tasks, completed_tasks, last_updated
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                rec.experiment_id,
                rec.user_id,
                rec.company_id,
                serde_json::to_string(&rec.assistant_ids)?,
                serde_json::to_string(&rec.questions)?,
                rec.start_time.to_rfc3339(),
                rec.status.as_str(),
                rec.progress_percentage,
                rec.total_tasks,
                rec.completed_tasks,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_experiment(&self, experiment_id: &str) -> anyhow::Result<Option<ExperimentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT experiment_id, user_id, company_id, assistant_ids_json, questions_json,
                    start_time, end_time, status, progress_percentage, current_step,
                    total_tasks, completed_tasks, estimated_completion
             FROM experiments WHERE experiment_id=?1",
        )?;
        let rec = stmt
            .query_row(params![experiment_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, f64>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, u32>(10)?,
                    row.get::<_, u32>(11)?,
                    row.get::<_, Option<String>>(12)?,
                ))
            })
            .optional()?;

        let Some((
            experiment_id,
            user_id,
            company_id,
            assistant_ids_json,
            questions_json,
            start_time,
            end_time,
            status,
            progress_percentage,
            current_step,
            total_tasks,
            completed_tasks,
            estimated_completion,
        )) = rec
        else {
            return Ok(None);
        };

        Ok(Some(ExperimentRecord {
            experiment_id,
            user_id,
            company_id,
            assistant_ids: serde_json::from_str(&assistant_ids_json)?,
            questions: serde_json::from_str(&questions_json)?,
            start_time: parse_ts(&start_time)?,
            end_time: end_time.as_deref().map(parse_ts).transpose()?,
            status: ExperimentStatus::parse(&status),
            progress_percentage,
            current_step,
            total_tasks,
            completed_tasks,
            estimated_completion: estimated_completion.as_deref().map(parse_ts).transpose()?,
        }))
    }

    /// Mirrors the in-memory progress state onto the experiment row so
    /// external pollers see it.
    pub fn update_progress(&self, experiment_id: &str, state: &ProgressState) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE experiments SET
                status=?1, progress_percentage=?2, current_step=?3,
                total_tasks=?4, completed_tasks=?5, estimated_completion=?6,
                end_time=?7, last_updated=?8
             WHERE experiment_id=?9",
            params![
                state.status.as_str(),
                state.progress_percentage,
                state.current_step,
                state.total_tasks,
                state.completed_tasks,
                state.estimated_completion.map(|t| t.to_rfc3339()),
                state.end_time.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
                experiment_id,
            ],
        )?;
        Ok(())
    }

    /// Appends one response row. Returns false when the
    /// (experiment, assistant, chat) key already exists; rows are
    /// immutable once written, so the duplicate is dropped.
    pub fn insert_response(&self, resp: &AssistantResponse) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO responses(
                experiment_id, question, assistant_id, chat_id, answer, processed_answer,
                debug_info_json, hallucination_level, hallucination_reason, references_json,
                success, started_at, ended_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                resp.experiment_id,
                resp.question,
                resp.assistant_id,
                resp.chat_id,
                resp.answer,
                resp.processed_answer,
                serde_json::to_string(&resp.debug_info)?,
                resp.hallucination_level,
                resp.hallucination_reason,
                serde_json::to_string(&resp.references)?,
                resp.success as i64,
                resp.started_at.to_rfc3339(),
                resp.ended_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Clears prior responses ahead of a rerun so the unique key cannot
    /// collide.
    pub fn delete_responses(&self, experiment_id: &str) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM responses WHERE experiment_id=?1",
            params![experiment_id],
        )?;
        Ok(n)
    }

    pub fn get_golden_answer(&self, question_hash: &str) -> anyhow::Result<Option<GoldenAnswer>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT question_hash, model_name, question, answer, success, started_at, ended_at
             FROM golden_answers WHERE question_hash=?1",
        )?;
        let row = stmt
            .query_row(params![question_hash], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .optional()?;

        let Some((question_hash, model_name, question, answer, success, started_at, ended_at)) =
            row
        else {
            return Ok(None);
        };
        Ok(Some(GoldenAnswer {
            question_hash,
            model_name,
            question,
            answer,
            success: success != 0,
            started_at: parse_ts(&started_at)?,
            ended_at: parse_ts(&ended_at)?,
        }))
    }

    /// Insert honoring the unique key: a concurrent duplicate is
    /// silently dropped and the existing row wins. Returns whether this
    /// call inserted the row.
    pub fn insert_golden_answer_if_absent(&self, ga: &GoldenAnswer) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO golden_answers(
                question_hash, model_name, question, answer, success, started_at, ended_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ga.question_hash,
                ga.model_name,
                ga.question,
                ga.answer,
                ga.success as i64,
                ga.started_at.to_rfc3339(),
                ga.ended_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn experiment_stats(&self, experiment_id: &str) -> anyhow::Result<Option<ExperimentStats>> {
        let Some(rec) = self.get_experiment(experiment_id)? else {
            return Ok(None);
        };

        let rows: Vec<(bool, String, String)> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT success, started_at, ended_at FROM responses WHERE experiment_id=?1",
            )?;
            let mapped = stmt.query_map(params![experiment_id], |row| {
                Ok((
                    row.get::<_, i64>(0)? != 0,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            mapped.collect::<Result<_, _>>()?
        };

        let total_responses = rows.len();
        let completed_responses = rows.iter().filter(|(ok, _, _)| *ok).count();
        let mut durations = Vec::with_capacity(rows.len());
        for (_, started, ended) in &rows {
            let d = (parse_ts(ended)? - parse_ts(started)?).num_milliseconds() as f64 / 1000.0;
            durations.push(d);
        }
        let average_response_time = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };
        let success_rate = if total_responses > 0 {
            completed_responses as f64 / total_responses as f64 * 100.0
        } else {
            0.0
        };

        Ok(Some(ExperimentStats {
            total_queries: rec.questions.len(),
            total_assistants: rec.assistant_ids.len(),
            total_responses,
            completed_responses,
            failed_responses: total_responses - completed_responses,
            success_rate,
            average_response_time,
            status: rec.status,
        }))
    }

    pub fn list_responses(&self, experiment_id: &str) -> anyhow::Result<Vec<AssistantResponse>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT experiment_id, question, assistant_id, chat_id, answer, processed_answer,
                    debug_info_json, hallucination_level, hallucination_reason, references_json,
                    success, started_at, ended_at
             FROM responses WHERE experiment_id=?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![experiment_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, i64>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (
                experiment_id,
                question,
                assistant_id,
                chat_id,
                answer,
                processed_answer,
                debug_info_json,
                hallucination_level,
                hallucination_reason,
                references_json,
                success,
                started_at,
                ended_at,
            ) = row?;
            let references: Vec<Reference> = references_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default();
            let debug_info: serde_json::Value = debug_info_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default();
            out.push(AssistantResponse {
                experiment_id,
                question,
                assistant_id,
                chat_id,
                answer,
                processed_answer,
                debug_info,
                hallucination_level,
                hallucination_reason,
                references,
                success: success != 0,
                started_at: parse_ts(&started_at)?,
                ended_at: parse_ts(&ended_at)?,
            });
        }
        Ok(out)
    }
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
