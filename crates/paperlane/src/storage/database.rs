//! SQLite persistence for job records
//!
//! The durable half of the job store: every record mutation is written
//! through here so jobs survive a restart. In-memory state is rebuilt from
//! this table at startup; queued jobs are re-enqueued and processing jobs
//! are left for the liveness reaper to recover.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::job::{AnalysisKind, Job, JobError, JobSource, JobState};

/// SQLite-backed job persistence
pub struct JobDb {
    conn: Arc<Mutex<Connection>>,
}

impl JobDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                stage TEXT,
                progress INTEGER NOT NULL DEFAULT 0,
                source_kind TEXT NOT NULL,
                source_value TEXT NOT NULL,
                analysis_kind TEXT NOT NULL,
                query TEXT,
                callback_url TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                epoch INTEGER NOT NULL DEFAULT 0,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                error_code TEXT,
                error_message TEXT,
                result_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at);
        "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// Insert or replace a job record
    pub fn upsert_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT OR REPLACE INTO jobs (
                id, state, stage, progress, source_kind, source_value,
                analysis_kind, query, callback_url, attempts, epoch,
                cancel_requested, error_code, error_message, result_path,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                job.id.to_string(),
                job.state.as_str(),
                job.stage,
                job.progress as i64,
                job.source.kind(),
                job.source.value(),
                job.kind.as_str(),
                job.query,
                job.callback_url,
                job.attempts as i64,
                job.epoch as i64,
                job.cancel_requested as i64,
                job.error.as_ref().map(|e| e.code.clone()),
                job.error.as_ref().map(|e| e.message.clone()),
                job.result_path.as_ref().map(|p| p.display().to_string()),
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to persist job {}: {}", job.id, e)))?;

        Ok(())
    }

    /// Fetch one job record
    pub fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![job_id.to_string()],
            row_to_job,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to load job {}: {}", job_id, e)))
    }

    /// Load every persisted job, oldest first
    pub fn load_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM jobs ORDER BY created_at ASC")
            .map_err(|e| Error::Storage(format!("Failed to prepare job query: {}", e)))?;

        let records = stmt
            .query_map([], row_to_job)
            .map_err(|e| Error::Storage(format!("Failed to load jobs: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read job row: {}", e)))?;

        Ok(records)
    }

    /// Delete a job record, returning whether it existed
    pub fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        let deleted = conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id.to_string()])
            .map_err(|e| Error::Storage(format!("Failed to delete job {}: {}", job_id, e)))?;

        Ok(deleted > 0)
    }
}

/// Map a database row onto a job record
fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let id_str: String = row.get("id")?;
    let state_str: String = row.get("state")?;
    let source_kind: String = row.get("source_kind")?;
    let source_value: String = row.get("source_value")?;
    let kind_str: String = row.get("analysis_kind")?;
    let error_code: Option<String> = row.get("error_code")?;
    let error_message: Option<String> = row.get("error_message")?;
    let result_path: Option<String> = row.get("result_path")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    let source = match source_kind.as_str() {
        "remote_url" => JobSource::RemoteUrl(source_value),
        _ => JobSource::DocumentRef(source_value),
    };

    let error = match (error_code, error_message) {
        (Some(code), message) => Some(JobError::new(code, message.unwrap_or_default())),
        _ => None,
    };

    Ok(Job {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        state: JobState::parse(&state_str).unwrap_or(JobState::Error),
        stage: row.get("stage")?,
        progress: row.get::<_, i64>("progress")?.clamp(0, 100) as u8,
        source,
        kind: AnalysisKind::parse(&kind_str).unwrap_or_default(),
        query: row.get("query")?,
        callback_url: row.get("callback_url")?,
        attempts: row.get::<_, i64>("attempts")?.max(0) as u32,
        epoch: row.get::<_, i64>("epoch")?.max(0) as u64,
        cancel_requested: row.get::<_, i64>("cancel_requested")? != 0,
        error,
        result_path: result_path.map(PathBuf::from),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
