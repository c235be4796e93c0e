use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection};
use std::fmt;
use std::path::Path;

/// Terminal (or in-flight) state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Completed,
    Failed,
    /// Left 'running' by a process that died; set during startup recovery.
    Crashed,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::Crashed => "crashed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for RunOutcome {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RunOutcome {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "running" => Ok(RunOutcome::Running),
            "completed" => Ok(RunOutcome::Completed),
            "failed" => Ok(RunOutcome::Failed),
            "crashed" => Ok(RunOutcome::Crashed),
            other => Err(FromSqlError::Other(
                format!("unknown run outcome '{other}'").into(),
            )),
        }
    }
}

/// How a single stage execution ended. Skipped stages are never recorded;
/// the run outcome already implies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed,
}

impl StageOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StageOutcome::Completed => "completed",
            StageOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for StageOutcome {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StageOutcome {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "completed" => Ok(StageOutcome::Completed),
            "failed" => Ok(StageOutcome::Failed),
            other => Err(FromSqlError::Other(
                format!("unknown stage outcome '{other}'").into(),
            )),
        }
    }
}

/// Everything known about one finished stage execution.
pub struct StageRecord<'a> {
    pub id: &'a str,
    pub run_id: &'a str,
    pub stage_name: &'a str,
    pub outcome: StageOutcome,
    pub rows: Option<i64>,
    pub started_at: &'a str,
    pub finished_at: Option<&'a str>,
    pub duration_ms: Option<i64>,
    pub error: Option<&'a str>,
}

/// SQLite-backed history of pipeline runs and their stages.
///
/// This is observability plumbing, separate from the staging datastore: a
/// run is recorded when triggered, each stage lands with its row count, and
/// runs left running by a crash are swept on startup.
pub struct RunLog {
    conn: Connection,
}

impl RunLog {
    /// Open or create the run log at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let log = Self { conn };
        log.migrate()?;
        Ok(log)
    }

    /// Create an in-memory run log (for testing).
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let log = Self { conn };
        log.migrate()?;
        Ok(log)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pipeline_runs (
                id TEXT PRIMARY KEY,
                pipeline TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            );
            CREATE TABLE IF NOT EXISTS stage_runs (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL REFERENCES pipeline_runs(id),
                stage_name TEXT NOT NULL,
                status TEXT NOT NULL,
                rows INTEGER,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER,
                error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline ON pipeline_runs(pipeline);
            CREATE INDEX IF NOT EXISTS idx_pipeline_runs_status ON pipeline_runs(status);
            CREATE INDEX IF NOT EXISTS idx_stage_runs_run_id ON stage_runs(run_id);",
        )?;
        Ok(())
    }

    /// Record a new pipeline run as started.
    pub fn run_started(
        &self,
        id: &str,
        pipeline: &str,
        trigger_type: &str,
        started_at: &str,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO pipeline_runs (id, pipeline, trigger_type, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, pipeline, trigger_type, RunOutcome::Running, started_at],
        )?;
        Ok(())
    }

    /// Record a pipeline run's terminal outcome.
    pub fn run_finished(
        &self,
        id: &str,
        outcome: RunOutcome,
        finished_at: &str,
        duration_ms: i64,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE pipeline_runs SET status = ?2, finished_at = ?3, duration_ms = ?4 WHERE id = ?1",
            params![id, outcome, finished_at, duration_ms],
        )?;
        Ok(())
    }

    /// Record a finished stage.
    pub fn record_stage(&self, record: &StageRecord<'_>) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO stage_runs (id, run_id, stage_name, status, rows, started_at, finished_at, duration_ms, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.run_id,
                record.stage_name,
                record.outcome,
                record.rows,
                record.started_at,
                record.finished_at,
                record.duration_ms,
                record.error
            ],
        )?;
        Ok(())
    }

    /// Crash recovery on startup: runs still marked running belong to a
    /// process that no longer exists.
    pub fn recover_crashed_runs(&self) -> Result<usize, rusqlite::Error> {
        let count = self.conn.execute(
            "UPDATE pipeline_runs SET status = ?1 WHERE status = ?2",
            params![RunOutcome::Crashed, RunOutcome::Running],
        )?;
        Ok(count)
    }

    /// Recent pipeline runs, most recent first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<PipelineRunRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, pipeline, trigger_type, status, started_at, finished_at, duration_ms
             FROM pipeline_runs ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(PipelineRunRow {
                id: row.get(0)?,
                pipeline: row.get(1)?,
                trigger_type: row.get(2)?,
                status: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
                duration_ms: row.get(6)?,
            })
        })?;
        rows.collect()
    }

    /// Stage records for a specific pipeline run.
    pub fn stage_runs_for(&self, run_id: &str) -> Result<Vec<StageRunRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, stage_name, status, rows, started_at, finished_at, duration_ms, error
             FROM stage_runs WHERE run_id = ?1 ORDER BY started_at",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(StageRunRow {
                id: row.get(0)?,
                run_id: row.get(1)?,
                stage_name: row.get(2)?,
                status: row.get(3)?,
                rows: row.get(4)?,
                started_at: row.get(5)?,
                finished_at: row.get(6)?,
                duration_ms: row.get(7)?,
                error: row.get(8)?,
            })
        })?;
        rows.collect()
    }
}

#[derive(Debug)]
pub struct PipelineRunRow {
    pub id: String,
    pub pipeline: String,
    pub trigger_type: String,
    pub status: RunOutcome,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug)]
pub struct StageRunRow {
    pub id: String,
    pub run_id: String,
    pub stage_name: String,
    pub status: StageOutcome,
    pub rows: Option<i64>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_complete_pipeline_run() {
        let log = RunLog::in_memory().unwrap();

        log.run_started("run-1", "product_model", "daily", "2026-03-05T09:00:00Z")
            .unwrap();

        let runs = log.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunOutcome::Running);

        log.run_finished("run-1", RunOutcome::Completed, "2026-03-05T09:00:05Z", 5000)
            .unwrap();

        let runs = log.recent_runs(10).unwrap();
        assert_eq!(runs[0].status, RunOutcome::Completed);
        assert_eq!(runs[0].duration_ms, Some(5000));
    }

    #[test]
    fn insert_and_query_stage_runs() {
        let log = RunLog::in_memory().unwrap();

        log.run_started("run-1", "product_model", "daily", "2026-03-05T09:00:00Z")
            .unwrap();

        log.record_stage(&StageRecord {
            id: "stage-1",
            run_id: "run-1",
            stage_name: "extract_dims",
            outcome: StageOutcome::Completed,
            rows: Some(608),
            started_at: "2026-03-05T09:00:00Z",
            finished_at: Some("2026-03-05T09:00:02Z"),
            duration_ms: Some(2000),
            error: None,
        })
        .unwrap();

        log.record_stage(&StageRecord {
            id: "stage-2",
            run_id: "run-1",
            stage_name: "normalize_DimProduct",
            outcome: StageOutcome::Failed,
            rows: None,
            started_at: "2026-03-05T09:00:02Z",
            finished_at: Some("2026-03-05T09:00:03Z"),
            duration_ms: Some(1000),
            error: Some("column 'ListPrice' missing from 'src_DimProduct'"),
        })
        .unwrap();

        let stages = log.stage_runs_for("run-1").unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].stage_name, "extract_dims");
        assert_eq!(stages[0].rows, Some(608));
        assert_eq!(stages[1].status, StageOutcome::Failed);
        assert!(stages[1].error.as_deref().unwrap().contains("ListPrice"));
    }

    #[test]
    fn crashed_runs_are_swept_on_recovery() {
        let log = RunLog::in_memory().unwrap();

        log.run_started("run-1", "a", "daily", "2026-03-05T09:00:00Z")
            .unwrap();
        log.run_started("run-2", "b", "interval", "2026-03-05T09:00:01Z")
            .unwrap();
        log.run_finished("run-2", RunOutcome::Completed, "2026-03-05T09:00:05Z", 4000)
            .unwrap();

        let crashed = log.recover_crashed_runs().unwrap();
        assert_eq!(crashed, 1);

        let runs = log.recent_runs(10).unwrap();
        let run1 = runs.iter().find(|r| r.id == "run-1").unwrap();
        assert_eq!(run1.status, RunOutcome::Crashed);
    }

    #[test]
    fn recent_runs_respects_limit() {
        let log = RunLog::in_memory().unwrap();

        for i in 0..5 {
            log.run_started(
                &format!("run-{i}"),
                "product_model",
                "daily",
                &format!("2026-03-05T09:00:{i:02}Z"),
            )
            .unwrap();
        }

        let runs = log.recent_runs(3).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].id, "run-4");
    }
}
