use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::{JsonMap, NewStep, StepRecord, Task, TaskStatus, TaskUpdate};
use crate::domain::ports::{CreateOutcome, StoreError, TaskStore};

/// `SQLite` implementation of [`TaskStore`] using sqlx.
///
/// Idempotent creation relies on the `UNIQUE` constraint on
/// `tasks.idempotency_key` together with `INSERT OR IGNORE`; step numbers are
/// computed inside the inserting statement so they stay gap-free.
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (creating if missing) the database at `path` with WAL enabled.
    ///
    /// # Configuration
    /// - Journal mode: WAL
    /// - Synchronous: NORMAL
    /// - Foreign keys: enabled
    /// - Busy timeout: 5 seconds
    pub async fn connect(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!(path = %path.as_ref().display(), "Opened SQLite task store");
        Ok(Self { pool })
    }

    /// Apply pending migrations. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_task_row(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn fetch_task_by_key(&self, key: &str) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn task_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tasks WHERE task_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_or_get_task(&self, task: Task) -> Result<CreateOutcome, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tasks (
                task_id, goal, status, idempotency_key, result, error, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.task_id.to_string())
        .bind(&task.goal)
        .bind(task.status.as_str())
        .bind(task.idempotency_key.as_deref())
        .bind(task.result.as_deref())
        .bind(task.error.as_deref())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            debug!(task_id = %task.task_id, "Inserted task");
            return Ok(CreateOutcome::Created(task));
        }

        // Ignored insert: the idempotency key (or, in theory, the id) already exists.
        let existing = match &task.idempotency_key {
            Some(key) => self.fetch_task_by_key(key).await?,
            None => self.fetch_task_row(task.task_id).await?,
        };

        match existing {
            Some(mut existing) => {
                existing.steps = self.get_steps(existing.task_id).await?;
                debug!(task_id = %existing.task_id, "Idempotency hit");
                Ok(CreateOutcome::Existing(existing))
            }
            None => Err(StoreError::CorruptRecord {
                task_id: task.task_id.to_string(),
                reason: "insert ignored but no conflicting row found".to_string(),
            }),
        }
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let Some(mut task) = self.fetch_task_row(id).await? else {
            return Ok(None);
        };
        task.steps = self.get_steps(id).await?;
        Ok(Some(task))
    }

    async fn update_task_fields(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut task = self
            .fetch_task_row(id)
            .await?
            .ok_or(StoreError::TaskNotFound(id))?;
        let previous = task.status;

        task.apply(&update)
            .map_err(|(from, to)| StoreError::InvalidStateTransition { task_id: id, from, to })?;

        // Guard on the status we validated against so a concurrent writer
        // cannot slip an illegal transition in between.
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, result = ?, error = ?, updated_at = ?
            WHERE task_id = ? AND status = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(task.result.as_deref())
        .bind(task.error.as_deref())
        .bind(task.updated_at.to_rfc3339())
        .bind(id.to_string())
        .bind(previous.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let current = self
                .fetch_task_row(id)
                .await?
                .ok_or(StoreError::TaskNotFound(id))?;
            warn!(task_id = %id, expected = %previous, found = %current.status, "Status changed concurrently");
            return Err(StoreError::InvalidStateTransition {
                task_id: id,
                from: current.status,
                to: task.status,
            });
        }

        task.steps = self.get_steps(id).await?;
        Ok(task)
    }

    async fn append_step(&self, id: Uuid, step: NewStep) -> Result<StepRecord, StoreError> {
        if !self.task_exists(id).await? {
            return Err(StoreError::TaskNotFound(id));
        }

        let input = serde_json::to_string(&step.input)?;
        let output = step.output.as_ref().map(serde_json::to_string).transpose()?;
        let latency_ms = i64::try_from(step.latency_ms).unwrap_or(i64::MAX);

        let step_no: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO task_steps (
                task_id, step_no, kind, name, input, output, ok, error, latency_ms, ts
            )
            SELECT ?1, COALESCE(MAX(step_no), 0) + 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
            FROM task_steps WHERE task_id = ?1
            RETURNING step_no
            "#,
        )
        .bind(id.to_string())
        .bind(step.kind.as_str())
        .bind(&step.name)
        .bind(input)
        .bind(output)
        .bind(step.ok)
        .bind(step.error.as_deref())
        .bind(latency_ms)
        .bind(step.ts.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let step_no = u32::try_from(step_no).map_err(|_| StoreError::CorruptRecord {
            task_id: id.to_string(),
            reason: format!("step number out of range: {step_no}"),
        })?;
        Ok(step.numbered(step_no))
    }

    async fn get_steps(&self, id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM task_steps WHERE task_id = ? ORDER BY step_no ASC")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_step).collect()
    }
}

/// Parse a timestamp stored as RFC3339 or in `SQLite`'s `YYYY-MM-DD HH:MM:SS` form.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn corrupt(task_id: &str, reason: impl ToString) -> StoreError {
    StoreError::CorruptRecord {
        task_id: task_id.to_string(),
        reason: reason.to_string(),
    }
}

fn row_to_task(row: &SqliteRow) -> Result<Task, StoreError> {
    let raw_id: String = row.try_get("task_id")?;
    let task_id = Uuid::parse_str(&raw_id).map_err(|e| corrupt(&raw_id, e))?;
    let status: TaskStatus = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(|e: String| corrupt(&raw_id, e))?;

    Ok(Task {
        task_id,
        goal: row.try_get("goal")?,
        status,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)
            .map_err(|e| corrupt(&raw_id, e))?,
        updated_at: parse_datetime(&row.try_get::<String, _>("updated_at")?)
            .map_err(|e| corrupt(&raw_id, e))?,
        steps: Vec::new(),
        result: row.try_get("result")?,
        error: row.try_get("error")?,
    })
}

fn row_to_step(row: &SqliteRow) -> Result<StepRecord, StoreError> {
    let raw_id: String = row.try_get("task_id")?;
    let output = row
        .try_get::<Option<String>, _>("output")?
        .map(|s| serde_json::from_str::<JsonMap>(&s))
        .transpose()?;

    Ok(StepRecord {
        step_no: u32::try_from(row.try_get::<i64, _>("step_no")?).map_err(|e| corrupt(&raw_id, e))?,
        kind: row
            .try_get::<String, _>("kind")?
            .parse()
            .map_err(|e: String| corrupt(&raw_id, e))?,
        name: row.try_get("name")?,
        input: serde_json::from_str(&row.try_get::<String, _>("input")?)?,
        output,
        ok: row.try_get("ok")?,
        error: row.try_get("error")?,
        latency_ms: u64::try_from(row.try_get::<i64, _>("latency_ms")?).unwrap_or_default(),
        ts: parse_datetime(&row.try_get::<String, _>("ts")?).map_err(|e| corrupt(&raw_id, e))?,
    })
}
