//! Redis task store.
//!
//! Layout:
//! - `task:{id}` hash with the task fields
//! - `task:{id}:steps` list of step records as JSON, in step order
//! - `idemp:{key}` string holding the owning task id
//!
//! Every multi-key operation runs as a Lua script so it is atomic on the
//! server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::{NewStep, StepRecord, Task, TaskStatus, TaskUpdate};
use crate::domain::ports::{CreateOutcome, StoreError, TaskStore};

/// KEYS: task hash, idempotency key. ARGV: task id, then field/value pairs.
/// Returns the existing task id on an idempotency hit, nil otherwise.
static CREATE_WITH_KEY: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local existing = redis.call('GET', KEYS[2])
        if existing then
            return existing
        end
        redis.call('HSET', KEYS[1], unpack(ARGV, 2))
        redis.call('SET', KEYS[2], ARGV[1])
        return false
        ",
    )
});

/// KEYS: task hash. ARGV: target status (or ''), comma-separated allowed
/// current statuses, then field/value pairs.
static UPDATE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 0 then
            return 'missing'
        end
        local current = redis.call('HGET', KEYS[1], 'status')
        if ARGV[1] ~= '' then
            local allowed = false
            for s in string.gmatch(ARGV[2], '[^,]+') do
                if s == current then
                    allowed = true
                end
            end
            if not allowed then
                return 'reject:' .. current
            end
        end
        redis.call('HSET', KEYS[1], unpack(ARGV, 3))
        return 'ok'
        ",
    )
});

/// KEYS: steps list, task hash. ARGV: step JSON object without a `step_no`.
/// Returns the assigned step number, or -1 when the task does not exist.
static APPEND_STEP: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        if redis.call('EXISTS', KEYS[2]) == 0 then
            return -1
        end
        local n = redis.call('LLEN', KEYS[1]) + 1
        redis.call('RPUSH', KEYS[1], '{"step_no":' .. n .. ',' .. string.sub(ARGV[1], 2))
        return n
        "#,
    )
});

fn task_key(id: Uuid) -> String {
    format!("task:{id}")
}

fn steps_key(id: Uuid) -> String {
    format!("task:{id}:steps")
}

fn idempotency_key(key: &str) -> String {
    format!("idemp:{key}")
}

pub struct RedisTaskStore {
    conn: ConnectionManager,
}

impl RedisTaskStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url, "Connected Redis task store");
        Ok(Self { conn })
    }

    async fn fetch_task_hash(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(task_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        task_from_hash(&fields).map(Some)
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn create_or_get_task(&self, task: Task) -> Result<CreateOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let fields = task_to_fields(&task);

        let Some(key) = &task.idempotency_key else {
            let _: () = conn.hset_multiple(task_key(task.task_id), fields.as_slice()).await?;
            return Ok(CreateOutcome::Created(task));
        };

        let mut invocation = CREATE_WITH_KEY.prepare_invoke();
        invocation
            .key(task_key(task.task_id))
            .key(idempotency_key(key))
            .arg(task.task_id.to_string());
        for (field, value) in &fields {
            invocation.arg(field).arg(value);
        }
        let existing: Option<String> = invocation.invoke_async(&mut conn).await?;

        match existing {
            None => Ok(CreateOutcome::Created(task)),
            Some(raw_id) => {
                let id = Uuid::parse_str(&raw_id).map_err(|e| StoreError::CorruptRecord {
                    task_id: raw_id.clone(),
                    reason: e.to_string(),
                })?;
                debug!(task_id = %id, "Idempotency hit");
                let existing = self.get_task(id).await?.ok_or_else(|| StoreError::CorruptRecord {
                    task_id: raw_id,
                    reason: format!("idempotency key {key} points at a missing task"),
                })?;
                Ok(CreateOutcome::Existing(existing))
            }
        }
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let Some(mut task) = self.fetch_task_hash(id).await? else {
            return Ok(None);
        };
        task.steps = self.get_steps(id).await?;
        Ok(Some(task))
    }

    async fn update_task_fields(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut conn = self.conn.clone();

        let allowed = update
            .status
            .map(|s| {
                s.predecessors()
                    .iter()
                    .map(TaskStatus::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();

        let mut invocation = UPDATE.prepare_invoke();
        invocation
            .key(task_key(id))
            .arg(update.status.map(|s| s.as_str()).unwrap_or(""))
            .arg(allowed);
        if let Some(status) = update.status {
            invocation.arg("status").arg(status.as_str());
        }
        if let Some(result) = &update.result {
            invocation.arg("result").arg(result);
        }
        if let Some(error) = &update.error {
            invocation.arg("error").arg(error);
        }
        invocation.arg("updated_at").arg(Utc::now().to_rfc3339());

        let reply: String = invocation.invoke_async(&mut conn).await?;
        match reply.as_str() {
            "ok" => {}
            "missing" => return Err(StoreError::TaskNotFound(id)),
            other => {
                let current = other.strip_prefix("reject:").unwrap_or(other);
                let from = current.parse().map_err(|e: String| StoreError::CorruptRecord {
                    task_id: id.to_string(),
                    reason: e,
                })?;
                return Err(StoreError::InvalidStateTransition {
                    task_id: id,
                    from,
                    // Only a status change can be rejected.
                    to: update.status.unwrap_or(from),
                });
            }
        }

        self.get_task(id).await?.ok_or(StoreError::TaskNotFound(id))
    }

    async fn append_step(&self, id: Uuid, step: NewStep) -> Result<StepRecord, StoreError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(&step)?;

        let step_no: i64 = APPEND_STEP
            .key(steps_key(id))
            .key(task_key(id))
            .arg(body)
            .invoke_async(&mut conn)
            .await?;

        let step_no = u32::try_from(step_no).map_err(|_| StoreError::TaskNotFound(id))?;
        Ok(step.numbered(step_no))
    }

    async fn get_steps(&self, id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(steps_key(id), 0, -1).await?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(StoreError::from))
            .collect()
    }
}

fn task_to_fields(task: &Task) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("task_id", task.task_id.to_string()),
        ("goal", task.goal.clone()),
        ("status", task.status.as_str().to_string()),
        ("created_at", task.created_at.to_rfc3339()),
        ("updated_at", task.updated_at.to_rfc3339()),
    ];
    if let Some(key) = &task.idempotency_key {
        fields.push(("idempotency_key", key.clone()));
    }
    if let Some(result) = &task.result {
        fields.push(("result", result.clone()));
    }
    if let Some(error) = &task.error {
        fields.push(("error", error.clone()));
    }
    fields
}

fn task_from_hash(fields: &HashMap<String, String>) -> Result<Task, StoreError> {
    let raw_id = fields.get("task_id").cloned().unwrap_or_default();
    let corrupt = |reason: String| StoreError::CorruptRecord {
        task_id: raw_id.clone(),
        reason,
    };
    let required = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| corrupt(format!("missing field {name}")))
    };
    let timestamp = |name: &str| -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(required(name)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(e.to_string()))
    };

    Ok(Task {
        task_id: Uuid::parse_str(required("task_id")?).map_err(|e| corrupt(e.to_string()))?,
        goal: required("goal")?.clone(),
        status: required("status")?.parse().map_err(corrupt)?,
        idempotency_key: fields.get("idempotency_key").cloned(),
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
        steps: Vec::new(),
        result: fields.get("result").cloned(),
        error: fields.get("error").cloned(),
    })
}
