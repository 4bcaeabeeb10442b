use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::domain::ports::{QueueError, TaskQueue};

/// KEYS: queue list. ARGV: task id. Pushes only when the id is not already
/// waiting; needs `LPOS` (Redis 6.0.6).
static PUSH_IF_ABSENT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('LPOS', KEYS[1], ARGV[1]) then
            return 0
        end
        redis.call('LPUSH', KEYS[1], ARGV[1])
        return 1
        ",
    )
});

/// Redis list queue: `LPUSH` to enqueue, `BRPOP` to dequeue.
///
/// Blocking pops get their own connection so that a waiting `BRPOP` never
/// holds up pushes issued by the API.
pub struct RedisTaskQueue {
    push: ConnectionManager,
    pop: ConnectionManager,
    name: String,
}

impl RedisTaskQueue {
    pub async fn connect(url: &str, name: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let push = ConnectionManager::new(client.clone()).await?;
        let pop = ConnectionManager::new(client).await?;
        let name = name.into();
        info!(url, queue = %name, "Connected Redis task queue");
        Ok(Self { push, pop, name })
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.push.clone();
        let _: i64 = PUSH_IF_ABSENT
            .key(&self.name)
            .arg(task_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, QueueError> {
        let mut conn = self.pop.clone();
        // BRPOP treats 0 as "wait forever", so never send less than a millisecond.
        let seconds = timeout.as_secs_f64().max(0.001);
        let popped: Option<(String, String)> = conn.brpop(&self.name, seconds).await?;

        popped
            .map(|(_, raw)| Uuid::parse_str(&raw).map_err(|_| QueueError::InvalidId(raw)))
            .transpose()
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.push.clone();
        Ok(conn.llen(&self.name).await?)
    }
}
