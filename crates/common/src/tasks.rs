//! Background task definitions and the Redis-backed queue that carries them.
//!
//! Producers (API handlers, the beat scheduler) push JSON envelopes onto a
//! ready list; workers `BRPOP` them. Retries wait in a sorted set scored by
//! their due time and are moved back to the ready list once due. Tasks that
//! exhaust their retries land on a dead-letter list for inspection.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

const DEFAULT_PREFIX: &str = "smartnotify:tasks";

/// Upper bound on delayed tasks promoted per sweep.
const PROMOTE_BATCH: isize = 100;

/// Work items executed by the notifier worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Deliver a notification over the (mock) email channel.
    SendEmail {
        notification_id: i64,
        subject: String,
        message: String,
    },
    /// Deliver a notification over the (mock) SMS channel.
    SendSms {
        notification_id: i64,
        message: String,
    },
    /// Alert a user about a login from a device not seen before.
    UnknownDevice {
        user_id: i64,
        ip: String,
        user_agent: String,
        fingerprint: String,
    },
    /// Summarise each user's unread notifications from the past week.
    WeeklySummary,
}

impl Task {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Task::SendEmail { .. } => "send_email_notification",
            Task::SendSms { .. } => "send_sms_notification",
            Task::UnknownDevice { .. } => "handle_unknown_device",
            Task::WeeklySummary => "send_weekly_summary",
        }
    }
}

/// A task plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    /// Number of previous failed runs.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub task: Task,
}

impl TaskEnvelope {
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 0,
            enqueued_at: Utc::now(),
            task,
        }
    }

    /// The same task, one attempt later. The id is kept so that
    /// `*_task_id` columns keep pointing at it across retries.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Queue(format!("Failed to encode task: {}", e)))
    }

    pub fn decode(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Queue(format!("Failed to decode task: {}", e)))
    }
}

/// Record written to the dead-letter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub envelope: TaskEnvelope,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Key layout of the task queue in Redis.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    ready_key: String,
    delayed_key: String,
    dead_key: String,
}

impl TaskQueue {
    pub fn new(prefix: &str) -> Self {
        Self {
            ready_key: prefix.to_string(),
            delayed_key: format!("{}:delayed", prefix),
            dead_key: format!("{}:dead", prefix),
        }
    }

    pub fn ready_key(&self) -> &str {
        &self.ready_key
    }

    pub fn delayed_key(&self) -> &str {
        &self.delayed_key
    }

    pub fn dead_key(&self) -> &str {
        &self.dead_key
    }

    /// Wrap `task` in a fresh envelope and push it for immediate execution.
    /// Returns the task id.
    pub async fn enqueue(&self, redis: &mut ConnectionManager, task: Task) -> Result<Uuid, AppError> {
        let envelope = TaskEnvelope::new(task);
        self.push(redis, &envelope).await?;

        tracing::debug!(
            task_id = %envelope.id,
            task = envelope.task.name(),
            "Task enqueued"
        );
        Ok(envelope.id)
    }

    /// Push an envelope onto the ready list.
    pub async fn push(
        &self,
        redis: &mut ConnectionManager,
        envelope: &TaskEnvelope,
    ) -> Result<(), AppError> {
        let payload = envelope.encode()?;
        redis.lpush::<_, _, ()>(&self.ready_key, payload).await?;
        Ok(())
    }

    /// Park an envelope until `due`.
    pub async fn schedule(
        &self,
        redis: &mut ConnectionManager,
        envelope: &TaskEnvelope,
        due: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let payload = envelope.encode()?;
        redis
            .zadd::<_, _, _, ()>(&self.delayed_key, payload, due.timestamp())
            .await?;
        Ok(())
    }

    /// Move delayed envelopes whose due time has passed onto the ready list.
    ///
    /// `ZREM` decides ownership so concurrent workers never promote the same
    /// envelope twice.
    pub async fn promote_due(
        &self,
        redis: &mut ConnectionManager,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.delayed_key)
            .arg("-inf")
            .arg(now.timestamp())
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(redis)
            .await?;

        let mut promoted = 0;
        for payload in due {
            let removed: i64 = redis.zrem(&self.delayed_key, &payload).await?;
            if removed == 1 {
                redis.lpush::<_, _, ()>(&self.ready_key, &payload).await?;
                promoted += 1;
            }
        }

        if promoted > 0 {
            tracing::debug!(promoted, "Promoted delayed tasks");
        }
        Ok(promoted)
    }

    /// Block up to `timeout_secs` for the next ready envelope.
    ///
    /// Payloads that fail to decode are moved to the dead-letter list and
    /// reported as `None`.
    pub async fn pop(
        &self,
        redis: &mut ConnectionManager,
        timeout_secs: u64,
    ) -> Result<Option<TaskEnvelope>, AppError> {
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.ready_key)
            .arg(timeout_secs)
            .query_async(redis)
            .await?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };

        match TaskEnvelope::decode(&payload) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable task payload");
                redis.lpush::<_, _, ()>(&self.dead_key, payload).await?;
                Ok(None)
            }
        }
    }

    /// Record a task that will not be retried.
    pub async fn dead_letter(
        &self,
        redis: &mut ConnectionManager,
        envelope: &TaskEnvelope,
        reason: &str,
    ) -> Result<(), AppError> {
        let record = DeadLetter {
            envelope: envelope.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| AppError::Queue(format!("Failed to encode dead letter: {}", e)))?;
        redis.lpush::<_, _, ()>(&self.dead_key, payload).await?;
        Ok(())
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
