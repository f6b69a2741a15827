//! Task worker: a pool of consumers draining the Redis task queue.
//!
//! Each consumer owns its own Redis connection since `BRPOP` blocks the
//! connection it runs on. A consumer loop:
//! 1. Moves due retries from the delayed set onto the ready list
//! 2. Waits up to `POP_TIMEOUT_SECS` for a task
//! 3. Runs it under the policy's time limit
//! 4. On failure, schedules a retry or dead-letters the task

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;

use smartnotify_common::error::AppError;
use smartnotify_common::tasks::TaskEnvelope;

use crate::handlers::{TaskContext, execute};
use crate::retry::RetryPolicy;

/// How long one `BRPOP` waits before the loop checks for shutdown.
pub const POP_TIMEOUT_SECS: u64 = 5;

/// Why a task run failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskFailure {
    /// Worth another run (broker or database hiccup, time limit).
    #[error("{0}")]
    Retryable(String),
    /// Will fail the same way every time (the target row is gone).
    #[error("{0}")]
    Permanent(String),
}

impl From<AppError> for TaskFailure {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) | AppError::Validation(_) | AppError::PermissionDenied => {
                TaskFailure::Permanent(err.to_string())
            }
            other => TaskFailure::Retryable(other.to_string()),
        }
    }
}

/// What happened to a task after one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Parked for another run after the given countdown.
    Retrying { countdown_secs: u64 },
    DeadLettered,
}

pub struct Worker {
    ctx: Arc<TaskContext>,
    client: redis::Client,
    policy: RetryPolicy,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        ctx: TaskContext,
        client: redis::Client,
        policy: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(ctx),
            client,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    /// Run the consumers until `shutdown` flips to `true`. In-flight tasks
    /// finish before their consumer exits.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let this = Arc::new(self);
        let mut consumers = JoinSet::new();

        for consumer in 0..this.concurrency {
            let redis = this.client.get_connection_manager().await?;
            let worker = Arc::clone(&this);
            let shutdown = shutdown.clone();
            consumers.spawn(async move { worker.consume(consumer, redis, shutdown).await });
        }

        tracing::info!(
            concurrency = this.concurrency,
            queue = this.ctx.queue.ready_key(),
            "Worker started"
        );

        while let Some(joined) = consumers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Consumer task panicked");
            }
        }

        tracing::info!("Worker stopped");
        Ok(())
    }

    async fn consume(
        &self,
        consumer: usize,
        mut redis: ConnectionManager,
        shutdown: watch::Receiver<bool>,
    ) {
        tracing::debug!(consumer, "Consumer started");

        while !*shutdown.borrow() {
            if let Err(e) = self.ctx.queue.promote_due(&mut redis, Utc::now()).await {
                tracing::warn!(consumer, error = %e, "Failed to promote delayed tasks");
            }

            let envelope = match self.ctx.queue.pop(&mut redis, POP_TIMEOUT_SECS).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(consumer, error = %e, "Failed to pop task, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(POP_TIMEOUT_SECS)).await;
                    continue;
                }
            };

            if let Err(e) = self.handle(&mut redis, envelope).await {
                tracing::error!(consumer, error = %e, "Failed to record task outcome");
            }
        }

        tracing::debug!(consumer, "Consumer stopped");
    }

    /// Run one envelope and requeue or dead-letter it on failure.
    pub async fn handle(
        &self,
        redis: &mut ConnectionManager,
        envelope: TaskEnvelope,
    ) -> Result<Outcome, AppError> {
        let task_name = envelope.task.name();
        let run = tokio::time::timeout(
            self.policy.time_limit,
            execute(&self.ctx, redis, &envelope.task),
        )
        .await;

        let failure = match run {
            Ok(Ok(())) => {
                tracing::info!(
                    task_id = %envelope.id,
                    task = task_name,
                    attempt = envelope.attempt,
                    "Task succeeded"
                );
                return Ok(Outcome::Succeeded);
            }
            Ok(Err(e)) => TaskFailure::from(e),
            Err(_) => TaskFailure::Retryable(format!(
                "time limit of {}s exceeded",
                self.policy.time_limit.as_secs()
            )),
        };

        match failure {
            TaskFailure::Retryable(reason) if self.policy.should_retry(envelope.attempt) => {
                let countdown_secs = self.policy.countdown(envelope.attempt);
                let due = Utc::now() + ChronoDuration::seconds(countdown_secs as i64);
                self.ctx
                    .queue
                    .schedule(redis, &envelope.next_attempt(), due)
                    .await?;
                tracing::warn!(
                    task_id = %envelope.id,
                    task = task_name,
                    attempt = envelope.attempt,
                    countdown_secs,
                    reason = %reason,
                    "Task failed, retry scheduled"
                );
                Ok(Outcome::Retrying { countdown_secs })
            }
            TaskFailure::Retryable(reason) | TaskFailure::Permanent(reason) => {
                self.ctx.queue.dead_letter(redis, &envelope, &reason).await?;
                tracing::error!(
                    task_id = %envelope.id,
                    task = task_name,
                    attempt = envelope.attempt,
                    reason = %reason,
                    "Task failed permanently"
                );
                Ok(Outcome::DeadLettered)
            }
        }
    }
}
