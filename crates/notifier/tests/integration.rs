//! Integration tests for the task worker.
//!
//! Requires PostgreSQL (`DATABASE_URL`) and Redis (`REDIS_URL`, defaults to
//! `redis://localhost:6379/0`). Run with:
//!
//! ```bash
//! cargo test -p smartnotify-notifier --test integration -- --ignored --nocapture
//! ```

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

use smartnotify_common::error::AppError;
use smartnotify_common::redis_pool::{create_redis_pool, open_client};
use smartnotify_common::tasks::{DeadLetter, Task, TaskEnvelope, TaskQueue};
use smartnotify_common::types::{ChannelKind, Notification};
use smartnotify_notifier::channels::{DeliveryChannel, Recipient};
use smartnotify_notifier::handlers::TaskContext;
use smartnotify_notifier::retry::RetryPolicy;
use smartnotify_notifier::worker::{Outcome, Worker};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".into())
}

async fn setup(pool: &PgPool) -> (ConnectionManager, TaskQueue) {
    smartnotify_common::db::run_migrations(pool).await.unwrap();
    let redis = create_redis_pool(&redis_url()).await.unwrap();
    let queue = TaskQueue::new(&format!("smartnotify:test:{}", Uuid::new_v4()));
    (redis, queue)
}

fn worker(pool: &PgPool, queue: &TaskQueue) -> Worker {
    worker_with(TaskContext::new(pool.clone(), queue.clone()))
}

fn worker_with(ctx: TaskContext) -> Worker {
    Worker::new(ctx, open_client(&redis_url()).unwrap(), RetryPolicy::default(), 1)
}

async fn create_user(pool: &PgPool, email: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (email, mobile, password_hash) VALUES ($1, '9812345678', 'x') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn create_notification(pool: &PgPool, user_id: i64) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO notifications (recipient_id, message, in_app_status, email_task_id, sms_task_id)
        VALUES ($1, 'hello', true, 'pending-email', 'pending-sms')
        RETURNING id
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn load(pool: &PgPool, id: i64) -> Notification {
    sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Channel whose provider is always down.
struct BrokenEmail;

impl DeliveryChannel for BrokenEmail {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn send(&self, _: &Recipient, _: &str, _: &str) -> Result<bool, AppError> {
        Err(AppError::Internal("provider unavailable".to_string()))
    }
}

#[sqlx::test]
#[ignore]
async fn test_email_task_marks_status_and_clears_task_id(pool: PgPool) {
    let (mut redis, queue) = setup(&pool).await;
    let user_id = create_user(&pool, "jane@example.com").await;
    let id = create_notification(&pool, user_id).await;

    let envelope = TaskEnvelope::new(Task::SendEmail {
        notification_id: id,
        subject: "New Comment Posted".into(),
        message: "hello".into(),
    });
    let outcome = worker(&pool, &queue).handle(&mut redis, envelope).await.unwrap();
    assert_eq!(outcome, Outcome::Succeeded);

    let row = load(&pool, id).await;
    assert!(row.email_status);
    assert!(row.email_task_id.is_none());
    // The SMS side is untouched.
    assert!(!row.sms_status);
    assert_eq!(row.sms_task_id.as_deref(), Some("pending-sms"));
}

#[sqlx::test]
#[ignore]
async fn test_sms_task_marks_status(pool: PgPool) {
    let (mut redis, queue) = setup(&pool).await;
    let user_id = create_user(&pool, "jane@example.com").await;
    let id = create_notification(&pool, user_id).await;

    let envelope = TaskEnvelope::new(Task::SendSms {
        notification_id: id,
        message: "x".repeat(400),
    });
    let outcome = worker(&pool, &queue).handle(&mut redis, envelope).await.unwrap();
    assert_eq!(outcome, Outcome::Succeeded);

    let row = load(&pool, id).await;
    assert!(row.sms_status);
    assert!(row.sms_task_id.is_none());
}

#[sqlx::test]
#[ignore]
async fn test_missing_notification_is_dead_lettered(pool: PgPool) {
    let (mut redis, queue) = setup(&pool).await;

    let envelope = TaskEnvelope::new(Task::SendSms {
        notification_id: 987_654,
        message: "gone".into(),
    });
    let outcome = worker(&pool, &queue)
        .handle(&mut redis, envelope.clone())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::DeadLettered);

    let dead: Vec<String> = redis.lrange(queue.dead_key(), 0, -1).await.unwrap();
    assert_eq!(dead.len(), 1);
    let record: DeadLetter = serde_json::from_str(&dead[0]).unwrap();
    assert_eq!(record.envelope.id, envelope.id);
    assert!(record.reason.contains("Notification instance not found."));
}

#[sqlx::test]
#[ignore]
async fn test_failures_retry_with_backoff_then_dead_letter(pool: PgPool) {
    let (mut redis, queue) = setup(&pool).await;
    let user_id = create_user(&pool, "jane@example.com").await;
    let id = create_notification(&pool, user_id).await;

    let mut ctx = TaskContext::new(pool.clone(), queue.clone());
    ctx.email = Box::new(BrokenEmail);
    let worker = worker_with(ctx);

    let mut envelope = TaskEnvelope::new(Task::SendEmail {
        notification_id: id,
        subject: "s".into(),
        message: "m".into(),
    });

    for (attempt, expected) in [(0u32, 60u64), (1, 120), (2, 240)] {
        assert_eq!(envelope.attempt, attempt);
        let outcome = worker.handle(&mut redis, envelope.clone()).await.unwrap();
        assert_eq!(outcome, Outcome::Retrying { countdown_secs: expected });

        let parked: Vec<String> = redis.zrange(queue.delayed_key(), 0, -1).await.unwrap();
        assert_eq!(parked.len(), 1);
        let next = TaskEnvelope::decode(&parked[0]).unwrap();
        assert_eq!(next.id, envelope.id);
        assert_eq!(next.attempt, attempt + 1);
        let _: () = redis.del(queue.delayed_key()).await.unwrap();
        envelope = next;
    }

    let outcome = worker.handle(&mut redis, envelope).await.unwrap();
    assert_eq!(outcome, Outcome::DeadLettered);
    let dead: i64 = redis.llen(queue.dead_key()).await.unwrap();
    assert_eq!(dead, 1);

    let row = load(&pool, id).await;
    assert!(!row.email_status);
}

#[sqlx::test]
#[ignore]
async fn test_unknown_device_task_creates_notification(pool: PgPool) {
    let (mut redis, queue) = setup(&pool).await;
    let user_id = create_user(&pool, "jane@example.com").await;

    let envelope = TaskEnvelope::new(Task::UnknownDevice {
        user_id,
        ip: "10.1.1.1".into(),
        user_agent: "curl/8.0".into(),
        fingerprint: "abc".into(),
    });
    let outcome = worker(&pool, &queue).handle(&mut redis, envelope).await.unwrap();
    assert_eq!(outcome, Outcome::Succeeded);

    let rows: Vec<Notification> =
        sqlx::query_as("SELECT * FROM notifications WHERE recipient_id = $1")
            .bind(user_id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].message.starts_with("Unknown device login detected"));
    // No preference row: defaults apply, so in-app only and nothing queued.
    assert!(rows[0].in_app_status);
    let queued: i64 = redis.llen(queue.ready_key()).await.unwrap();
    assert_eq!(queued, 0);
}

#[sqlx::test]
#[ignore]
async fn test_promote_due_moves_retries_back(pool: PgPool) {
    let (mut redis, queue) = setup(&pool).await;

    let envelope = TaskEnvelope::new(Task::WeeklySummary);
    let past = chrono::Utc::now() - chrono::Duration::seconds(5);
    queue.schedule(&mut redis, &envelope, past).await.unwrap();

    let promoted = queue.promote_due(&mut redis, chrono::Utc::now()).await.unwrap();
    assert_eq!(promoted, 1);
    let popped = queue.pop(&mut redis, 1).await.unwrap().unwrap();
    assert_eq!(popped.id, envelope.id);
}
