//! What each task kind does when a worker runs it.

use chrono::Utc;
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use smartnotify_common::error::AppError;
use smartnotify_common::tasks::{Task, TaskQueue};
use smartnotify_common::types::ChannelKind;
use smartnotify_engine::accounts::{AccountService, DeviceInfo};
use smartnotify_engine::summary::run_weekly_summary;

use crate::channels::{DeliveryChannel, MockEmailChannel, MockSmsChannel, Recipient};

/// Shared state handed to every task run.
pub struct TaskContext {
    pub pool: PgPool,
    pub queue: TaskQueue,
    pub email: Box<dyn DeliveryChannel>,
    pub sms: Box<dyn DeliveryChannel>,
}

impl TaskContext {
    /// Context with the mock email and SMS channels.
    pub fn new(pool: PgPool, queue: TaskQueue) -> Self {
        Self {
            pool,
            queue,
            email: Box::new(MockEmailChannel),
            sms: Box::new(MockSmsChannel),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryTarget {
    recipient_id: i64,
    email: String,
    mobile: Option<String>,
}

/// Run one task to completion.
pub async fn execute(
    ctx: &TaskContext,
    redis: &mut ConnectionManager,
    task: &Task,
) -> Result<(), AppError> {
    match task {
        Task::SendEmail {
            notification_id,
            subject,
            message,
        } => deliver(ctx, ctx.email.as_ref(), *notification_id, subject, message).await,
        Task::SendSms {
            notification_id,
            message,
        } => deliver(ctx, ctx.sms.as_ref(), *notification_id, "", message).await,
        Task::UnknownDevice {
            user_id,
            ip,
            user_agent,
            fingerprint,
        } => {
            let device = DeviceInfo {
                ip: ip.clone(),
                user_agent: user_agent.clone(),
            };
            tracing::debug!(user_id, fingerprint = %fingerprint, "Handling unknown device");
            AccountService::notify_unknown_device(&ctx.pool, redis, &ctx.queue, *user_id, &device)
                .await?;
            Ok(())
        }
        Task::WeeklySummary => {
            run_weekly_summary(&ctx.pool, Utc::now()).await?;
            Ok(())
        }
    }
}

/// Send a stored notification over `channel` and record the outcome.
async fn deliver(
    ctx: &TaskContext,
    channel: &dyn DeliveryChannel,
    notification_id: i64,
    subject: &str,
    message: &str,
) -> Result<(), AppError> {
    let target: DeliveryTarget = sqlx::query_as(
        r#"
        SELECT n.recipient_id, u.email, u.mobile
        FROM notifications n
        JOIN users u ON u.id = n.recipient_id
        WHERE n.id = $1
        "#,
    )
    .bind(notification_id)
    .fetch_optional(&ctx.pool)
    .await?
    .ok_or_else(|| AppError::not_found("Notification"))?;

    let recipient = Recipient {
        user_id: target.recipient_id,
        email: target.email,
        mobile: target.mobile,
    };
    let delivered = channel.send(&recipient, subject, message)?;

    let sql = match channel.kind() {
        ChannelKind::Email => {
            "UPDATE notifications SET email_status = $2, email_task_id = NULL, updated_at = NOW() WHERE id = $1"
        }
        ChannelKind::Sms => {
            "UPDATE notifications SET sms_status = $2, sms_task_id = NULL, updated_at = NOW() WHERE id = $1"
        }
        ChannelKind::InApp => {
            return Err(AppError::Internal("in-app is not a delivery channel".to_string()));
        }
    };
    sqlx::query(sql)
        .bind(notification_id)
        .bind(delivered)
        .execute(&ctx.pool)
        .await?;

    tracing::info!(
        notification_id,
        channel = %channel.kind(),
        delivered,
        "Notification delivered"
    );
    Ok(())
}
