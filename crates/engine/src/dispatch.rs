//! Comment dispatch: fans a new comment out to the thread's subscribers.
//!
//! For each new comment:
//! 1. Load every subscriber of the thread except the author
//! 2. Skip subscribers that have no preference row
//! 3. Insert one notification per remaining subscriber and record the id of
//!    each planned email / SMS task on its own row, inside the caller's
//!    transaction
//! 4. After commit, push those tasks to the broker

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use smartnotify_common::error::AppError;
use smartnotify_common::tasks::{Task, TaskEnvelope, TaskQueue};
use smartnotify_common::types::{ChannelKind, Comment, NotificationPreference};

pub const COMMENT_SUBJECT: &str = "New Comment Posted";

/// Channel switches resolved for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSwitches {
    pub in_app: bool,
    pub email: bool,
    pub sms: bool,
}

impl Default for ChannelSwitches {
    /// Same defaults a freshly created preference row gets.
    fn default() -> Self {
        Self {
            in_app: true,
            email: false,
            sms: false,
        }
    }
}

impl From<&NotificationPreference> for ChannelSwitches {
    fn from(pref: &NotificationPreference) -> Self {
        Self {
            in_app: pref.allows(ChannelKind::InApp),
            email: pref.allows(ChannelKind::Email),
            sms: pref.allows(ChannelKind::Sms),
        }
    }
}

/// A notification to be created for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNotification {
    pub recipient_id: i64,
    pub channels: ChannelSwitches,
}

/// Everything needed to persist and deliver a comment's notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub message: String,
    pub notifications: Vec<PlannedNotification>,
}

/// Outcome of dispatching one comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub notifications: usize,
    pub email_tasks: usize,
    pub sms_tasks: usize,
}

/// Delivery task ids queued for one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryTasks {
    pub email: Option<Uuid>,
    pub sms: Option<Uuid>,
}

/// Message shown for a new comment.
pub fn comment_message(thread_title: &str, author_email: &str) -> String {
    format!("New comment on '{}' by {}", thread_title, author_email)
}

/// Decide who gets notified and how. Pure: no I/O.
///
/// Subscribers are visited in the given order; the author and anyone
/// without a preference row are skipped.
pub fn plan_dispatch(
    author_id: i64,
    author_email: &str,
    thread_title: &str,
    subscribers: &[i64],
    preferences: &HashMap<i64, ChannelSwitches>,
) -> DispatchPlan {
    let notifications = subscribers
        .iter()
        .filter(|&&user_id| user_id != author_id)
        .filter_map(|user_id| {
            preferences.get(user_id).map(|channels| PlannedNotification {
                recipient_id: *user_id,
                channels: *channels,
            })
        })
        .collect();

    DispatchPlan {
        message: comment_message(thread_title, author_email),
        notifications,
    }
}

/// A delivery task whose id is already recorded on its notification row
/// but which has not been pushed to the broker yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDelivery {
    pub notification_id: i64,
    pub channel: ChannelKind,
    pub envelope: TaskEnvelope,
}

/// Notifications written for a comment, with deliveries waiting for commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedDispatch {
    pub notifications: usize,
    pub deliveries: Vec<StagedDelivery>,
}

impl PreparedDispatch {
    /// Push the staged deliveries. Call only after the transaction that
    /// staged them has committed.
    pub async fn enqueue(
        self,
        pool: &PgPool,
        redis: &mut ConnectionManager,
        queue: &TaskQueue,
    ) -> DispatchSummary {
        let tasks = enqueue_staged(pool, redis, queue, self.deliveries).await;
        DispatchSummary {
            notifications: self.notifications,
            email_tasks: tasks.iter().filter(|t| t.email.is_some()).count(),
            sms_tasks: tasks.iter().filter(|t| t.sms.is_some()).count(),
        }
    }
}

/// Run the full dispatch for an already saved comment: write its
/// notifications in one transaction, then queue their deliveries.
pub async fn dispatch_comment_notification(
    pool: &PgPool,
    redis: &mut ConnectionManager,
    queue: &TaskQueue,
    comment: &Comment,
) -> Result<DispatchSummary, AppError> {
    let mut tx = pool.begin().await?;
    let prepared = prepare_comment_dispatch(&mut *tx, comment).await?;
    tx.commit().await?;

    let summary = prepared.enqueue(pool, redis, queue).await;
    log_summary(comment, &summary);
    Ok(summary)
}

/// Write a comment's notifications and stage their deliveries on `conn`.
///
/// Nothing reaches the broker here, so the caller's transaction decides
/// whether any of it happened.
pub async fn prepare_comment_dispatch(
    conn: &mut PgConnection,
    comment: &Comment,
) -> Result<PreparedDispatch, AppError> {
    let (thread_title, author_email): (String, String) = sqlx::query_as(
        r#"
        SELECT t.title, u.email
        FROM threads t, users u
        WHERE t.id = $1 AND u.id = $2
        "#,
    )
    .bind(comment.thread_id)
    .bind(comment.user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Thread"))?;

    let subscribers: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT user_id
        FROM thread_subscriptions
        WHERE thread_id = $1 AND user_id <> $2
        ORDER BY id
        "#,
    )
    .bind(comment.thread_id)
    .bind(comment.user_id)
    .fetch_all(&mut *conn)
    .await?;

    if subscribers.is_empty() {
        return Ok(PreparedDispatch::default());
    }

    let prefs: Vec<NotificationPreference> =
        sqlx::query_as("SELECT * FROM notification_preferences WHERE user_id = ANY($1)")
            .bind(&subscribers)
            .fetch_all(&mut *conn)
            .await?;
    let preferences: HashMap<i64, ChannelSwitches> = prefs
        .iter()
        .map(|p| (p.user_id, ChannelSwitches::from(p)))
        .collect();

    let plan = plan_dispatch(
        comment.user_id,
        &author_email,
        &thread_title,
        &subscribers,
        &preferences,
    );

    if plan.notifications.is_empty() {
        return Ok(PreparedDispatch::default());
    }

    let recipients: Vec<i64> = plan.notifications.iter().map(|n| n.recipient_id).collect();
    let in_app: Vec<bool> = plan.notifications.iter().map(|n| n.channels.in_app).collect();

    let created: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        INSERT INTO notifications (recipient_id, comment_id, message, in_app_status, created_by)
        SELECT r.recipient_id, $3, $4, r.in_app, $5
        FROM UNNEST($1::BIGINT[], $2::BOOLEAN[]) AS r(recipient_id, in_app)
        RETURNING id, recipient_id
        "#,
    )
    .bind(&recipients)
    .bind(&in_app)
    .bind(comment.id)
    .bind(&plan.message)
    .bind(comment.user_id)
    .fetch_all(&mut *conn)
    .await?;

    let ids_by_recipient: HashMap<i64, i64> =
        created.into_iter().map(|(id, recipient)| (recipient, id)).collect();

    let mut prepared = PreparedDispatch {
        notifications: ids_by_recipient.len(),
        deliveries: Vec::new(),
    };
    for planned in &plan.notifications {
        let Some(&notification_id) = ids_by_recipient.get(&planned.recipient_id) else {
            continue;
        };
        let staged = stage_deliveries(
            conn,
            notification_id,
            &planned.channels,
            COMMENT_SUBJECT,
            &plan.message,
        )
        .await?;
        prepared.deliveries.extend(staged);
    }

    Ok(prepared)
}

/// Build the email / SMS tasks `channels` asks for and record each task's
/// id on the notification row.
pub async fn stage_deliveries(
    conn: &mut PgConnection,
    notification_id: i64,
    channels: &ChannelSwitches,
    subject: &str,
    message: &str,
) -> Result<Vec<StagedDelivery>, AppError> {
    let mut staged = Vec::new();

    if channels.email {
        staged.push(StagedDelivery {
            notification_id,
            channel: ChannelKind::Email,
            envelope: TaskEnvelope::new(Task::SendEmail {
                notification_id,
                subject: subject.to_string(),
                message: message.to_string(),
            }),
        });
    }
    if channels.sms {
        staged.push(StagedDelivery {
            notification_id,
            channel: ChannelKind::Sms,
            envelope: TaskEnvelope::new(Task::SendSms {
                notification_id,
                message: message.to_string(),
            }),
        });
    }

    for delivery in &staged {
        set_task_id(
            &mut *conn,
            delivery.channel,
            delivery.notification_id,
            Some(delivery.envelope.id.to_string()),
        )
        .await?;
    }

    Ok(staged)
}

/// Push staged deliveries to the broker.
///
/// A push failure is logged and clears that task id again; the
/// notification itself is committed and stays visible in-app.
pub async fn enqueue_staged(
    pool: &PgPool,
    redis: &mut ConnectionManager,
    queue: &TaskQueue,
    staged: Vec<StagedDelivery>,
) -> Vec<DeliveryTasks> {
    let mut by_notification: Vec<(i64, DeliveryTasks)> = Vec::new();

    for delivery in staged {
        let queued = match queue.push(redis, &delivery.envelope).await {
            Ok(()) => {
                tracing::debug!(
                    notification_id = delivery.notification_id,
                    task_id = %delivery.envelope.id,
                    task = delivery.envelope.task.name(),
                    "Delivery task queued"
                );
                Some(delivery.envelope.id)
            }
            Err(e) => {
                tracing::error!(
                    notification_id = delivery.notification_id,
                    task = delivery.envelope.task.name(),
                    error = %e,
                    "Failed to queue delivery task"
                );
                if let Err(e) =
                    set_task_id(pool, delivery.channel, delivery.notification_id, None).await
                {
                    tracing::error!(
                        notification_id = delivery.notification_id,
                        error = %e,
                        "Failed to clear task id"
                    );
                }
                None
            }
        };

        let index = match by_notification
            .iter()
            .position(|(id, _)| *id == delivery.notification_id)
        {
            Some(index) => index,
            None => {
                by_notification.push((delivery.notification_id, DeliveryTasks::default()));
                by_notification.len() - 1
            }
        };
        let tasks = &mut by_notification[index].1;
        match delivery.channel {
            ChannelKind::Email => tasks.email = queued,
            ChannelKind::Sms => tasks.sms = queued,
            ChannelKind::InApp => {}
        }
    }

    by_notification.into_iter().map(|(_, tasks)| tasks).collect()
}

async fn set_task_id<'e, E>(
    executor: E,
    channel: ChannelKind,
    notification_id: i64,
    task_id: Option<String>,
) -> Result<(), AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = match channel {
        ChannelKind::Email => "UPDATE notifications SET email_task_id = $1 WHERE id = $2",
        ChannelKind::Sms => "UPDATE notifications SET sms_task_id = $1 WHERE id = $2",
        ChannelKind::InApp => return Ok(()),
    };
    sqlx::query(sql)
        .bind(task_id)
        .bind(notification_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub fn log_summary(comment: &Comment, summary: &DispatchSummary) {
    tracing::info!(
        comment_id = comment.id,
        thread_id = comment.thread_id,
        notifications = summary.notifications,
        email_tasks = summary.email_tasks,
        sms_tasks = summary.sms_tasks,
        "Comment notifications dispatched"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switches(in_app: bool, email: bool, sms: bool) -> ChannelSwitches {
        ChannelSwitches { in_app, email, sms }
    }

    #[test]
    fn test_author_is_never_notified() {
        let prefs = HashMap::from([(1, switches(true, true, true)), (2, switches(true, false, false))]);
        let plan = plan_dispatch(1, "author@example.com", "Rust", &[1, 2], &prefs);
        assert_eq!(plan.notifications.len(), 1);
        assert_eq!(plan.notifications[0].recipient_id, 2);
    }

    #[test]
    fn test_subscribers_without_preferences_are_skipped() {
        let prefs = HashMap::from([(3, switches(false, true, false))]);
        let plan = plan_dispatch(1, "a@example.com", "T", &[2, 3, 4], &prefs);
        assert_eq!(
            plan.notifications,
            vec![PlannedNotification {
                recipient_id: 3,
                channels: switches(false, true, false),
            }]
        );
    }

    #[test]
    fn test_message_names_thread_and_author() {
        let plan = plan_dispatch(1, "jane@example.com", "Release notes", &[], &HashMap::new());
        assert_eq!(plan.message, "New comment on 'Release notes' by jane@example.com");
        assert!(plan.notifications.is_empty());
    }

    #[test]
    fn test_plan_preserves_subscriber_order() {
        let prefs = HashMap::from([
            (5, ChannelSwitches::default()),
            (3, ChannelSwitches::default()),
            (9, ChannelSwitches::default()),
        ]);
        let plan = plan_dispatch(1, "a@example.com", "T", &[9, 3, 5], &prefs);
        let order: Vec<i64> = plan.notifications.iter().map(|n| n.recipient_id).collect();
        assert_eq!(order, vec![9, 3, 5]);
    }

    #[test]
    fn test_default_switches_are_in_app_only() {
        assert_eq!(ChannelSwitches::default(), switches(true, false, false));
    }
}
