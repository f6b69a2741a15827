//! Weekly unread-notification digest.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use smartnotify_common::error::AppError;

/// How far back the digest looks.
pub const SUMMARY_WINDOW_DAYS: i64 = 7;

pub fn summary_message(unread: i64) -> String {
    format!("You have {} unread notifications from this week.", unread)
}

/// Create one in-app digest notification per user with unread
/// notifications created in the week before `now`. Returns how many
/// digests were created.
pub async fn run_weekly_summary(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, AppError> {
    let since = now - Duration::days(SUMMARY_WINDOW_DAYS);

    let counts: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT recipient_id, COUNT(*)
        FROM notifications
        WHERE is_read = false AND created_at >= $1 AND created_at <= $2
        GROUP BY recipient_id
        ORDER BY recipient_id
        "#,
    )
    .bind(since)
    .bind(now)
    .fetch_all(pool)
    .await?;

    if counts.is_empty() {
        tracing::info!("No unread notifications this week");
        return Ok(0);
    }

    let recipients: Vec<i64> = counts.iter().map(|(user, _)| *user).collect();
    let messages: Vec<String> = counts.iter().map(|(_, n)| summary_message(*n)).collect();

    let created = sqlx::query(
        r#"
        INSERT INTO notifications (recipient_id, message, in_app_status)
        SELECT r.recipient_id, r.message, true
        FROM UNNEST($1::BIGINT[], $2::TEXT[]) AS r(recipient_id, message)
        "#,
    )
    .bind(&recipients)
    .bind(&messages)
    .execute(pool)
    .await?
    .rows_affected();

    tracing::info!(users = created, "Weekly summaries created");
    Ok(created)
}
