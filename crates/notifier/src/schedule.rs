//! Periodic scheduling (the "beat" process).
//!
//! There is one job: `send-weekly-summary`, every Sunday at 08:00 in
//! Asia/Kathmandu. Nepal has no daylight saving, so a fixed +05:45 offset
//! is exact.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use redis::aio::ConnectionManager;
use tokio::sync::watch;

use smartnotify_common::tasks::{Task, TaskQueue};

pub const WEEKLY_SUMMARY_JOB: &str = "send-weekly-summary";

/// Asia/Kathmandu offset from UTC.
pub const KATHMANDU_OFFSET_SECS: i64 = 5 * 3600 + 45 * 60;

const FIRE_HOUR: i64 = 8;

/// The first Sunday 08:00 Kathmandu time strictly after `now`.
pub fn next_weekly_run(now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = Duration::seconds(KATHMANDU_OFFSET_SECS);
    let local = now.naive_utc() + offset;

    let since_midnight = Duration::seconds(i64::from(local.num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(local.nanosecond()));
    let midnight: NaiveDateTime = local - since_midnight;

    let days_ahead = i64::from((7 - local.weekday().num_days_from_sunday()) % 7);
    let mut fire = midnight + Duration::days(days_ahead) + Duration::hours(FIRE_HOUR);
    if fire <= local {
        fire += Duration::days(7);
    }

    Utc.from_utc_datetime(&(fire - offset))
}

/// Enqueue the weekly summary at every fire time until `shutdown` flips.
pub async fn run_beat(
    mut redis: ConnectionManager,
    queue: TaskQueue,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        let now = Utc::now();
        let next = next_weekly_run(now);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(
            job = WEEKLY_SUMMARY_JOB,
            next_run = %next,
            wait_secs = wait.as_secs(),
            "Next scheduled run"
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                tracing::info!("Beat stopping");
                return Ok(());
            }
        }

        match queue.enqueue(&mut redis, Task::WeeklySummary).await {
            Ok(task_id) => {
                tracing::info!(job = WEEKLY_SUMMARY_JOB, task_id = %task_id, "Scheduled task sent")
            }
            Err(e) => {
                tracing::error!(job = WEEKLY_SUMMARY_JOB, error = %e, "Failed to send scheduled task")
            }
        }
    }
}
