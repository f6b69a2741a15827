use tokio::sync::watch;

use smartnotify_common::config::AppConfig;
use smartnotify_common::tasks::TaskQueue;
use smartnotify_common::{db, redis_pool};
use smartnotify_notifier::handlers::TaskContext;
use smartnotify_notifier::retry::RetryPolicy;
use smartnotify_notifier::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .log_filter(&["smartnotify_notifier", "smartnotify_engine", "smartnotify_common"])
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("SmartNotify worker starting...");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    let client = redis_pool::open_client(&config.broker_url)?;

    let ctx = TaskContext::new(pool, TaskQueue::default());
    let worker = Worker::new(ctx, client, RetryPolicy::default(), config.worker_concurrency);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handle = tokio::spawn(worker.run(stop_rx));

    tokio::select! {
        joined = &mut handle => {
            joined??;
            tracing::info!("SmartNotify worker stopped.");
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, finishing in-flight tasks...");
        }
    }

    let _ = stop_tx.send(true);
    handle.await??;

    tracing::info!("SmartNotify worker stopped.");
    Ok(())
}
