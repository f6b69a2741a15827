use tokio::sync::watch;

use smartnotify_common::config::AppConfig;
use smartnotify_common::redis_pool;
use smartnotify_common::tasks::TaskQueue;
use smartnotify_notifier::schedule::run_beat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .log_filter(&["smartnotify_notifier", "smartnotify_common"])
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("SmartNotify beat starting...");

    let redis = redis_pool::create_redis_pool(&config.broker_url).await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handle = tokio::spawn(run_beat(redis, TaskQueue::default(), stop_rx));

    tokio::select! {
        joined = &mut handle => {
            joined??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
            let _ = stop_tx.send(true);
            handle.await??;
        }
    }

    tracing::info!("SmartNotify beat stopped.");
    Ok(())
}
