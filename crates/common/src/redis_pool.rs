use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis client without connecting.
///
/// Blocking consumers (`BRPOP`) need a connection of their own, so the
/// worker keeps the client around and derives one manager per consumer.
pub fn open_client(redis_url: &str) -> anyhow::Result<Client> {
    Client::open(redis_url)
        .map_err(|e| anyhow::anyhow!("Invalid Redis URL: {}", e))
}

/// Create a shared Redis connection manager for non-blocking commands.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let manager = ConnectionManager::new(open_client(redis_url)?).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
