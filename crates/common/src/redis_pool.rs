use anyhow::Context;
use redis::Client;
use redis::aio::ConnectionManager;

/// Connect the multiplexed Redis handle shared by every queue consumer.
///
/// Fails fast with a `PING` so a wrong URL surfaces at startup rather than on
/// the first fetch.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url).context("parsing REDIS_URL")?;
    let mut manager = ConnectionManager::new(client)
        .await
        .context("connecting to Redis")?;

    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    tracing::info!(reply = %pong, "Connected to Redis");
    Ok(manager)
}
