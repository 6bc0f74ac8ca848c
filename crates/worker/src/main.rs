use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_common::{db, redis_pool};
use herald_notifier::{OrderStatusMessage, TwilioConfig, TwilioSender};
use herald_queue::RedisBroker;
use herald_worker::{
    ConsumerGroup, PgNotificationRepository, PgRecipientRepository, Pipeline, PipelineSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_worker=info,herald_engine=info,herald_queue=info,herald_notifier=info"
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("Herald worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config).await?;

    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    let sms = TwilioSender::new(
        TwilioConfig::from_app_config(&config),
        Arc::new(OrderStatusMessage),
    )?;

    let settings = PipelineSettings::from_config(&config);
    let pipeline = Pipeline::build(
        &settings,
        Arc::new(RedisBroker::new(redis)),
        Arc::new(sms),
        Arc::new(PgNotificationRepository::new(pool.clone())),
        Arc::new(PgRecipientRepository::new(pool)),
    );

    tracing::info!(
        incoming = %settings.incoming_queue,
        retry = %settings.retry_queue,
        persistence = %settings.persistence_queue,
        "Starting consumers"
    );
    let group = ConsumerGroup::spawn(pipeline.into_consumers());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, draining in-flight messages...");
    group.shutdown_and_join().await;

    tracing::info!("Herald worker stopped.");
    Ok(())
}
