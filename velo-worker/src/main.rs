use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velo_booking::{BookingService, FarePolicy, LifecycleDispatcher, MockPaymentAdapter};
use velo_core::payment::PaymentAdapter;
use velo_core::repository::BookingStore;
use velo_store::app_config::Config;
use velo_store::{DbClient, EventProducer, LogEmailSink, PgBookingStore, PgNotificationSink, StripeAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velo_worker=debug,velo_booking=debug,velo_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    info!("Starting Velo booking worker");

    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let store: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(db.pool.clone()));

    let adapter: Arc<dyn PaymentAdapter> = match &config.payment.stripe {
        Some(stripe) => Arc::new(StripeAdapter::new(stripe, config.payment.reference_prefix.clone())),
        None => {
            warn!("No Stripe credentials configured, using the mock payment processor");
            Arc::new(MockPaymentAdapter::with_prefix(config.payment.reference_prefix.clone()))
        }
    };

    let mut dispatcher = LifecycleDispatcher::new(
        Arc::new(PgNotificationSink::new(db.pool.clone())),
        Arc::new(LogEmailSink),
    );
    if let Some(kafka) = &config.kafka {
        let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
        dispatcher = dispatcher.with_publisher(Arc::new(producer));
        info!("Publishing lifecycle events to Kafka at {}", kafka.brokers);
    }
    let (emitter, dispatcher_handle) = dispatcher.spawn();

    let fares = FarePolicy::new(
        config.payment.currency.clone(),
        config.business_rules.platform_fee_rate,
        config.business_rules.tax_component_rate,
    );
    let service = BookingService::new(store, adapter, emitter, fares);

    service
        .sweeper()
        .run_periodic(Duration::from_secs(config.sweeper.interval_seconds), shutdown_signal())
        .await;

    // Last emitter goes with the service; the dispatcher drains its queue and exits.
    drop(service);
    dispatcher_handle.await.context("Lifecycle dispatcher panicked")?;

    info!("Velo booking worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
