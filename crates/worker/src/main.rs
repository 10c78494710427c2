use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use deadman_db::{PgStore, Store};
use deadman_events::{ChannelNotifier, Dispatcher, EmailConfig, EmailDelivery, WebhookDelivery};
use deadman_worker::{KeyedLocks, SweepScheduler, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deadman_worker=debug,deadman_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;

    let pool = deadman_db::create_pool(&config.database_url)
        .await
        .context("failed to connect to database")?;
    deadman_db::health_check(&pool)
        .await
        .context("database health check failed")?;
    deadman_db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("Database ready");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let email = EmailConfig::from_env().map(EmailDelivery::new);
    if email.is_none() {
        tracing::warn!("SMTP_HOST not set, email channels will fail delivery");
    }
    let notifier = Arc::new(ChannelNotifier::new(WebhookDelivery::new(), email));

    let cancel = CancellationToken::new();
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        notifier,
        config.delivery_timeout,
        cancel.child_token(),
    ));

    dispatcher
        .resolve_stale(config.pending_notification_ttl, Utc::now())
        .await
        .context("failed to resolve stale notifications")?;

    let sweeper = SweepScheduler::new(
        store,
        dispatcher,
        Arc::new(KeyedLocks::new()),
        config.sweep_interval,
        config.sweep_concurrency,
    );
    let sweep_handle = tokio::spawn(sweeper.run(cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = sweep_handle.await {
        tracing::error!(error = %e, "Sweep task panicked");
    }
    tracing::info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
