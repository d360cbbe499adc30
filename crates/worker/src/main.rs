use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expressr_worker::wiring::{build_services, public_app_url, spawn_notifications};
use expressr_worker::{TaskRunner, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expressr_worker=debug,expressr_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    let app_url = public_app_url();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = expressr_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    expressr_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    expressr_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Pipeline ---
    let event_bus = Arc::new(expressr_events::EventBus::default());
    let services = build_services(pool, Arc::clone(&event_bus), &app_url);
    let notifications = spawn_notifications(
        &event_bus,
        services.mailer.clone(),
        &app_url,
        services.stripe_config.price_cents,
    );

    let runner = TaskRunner::new(services.orchestrator, services.queue, config);
    let cancel = CancellationToken::new();
    let runner_cancel = cancel.clone();
    let runner_handle = tokio::spawn(async move {
        runner.run(runner_cancel).await;
    });

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping task runner");

    cancel.cancel();
    let _ = runner_handle.await;

    // Closing the bus ends the notification loop once queued emails are sent.
    drop(event_bus);
    if let Some(handle) = notifications {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }
    tracing::info!("Worker stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
