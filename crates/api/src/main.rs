use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expressr_api::config::ServerConfig;
use expressr_api::router::build_app_router;
use expressr_api::state::{AppState, WebhookSecrets};
use expressr_worker::wiring::{build_services, spawn_notifications};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expressr_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = expressr_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    expressr_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    expressr_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let event_bus = Arc::new(expressr_events::EventBus::default());
    let services = build_services(pool.clone(), Arc::clone(&event_bus), &config.public_app_url);
    let notifications = spawn_notifications(
        &event_bus,
        services.mailer.clone(),
        &config.public_app_url,
        services.stripe_config.price_cents,
    );
    if services.replicate_config.webhook_secret.is_none() {
        tracing::warn!("REPLICATE_WEBHOOK_SECRET not set, training webhooks are not verified");
    }

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: services.orchestrator,
        faces: services.replicate,
        webhooks: Arc::new(WebhookSecrets {
            payment: services.stripe_config.webhook_secret,
            training: services.replicate_config.webhook_secret,
        }),
    };

    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, cleaning up");

    drop(event_bus);
    if let Some(handle) = notifications {
        let _ = tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), handle).await;
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
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
