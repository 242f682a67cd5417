use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardly::{
    api,
    config::Settings,
    notifications::{AuditNotifier, EmailNotifier, NotificationDispatcher},
    payments::{DisabledGateway, PaymentGateway, StripeGateway},
    repository::SqliteUserRepository,
    scheduler::Scheduler,
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardly=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Cardly billing on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Notification sinks
    let notifier = Arc::new(NotificationDispatcher::new());
    notifier.register(Arc::new(AuditNotifier)).await;

    let user_repo = Arc::new(SqliteUserRepository::new(db_pool.clone()));
    if let Some(email) = EmailNotifier::new(settings.notifications.email.clone(), user_repo)? {
        notifier.register(Arc::new(email)).await;
    }

    // Payment gateway
    let gateway: Arc<dyn PaymentGateway> = if settings.stripe.enabled {
        if let (Some(api_key), Some(webhook_secret)) =
            (settings.stripe.secret_key.clone(), settings.stripe.webhook_secret.clone()) {
            tracing::info!("Stripe payment processing enabled");
            Arc::new(StripeGateway::new(api_key, webhook_secret))
        } else {
            tracing::warn!("Stripe enabled but missing configuration");
            Arc::new(DisabledGateway)
        }
    } else {
        tracing::info!("Stripe payment processing disabled");
        Arc::new(DisabledGateway)
    };

    let service_context = Arc::new(ServiceContext::new(
        db_pool.clone(),
        gateway,
        notifier,
        &settings.billing,
    ));

    let scheduler = Scheduler::new(
        service_context.lifecycle.clone(),
        Duration::from_secs(settings.scheduler.interval_secs),
    );
    if settings.scheduler.enabled {
        scheduler.start();
    } else {
        tracing::info!("Scheduler disabled; run POST /admin/expired-check to sweep");
    }

    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    db_pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
