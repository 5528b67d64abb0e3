use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    AppointmentState, AppointmentStore, DirectoryEntry, InMemoryAppointmentStore, InMemoryProviderDirectory,
    ProviderDirectory, SupabaseAppointmentStore, SupabaseProviderDirectory, SystemClock,
};
use notification_queue_cell::{
    HttpMailTransport, InMemoryNotificationInbox, InMemoryNotificationQueue, LogMailTransport, MailTransport,
    NotificationAdminState, NotificationInbox, NotificationInboxState, NotificationProducerService,
    NotificationQueue, NotificationSink, NotificationWorkerService, RedisNotificationQueue,
    SupabaseNotificationInbox, WorkerConfig,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting appointment API server");

    let config = Arc::new(AppConfig::from_env());

    let (store, directory, inbox) = build_persistence(&config).await?;
    let queue = build_queue(&config).await?;

    let worker_defaults = WorkerConfig::default();
    // A job waiting out its longest retry delay must not look abandoned.
    let longest_retry_ms = config
        .notification_retry_delay_ms
        .saturating_mul(u64::from(config.notification_max_attempts));
    let worker = Arc::new(
        NotificationWorkerService::new(
            WorkerConfig {
                worker_id: format!("notifier-{}", std::process::id()),
                pool_size: config.notification_workers,
                retry_delay_ms: config.notification_retry_delay_ms,
                stale_after_ms: worker_defaults.stale_after_ms.max(longest_retry_ms.saturating_mul(2)),
                ..worker_defaults
            },
            Arc::clone(&queue),
            build_transport(&config),
        )
        .with_inbox(Arc::clone(&inbox)),
    );
    let worker_handles = worker.start();

    let producer: Arc<dyn NotificationSink> = Arc::new(NotificationProducerService::new(
        Arc::clone(&queue),
        config.notification_max_attempts,
    ));

    let appointments = AppointmentState::new(config.clone(), store, directory, producer, Arc::new(SystemClock));
    let notifications = NotificationAdminState {
        config: config.clone(),
        queue,
    };
    let inbox = NotificationInboxState {
        config: config.clone(),
        inbox,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(appointments, notifications, inbox)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.shutdown().await;
    for handle in worker_handles {
        if let Err(e) = handle.await {
            warn!("Notification worker ended abnormally: {}", e);
        }
    }

    info!("Server stopped");
    Ok(())
}

type Persistence = (
    Arc<dyn AppointmentStore>,
    Arc<dyn ProviderDirectory>,
    Arc<dyn NotificationInbox>,
);

async fn build_persistence(config: &AppConfig) -> anyhow::Result<Persistence> {
    if config.is_configured() {
        info!("Using Supabase at {}", config.supabase_url);
        let supabase = Arc::new(SupabaseClient::new(config));
        let store: Arc<dyn AppointmentStore> = Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase)));
        let directory: Arc<dyn ProviderDirectory> =
            Arc::new(SupabaseProviderDirectory::new(Arc::clone(&supabase)));
        let inbox: Arc<dyn NotificationInbox> = Arc::new(SupabaseNotificationInbox::new(supabase));
        return Ok((store, directory, inbox));
    }

    warn!("Supabase not configured, appointments, directory and inbox are kept in memory");

    let entries: Vec<DirectoryEntry> = match config.directory_seed_file.as_deref() {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read directory seed file {}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid directory seed file {}", path))?
        }
        None => Vec::new(),
    };
    info!("In-memory directory loaded with {} entries", entries.len());

    let store: Arc<dyn AppointmentStore> = Arc::new(InMemoryAppointmentStore::new());
    let directory: Arc<dyn ProviderDirectory> = Arc::new(InMemoryProviderDirectory::with_entries(entries));
    let inbox: Arc<dyn NotificationInbox> = Arc::new(InMemoryNotificationInbox::new());
    Ok((store, directory, inbox))
}

async fn build_queue(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationQueue>> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let queue = RedisNotificationQueue::new(url)
                .await
                .context("Failed to connect notification queue to Redis")?;
            Ok(Arc::new(queue))
        }
        None => Ok(Arc::new(InMemoryNotificationQueue::new(config.notification_queue_capacity))),
    }
}

fn build_transport(config: &AppConfig) -> Arc<dyn MailTransport> {
    match HttpMailTransport::from_config(config) {
        Some(transport) => Arc::new(transport),
        None => Arc::new(LogMailTransport),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
