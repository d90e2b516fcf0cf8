mod api;
mod config;
mod error;
mod ingest;
mod normalizer;
mod notify;
mod queue;
mod store;
mod types;

use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::error::Result;
use crate::ingest::IngestPipeline;
use crate::notify::prefs::{PrefsCache, SqlitePreferencesSource};
use crate::notify::rules::Channel;
use crate::notify::transport::{AlertTransport, Dispatcher, LogTransport, WebhookTransport};
use crate::notify::Notifier;
use crate::queue::scheduler::Scheduler;
use crate::queue::worker::{HttpProbeAdapter, SourceAdapter, Worker};
use crate::queue::JobQueue;
use crate::store::Store;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let store = Store::new(pool);
    let queue = JobQueue::new(store.pool().clone());
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Channels ---
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

    // --- Ingest pipeline, shared by all workers ---
    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        event_tx,
        Arc::clone(&latency),
    ));

    // --- Spawn tasks ---

    // Preference cache refresher (first tick fires immediately)
    let prefs = Arc::new(PrefsCache::new(Arc::new(SqlitePreferencesSource::new(
        store.pool().clone(),
    ))));
    tokio::spawn(Arc::clone(&prefs).run_refresher());

    // Notifier: consumes mutation events, fans out to transports
    let mut transports: Vec<Arc<dyn AlertTransport>> = vec![
        Arc::new(LogTransport::new(Channel::Email)),
        Arc::new(LogTransport::new(Channel::Push)),
        Arc::new(LogTransport::new(Channel::Sms)),
    ];
    match &cfg.webhook_url {
        Some(url) => transports.push(Arc::new(WebhookTransport::new(url.clone())?)),
        None => warn!("WEBHOOK_URL not set — webhook channel disabled for all users"),
    }
    let notifier = Notifier::new(
        event_rx,
        Arc::clone(&prefs),
        Dispatcher::new(transports),
        Arc::clone(&health),
    );
    tokio::spawn(async move { notifier.run().await });

    // Scheduler: enqueues scrape jobs for configured targets
    let scheduler = Scheduler::new(cfg.clone(), queue.clone());
    tokio::spawn(async move { scheduler.run().await });

    // Queue workers: claim → fetch via adapter → ingest → complete
    let adapter: Arc<dyn SourceAdapter> = Arc::new(HttpProbeAdapter::new()?);
    for i in 0..cfg.worker_count {
        let worker = Worker::new(
            format!("worker-{i}"),
            queue.clone(),
            Arc::clone(&pipeline),
            Arc::clone(&adapter),
            Arc::clone(&health),
        );
        tokio::spawn(async move { worker.run().await });
    }
    info!("Spawned {} queue workers", cfg.worker_count);

    // --- HTTP API server ---
    let api_state = ApiState { store, queue, latency, health };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
