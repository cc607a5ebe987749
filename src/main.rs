use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pricewatch::app_state::AppState;
use pricewatch::config::AppConfig;
use pricewatch::jobs::driver::{BackgroundDriver, DriverConfig};
use pricewatch::jobs::executor::JobExecutor;
use pricewatch::jobs::scheduler::JobScheduler;
use pricewatch::routes;
use pricewatch::scraping::digikala::DigikalaFetcher;
use pricewatch::scraping::fetcher::FetcherRegistry;
use pricewatch::scraping::orchestrator::Orchestrator;
use pricewatch::scraping::proxy::ProxyRotator;
use pricewatch::store::{JobStore, PostgresStore, ProductStore, QueueStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing pricewatch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "pricewatch_jobs_executed_total",
        "Total job executions finished"
    );
    metrics::describe_counter!(
        "pricewatch_items_completed_total",
        "Queue items scraped and persisted successfully"
    );
    metrics::describe_counter!(
        "pricewatch_items_failed_total",
        "Queue items that failed scraping"
    );
    metrics::describe_counter!(
        "pricewatch_price_changes_total",
        "Price changes recorded in product history"
    );
    metrics::describe_gauge!(
        "pricewatch_queue_depth",
        "Current number of pending queue items"
    );
    metrics::describe_histogram!(
        "pricewatch_scrape_duration_seconds",
        "Time spent scraping one URL"
    );

    // Initialize database connection pool and run migrations
    tracing::info!("Connecting to PostgreSQL database");
    let store = PostgresStore::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    store.migrate().await.expect("Failed to run database migrations");

    let store = Arc::new(store);
    let jobs: Arc<dyn JobStore> = store.clone();
    let queue: Arc<dyn QueueStore> = store.clone();
    let products: Arc<dyn ProductStore> = store.clone();

    // Build the scraping stack: proxy pool, fetcher registry,
    // orchestrator with the process-wide concurrency limiter.
    let scraper_config = config.scraper();
    let proxies = Arc::new(ProxyRotator::new(
        scraper_config.proxies.clone(),
        scraper_config.proxy_failure_threshold,
    ));

    let mut registry = FetcherRegistry::new();
    registry.register(Arc::new(DigikalaFetcher::new(
        scraper_config.clone(),
        Arc::clone(&proxies),
    )));

    let orchestrator = Arc::new(Orchestrator::new(registry, &scraper_config));

    // Price-change facts for external consumers; receivers may attach
    // at any time.
    let (price_events, _) = broadcast::channel(256);

    let scheduler = Arc::new(JobScheduler::new(jobs.clone()));
    let executor = Arc::new(JobExecutor::new(
        jobs.clone(),
        queue.clone(),
        products.clone(),
        Arc::clone(&orchestrator),
        price_events,
        config.batch_size,
    ));

    let shutdown = CancellationToken::new();

    // Background driver runs in-process alongside the API.
    let driver = BackgroundDriver::new(
        jobs.clone(),
        queue.clone(),
        Arc::clone(&scheduler),
        Arc::clone(&executor),
        DriverConfig {
            interval: Duration::from_secs(config.driver_interval_secs),
            startup_grace: Duration::from_secs(config.startup_grace_secs),
            worker_count: config.worker_count,
        },
        shutdown.clone(),
    );
    let driver_handle = tokio::spawn(driver.run());

    // Create shared application state
    let state = AppState::new(
        jobs,
        queue,
        scheduler,
        executor,
        orchestrator,
        shutdown.clone(),
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/jobs", post(routes::jobs::create_job))
        .route("/api/v1/jobs", get(routes::jobs::list_jobs))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job))
        .route("/api/v1/jobs/{job_id}", delete(routes::jobs::delete_job))
        .route("/api/v1/jobs/{job_id}/execute", post(routes::jobs::trigger_job))
        .route("/api/v1/jobs/{job_id}/active", patch(routes::jobs::set_active))
        .route("/api/v1/scraper/test", post(routes::scraper::test_scrape))
        .route("/api/v1/scraper/batch", post(routes::scraper::batch_scrape))
        .route("/api/v1/scraper/validate", post(routes::scraper::validate_url))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting pricewatch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");

    // The driver stops scheduling once cancelled; wait for its
    // workers to drain rather than aborting in-flight executions.
    let _ = driver_handle.await;
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, stopping scheduler");
    shutdown.cancel();
}
