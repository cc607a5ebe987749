//! Shared test doubles and fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use pricewatch::config::ScraperConfig;
use pricewatch::jobs::executor::JobExecutor;
use pricewatch::jobs::scheduler::JobScheduler;
use pricewatch::models::product::{PriceChange, ProductSnapshot};
use pricewatch::scraping::fetcher::{FetchError, Fetched, FetcherRegistry, MarketplaceFetcher};
use pricewatch::scraping::marketplace::Marketplace;
use pricewatch::scraping::orchestrator::Orchestrator;
use pricewatch::store::{JobStore, MemoryStore, ProductStore, QueueStore};

pub fn snapshot(title: &str, price: f64) -> ProductSnapshot {
    ProductSnapshot {
        title: title.to_string(),
        price,
        is_available: true,
        image_url: None,
        sku: None,
        metadata: HashMap::new(),
    }
}

/// Fetcher that serves a configurable price for any URL matching its
/// pattern, counting how many fetches it performed.
pub struct PricedFetcher {
    pattern: &'static str,
    price: Mutex<f64>,
    pub calls: AtomicUsize,
}

impl PricedFetcher {
    pub fn new(pattern: &'static str, price: f64) -> Self {
        Self {
            pattern,
            price: Mutex::new(price),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }
}

#[async_trait]
impl MarketplaceFetcher for PricedFetcher {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Other
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains(self.pattern)
    }

    async fn fetch(&self, _url: &str) -> Result<Fetched, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let price = *self.price.lock().unwrap();
        Ok(Fetched {
            snapshot: snapshot("Test Product", price),
            attempts: 1,
        })
    }
}

/// Fetcher that always fails with an exhausted-retries error.
pub struct FailingFetcher {
    pattern: &'static str,
}

impl FailingFetcher {
    pub fn new(pattern: &'static str) -> Self {
        Self { pattern }
    }
}

#[async_trait]
impl MarketplaceFetcher for FailingFetcher {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Other
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains(self.pattern)
    }

    async fn fetch(&self, _url: &str) -> Result<Fetched, FetchError> {
        Err(FetchError::Exhausted {
            attempts: 3,
            last_error: "connection reset".to_string(),
        })
    }
}

/// Fetcher that records the concurrent-call high-water mark.
pub struct TrackingFetcher {
    current: AtomicUsize,
    pub high_water: AtomicUsize,
    delay: Duration,
}

impl TrackingFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl MarketplaceFetcher for TrackingFetcher {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Other
    }

    fn can_handle(&self, _url: &str) -> bool {
        true
    }

    async fn fetch(&self, _url: &str) -> Result<Fetched, FetchError> {
        let active = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Fetched {
            snapshot: snapshot("Tracked Product", 1.0),
            attempts: 1,
        })
    }
}

/// Everything an executor test needs, wired over one shared
/// [`MemoryStore`].
pub struct Harness {
    pub store: MemoryStore,
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn QueueStore>,
    pub products: Arc<dyn ProductStore>,
    pub scheduler: Arc<JobScheduler>,
    pub executor: Arc<JobExecutor>,
    pub orchestrator: Arc<Orchestrator>,
    pub price_events: broadcast::Receiver<PriceChange>,
}

pub fn test_scraper_config(concurrency: usize) -> ScraperConfig {
    ScraperConfig {
        max_concurrent_requests: concurrency,
        request_delay_ms: 0,
        ..ScraperConfig::default()
    }
}

pub fn harness_with(fetchers: Vec<Arc<dyn MarketplaceFetcher>>) -> Harness {
    let store = MemoryStore::new();
    let jobs: Arc<dyn JobStore> = Arc::new(store.clone());
    let queue: Arc<dyn QueueStore> = Arc::new(store.clone());
    let products: Arc<dyn ProductStore> = Arc::new(store.clone());

    let mut registry = FetcherRegistry::new();
    for fetcher in fetchers {
        registry.register(fetcher);
    }

    let orchestrator = Arc::new(Orchestrator::new(registry, &test_scraper_config(5)));
    let scheduler = Arc::new(JobScheduler::new(jobs.clone()));

    let (tx, rx) = broadcast::channel(64);
    let executor = Arc::new(JobExecutor::new(
        jobs.clone(),
        queue.clone(),
        products.clone(),
        Arc::clone(&orchestrator),
        tx,
        100,
    ));

    Harness {
        store,
        jobs,
        queue,
        products,
        scheduler,
        executor,
        orchestrator,
        price_events: rx,
    }
}
