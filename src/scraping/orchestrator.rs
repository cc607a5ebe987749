use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::config::ScraperConfig;
use crate::models::product::ProductSnapshot;
use crate::scraping::fetcher::{FetchError, FetcherRegistry};
use crate::scraping::marketplace::Marketplace;

/// Result of scraping one URL. Partial failure across a batch is
/// normal; callers inspect `success` per outcome.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScrapeOutcome {
    pub url: String,
    pub success: bool,
    pub snapshot: Option<ProductSnapshot>,
    pub error: Option<String>,
    pub marketplace: Marketplace,
    pub duration: Duration,
    pub attempts: u32,
}

/// Bounds scrape concurrency, selects the matching fetcher per URL
/// and applies the inter-request politeness delay.
///
/// The semaphore is sized once from configuration and shared by every
/// caller in the process, so many due jobs cannot fan out more
/// concurrent requests than configured.
pub struct Orchestrator {
    registry: FetcherRegistry,
    limiter: Arc<Semaphore>,
    request_delay: Duration,
}

impl Orchestrator {
    pub fn new(registry: FetcherRegistry, config: &ScraperConfig) -> Self {
        Self {
            registry,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Scrape a single product URL under the global concurrency bound.
    ///
    /// The politeness delay runs after the permit is released: it
    /// paces this caller's next request, not concurrent ones. A URL
    /// no fetcher understands fails immediately, with no retries and
    /// no delay, since neither could change the outcome.
    pub async fn scrape_one(&self, url: &str) -> ScrapeOutcome {
        let marketplace = Marketplace::detect(url);

        let permit = self
            .limiter
            .acquire()
            .await
            .expect("scrape limiter closed");
        let start = Instant::now();

        let Some(fetcher) = self.registry.find(url) else {
            drop(permit);
            tracing::warn!(url, "no fetcher available for URL");
            return ScrapeOutcome {
                url: url.to_string(),
                success: false,
                snapshot: None,
                error: Some("no fetcher available for this URL".to_string()),
                marketplace,
                duration: start.elapsed(),
                attempts: 0,
            };
        };

        tracing::info!(url, %marketplace, "starting scrape");

        let outcome = match fetcher.fetch(url).await {
            Ok(fetched) => {
                let duration = start.elapsed();
                tracing::info!(url, duration_ms = duration.as_millis() as u64, "scrape succeeded");
                ScrapeOutcome {
                    url: url.to_string(),
                    success: true,
                    snapshot: Some(fetched.snapshot),
                    error: None,
                    marketplace,
                    duration,
                    attempts: fetched.attempts,
                }
            }
            Err(err) => {
                let duration = start.elapsed();
                let attempts = match &err {
                    FetchError::Exhausted { attempts, .. } => *attempts,
                    _ => 1,
                };
                tracing::warn!(url, error = %err, "scrape failed");
                ScrapeOutcome {
                    url: url.to_string(),
                    success: false,
                    snapshot: None,
                    error: Some(err.to_string()),
                    marketplace,
                    duration,
                    attempts,
                }
            }
        };

        metrics::histogram!("pricewatch_scrape_duration_seconds")
            .record(outcome.duration.as_secs_f64());

        drop(permit);
        sleep(self.request_delay).await;

        outcome
    }

    /// Scrape every URL concurrently (bounded by the shared limiter)
    /// and wait for all of them; no short-circuit on failure.
    pub async fn scrape_many(&self, urls: &[String]) -> Vec<ScrapeOutcome> {
        tracing::info!(count = urls.len(), "starting batch scrape");

        let results =
            futures::future::join_all(urls.iter().map(|url| self.scrape_one(url))).await;

        let successful = results.iter().filter(|r| r.success).count();
        tracing::info!(successful, total = results.len(), "batch scrape finished");

        results
    }
}
