//! Orchestrator concurrency bounds and dispatch behavior.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pricewatch::scraping::fetcher::{FetcherRegistry, MarketplaceFetcher};
use pricewatch::scraping::orchestrator::Orchestrator;

use support::{test_scraper_config, FailingFetcher, PricedFetcher, TrackingFetcher};

fn orchestrator_with(
    fetchers: Vec<Arc<dyn MarketplaceFetcher>>,
    concurrency: usize,
) -> Orchestrator {
    let mut registry = FetcherRegistry::new();
    for fetcher in fetchers {
        registry.register(fetcher);
    }
    Orchestrator::new(registry, &test_scraper_config(concurrency))
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limiter() {
    let tracker = Arc::new(TrackingFetcher::new(Duration::from_millis(50)));
    let orchestrator =
        orchestrator_with(vec![tracker.clone() as Arc<dyn MarketplaceFetcher>], 2);

    let urls: Vec<String> = (0..5).map(|i| format!("https://any.test/p/{i}")).collect();
    let results = orchestrator.scrape_many(&urls).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.success));

    let high_water = tracker.high_water.load(Ordering::SeqCst);
    assert!(high_water <= 2, "observed {high_water} concurrent fetches");
    assert!(high_water >= 1);
}

#[tokio::test]
async fn unmatched_url_fails_without_retries() {
    let priced = Arc::new(PricedFetcher::new("shop.test", 9.0));
    let orchestrator = orchestrator_with(vec![priced.clone() as Arc<dyn MarketplaceFetcher>], 2);

    let outcome = orchestrator.scrape_one("https://elsewhere.example/p/1").await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 0);
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("no fetcher available"));
    assert_eq!(priced.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_scrape_reports_partial_failure() {
    let orchestrator = orchestrator_with(
        vec![
            Arc::new(PricedFetcher::new("good.test", 5.0)) as Arc<dyn MarketplaceFetcher>,
            Arc::new(FailingFetcher::new("bad.test")) as Arc<dyn MarketplaceFetcher>,
        ],
        4,
    );

    let urls = vec![
        "https://good.test/p/1".to_string(),
        "https://bad.test/p/2".to_string(),
        "https://good.test/p/3".to_string(),
    ];
    let results = orchestrator.scrape_many(&urls).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);

    let failed = results.iter().find(|r| !r.success).expect("one failure");
    assert_eq!(failed.url, "https://bad.test/p/2");
    assert_eq!(failed.attempts, 3, "failure carries the exhausted attempt count");
}

#[tokio::test]
async fn successful_outcome_carries_snapshot_and_attempts() {
    let orchestrator = orchestrator_with(
        vec![Arc::new(PricedFetcher::new("shop.test", 42.5)) as Arc<dyn MarketplaceFetcher>],
        2,
    );

    let outcome = orchestrator.scrape_one("https://shop.test/p/1").await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 1);
    let snapshot = outcome.snapshot.expect("snapshot present");
    assert_eq!(snapshot.price, 42.5);
}
