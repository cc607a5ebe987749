use async_trait::async_trait;
use std::sync::Arc;

use crate::models::product::ProductSnapshot;
use crate::scraping::marketplace::Marketplace;

/// Error type for marketplace fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("received empty response body")]
    EmptyBody,

    #[error("failed to extract product data: {0}")]
    Extract(String),

    #[error("giving up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// A successful fetch, with the number of attempts it took.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub snapshot: ProductSnapshot,
    pub attempts: u32,
}

/// A marketplace-specific capability that retrieves and parses one
/// product page. Implementations register into a [`FetcherRegistry`]
/// at startup.
#[async_trait]
pub trait MarketplaceFetcher: Send + Sync {
    /// Marketplace this fetcher serves; used for logging and dispatch
    /// diagnostics.
    fn marketplace(&self) -> Marketplace;

    /// Whether this fetcher understands the given URL.
    fn can_handle(&self, url: &str) -> bool;

    /// Retrieve and parse the product page. Transient failures are
    /// retried internally per the shared scraper configuration.
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError>;
}

/// Ordered fetcher dispatch table.
///
/// Registration order is precedence: when more than one fetcher
/// matches a URL the earliest-registered one is used, and the overlap
/// is logged so it does not pass silently.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: Vec<Arc<dyn MarketplaceFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fetcher: Arc<dyn MarketplaceFetcher>) {
        tracing::debug!(marketplace = %fetcher.marketplace(), "registered marketplace fetcher");
        self.fetchers.push(fetcher);
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// First registered fetcher whose `can_handle` matches the URL.
    pub fn find(&self, url: &str) -> Option<Arc<dyn MarketplaceFetcher>> {
        let mut matching = self.fetchers.iter().filter(|f| f.can_handle(url));
        let first = matching.next()?;

        if let Some(second) = matching.next() {
            tracing::warn!(
                url,
                used = %first.marketplace(),
                shadowed = %second.marketplace(),
                "multiple fetchers match URL, using the first registered"
            );
        }

        Some(Arc::clone(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFetcher {
        marketplace: Marketplace,
        pattern: &'static str,
    }

    #[async_trait]
    impl MarketplaceFetcher for StaticFetcher {
        fn marketplace(&self) -> Marketplace {
            self.marketplace
        }

        fn can_handle(&self, url: &str) -> bool {
            url.contains(self.pattern)
        }

        async fn fetch(&self, _url: &str) -> Result<Fetched, FetchError> {
            Err(FetchError::Extract("not implemented".into()))
        }
    }

    #[test]
    fn find_returns_first_registered_match() {
        let mut registry = FetcherRegistry::new();
        registry.register(Arc::new(StaticFetcher {
            marketplace: Marketplace::Digikala,
            pattern: "digikala.com",
        }));
        registry.register(Arc::new(StaticFetcher {
            marketplace: Marketplace::Other,
            pattern: ".com",
        }));

        let found = registry
            .find("https://www.digikala.com/product/dkp-1")
            .expect("should match");
        assert_eq!(found.marketplace(), Marketplace::Digikala);
    }

    #[test]
    fn find_returns_none_without_match() {
        let mut registry = FetcherRegistry::new();
        registry.register(Arc::new(StaticFetcher {
            marketplace: Marketplace::Digikala,
            pattern: "digikala.com",
        }));

        assert!(registry.find("https://example.org/p/1").is_none());
    }

    #[test]
    fn empty_registry() {
        let registry = FetcherRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.find("https://www.digikala.com").is_none());
    }
}
