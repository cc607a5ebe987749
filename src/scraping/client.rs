use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::ScraperConfig;
use crate::models::product::ProductSnapshot;
use crate::scraping::fetcher::{FetchError, Fetched};
use crate::scraping::proxy::ProxyRotator;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; PricewatchBot/1.0)";

/// HTTP retrieval shared by every fetcher: retry with exponential
/// backoff, a fresh proxy identity and a randomly chosen User-Agent
/// per attempt, so consecutive attempts do not share a fingerprint.
pub struct FetchClient {
    config: ScraperConfig,
    proxies: Arc<ProxyRotator>,
}

impl FetchClient {
    pub fn new(config: ScraperConfig, proxies: Arc<ProxyRotator>) -> Self {
        Self { config, proxies }
    }

    /// Fetch `url` and run `parse` over the body, retrying the whole
    /// attempt (fetch + parse) up to the configured budget with
    /// `2^attempt`-second backoff. The returned [`Fetched`] carries
    /// how many attempts were spent.
    pub async fn fetch_page<F>(&self, url: &str, parse: F) -> Result<Fetched, FetchError>
    where
        F: Fn(&str) -> Result<ProductSnapshot, FetchError>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let proxy = self.proxies.next();

            tracing::debug!(url, attempt, max_attempts, proxy = ?proxy, "fetching product page");

            match self.attempt(url, proxy.as_deref(), &parse).await {
                Ok(snapshot) => {
                    if let Some(p) = &proxy {
                        self.proxies.record_success(p);
                    }
                    return Ok(Fetched { snapshot, attempts: attempt });
                }
                Err(err) => {
                    if let Some(p) = &proxy {
                        self.proxies.record_failure(p);
                    }

                    tracing::warn!(url, attempt, max_attempts, error = %err, "fetch attempt failed");
                    last_error = err.to_string();

                    if attempt < max_attempts {
                        let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                        sleep(backoff).await;
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn attempt<F>(
        &self,
        url: &str,
        proxy: Option<&str>,
        parse: &F,
    ) -> Result<ProductSnapshot, FetchError>
    where
        F: Fn(&str) -> Result<ProductSnapshot, FetchError>,
    {
        let client = self.build_client(proxy)?;

        let response = client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(
                reqwest::header::ACCEPT_LANGUAGE,
                "fa-IR,fa;q=0.9,en-US;q=0.8,en;q=0.7",
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let html = response.text().await?;
        if html.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        parse(&html)
    }

    fn build_client(&self, proxy: Option<&str>) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.pick_user_agent())
            .timeout(Duration::from_secs(self.config.timeout_seconds));

        if let Some(proxy_url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(builder.build()?)
    }

    fn pick_user_agent(&self) -> String {
        if self.config.user_agents.is_empty() {
            return DEFAULT_USER_AGENT.to_string();
        }
        let index = fastrand::usize(..self.config.user_agents.len());
        self.config.user_agents[index].clone()
    }
}
