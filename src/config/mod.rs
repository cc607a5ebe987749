use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum concurrent outbound scrape requests (process-wide)
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Politeness delay between requests from one caller, in ms
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Per-fetch HTTP timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Maximum fetch attempts per URL (first try included)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// User-Agent pool, comma-separated; a random one is picked per attempt
    #[serde(default)]
    pub user_agents: Vec<String>,

    /// Proxy pool, comma-separated URLs (e.g., "http://host:port")
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Consecutive failures before a proxy is quarantined
    #[serde(default = "default_proxy_failure_threshold")]
    pub proxy_failure_threshold: u32,

    /// How often the background driver checks for due jobs, in seconds
    #[serde(default = "default_driver_interval_secs")]
    pub driver_interval_secs: u64,

    /// Delay before the driver starts dispatching after boot, in seconds
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,

    /// Number of worker tasks executing due jobs
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Queue items drained per job execution
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_concurrent_requests() -> usize {
    5
}

fn default_request_delay_ms() -> u64 {
    2000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_proxy_failure_threshold() -> u32 {
    3
}

fn default_driver_interval_secs() -> u64 {
    60
}

fn default_startup_grace_secs() -> u64 {
    10
}

fn default_worker_count() -> usize {
    4
}

fn default_batch_size() -> usize {
    100
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn scraper(&self) -> ScraperConfig {
        ScraperConfig {
            max_concurrent_requests: self.max_concurrent_requests,
            request_delay_ms: self.request_delay_ms,
            timeout_seconds: self.timeout_seconds,
            max_retries: self.max_retries,
            user_agents: self.user_agents.clone(),
            proxies: self.proxies.clone(),
            proxy_failure_threshold: self.proxy_failure_threshold,
        }
    }
}

/// Tuning shared by the orchestrator and every fetcher.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub max_concurrent_requests: usize,
    pub request_delay_ms: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    pub proxy_failure_threshold: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            request_delay_ms: default_request_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            user_agents: Vec::new(),
            proxies: Vec::new(),
            proxy_failure_threshold: default_proxy_failure_threshold(),
        }
    }
}
