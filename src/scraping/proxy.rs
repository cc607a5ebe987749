use std::sync::Mutex;

/// Outcome counters for one proxy in the pool.
#[derive(Debug)]
struct ProxyEntry {
    url: String,
    successes: u64,
    failures: u64,
    consecutive_failures: u32,
}

struct RotatorState {
    entries: Vec<ProxyEntry>,
    cursor: usize,
}

/// Round-robin proxy pool with per-proxy health scoring.
///
/// A proxy is quarantined (skipped by `next`) once its consecutive
/// failure count reaches the threshold; a single recorded success
/// rehabilitates it. If every proxy ends up quarantined the rotator
/// clears all marks and resumes round-robin, since a fully dead pool
/// would otherwise halt scraping with no way back.
pub struct ProxyRotator {
    state: Mutex<RotatorState>,
    failure_threshold: u32,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<String>, failure_threshold: u32) -> Self {
        let entries = proxies
            .into_iter()
            .map(|url| ProxyEntry {
                url,
                successes: 0,
                failures: 0,
                consecutive_failures: 0,
            })
            .collect();

        Self {
            state: Mutex::new(RotatorState { entries, cursor: 0 }),
            failure_threshold,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().expect("proxy rotator lock poisoned").entries.is_empty()
    }

    /// Next healthy proxy URL in round-robin order, or `None` when no
    /// proxies are configured.
    pub fn next(&self) -> Option<String> {
        let mut state = self.state.lock().expect("proxy rotator lock poisoned");
        if state.entries.is_empty() {
            return None;
        }

        let len = state.entries.len();
        for _ in 0..len {
            let cursor = state.cursor;
            state.cursor = (cursor + 1) % len;

            let entry = &state.entries[cursor];
            if entry.consecutive_failures < self.failure_threshold {
                return Some(entry.url.clone());
            }
        }

        // Whole pool is quarantined: wipe the marks and start over.
        tracing::warn!(proxies = len, "all proxies quarantined, resetting health marks");
        for entry in &mut state.entries {
            entry.consecutive_failures = 0;
        }
        let cursor = state.cursor;
        state.cursor = (cursor + 1) % len;
        Some(state.entries[cursor].url.clone())
    }

    pub fn record_success(&self, proxy: &str) {
        let mut state = self.state.lock().expect("proxy rotator lock poisoned");
        if let Some(entry) = state.entries.iter_mut().find(|e| e.url == proxy) {
            entry.successes += 1;
            entry.consecutive_failures = 0;
        }
    }

    pub fn record_failure(&self, proxy: &str) {
        let mut state = self.state.lock().expect("proxy rotator lock poisoned");
        if let Some(entry) = state.entries.iter_mut().find(|e| e.url == proxy) {
            entry.failures += 1;
            entry.consecutive_failures += 1;
            if entry.consecutive_failures == self.failure_threshold {
                tracing::warn!(proxy = %entry.url, failures = entry.failures, "proxy quarantined");
            }
        }
    }
}
