use serde::{Deserialize, Serialize};

/// Marketplace a URL belongs to, resolved by domain match against a
/// fixed table. URLs outside the table get `Other`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Marketplace {
    Digikala,
    Torob,
    Snapfood,
    Emalls,
    Other,
}

impl Marketplace {
    /// Pure substring match; usable for UI validation without any
    /// scraping machinery.
    pub fn detect(url: &str) -> Self {
        if url.trim().is_empty() {
            return Marketplace::Other;
        }

        let lower = url.to_lowercase();

        if lower.contains("digikala.com") {
            Marketplace::Digikala
        } else if lower.contains("torob.com") {
            Marketplace::Torob
        } else if lower.contains("snappfood.ir") || lower.contains("snapfood.ir") {
            Marketplace::Snapfood
        } else if lower.contains("emalls.ir") {
            Marketplace::Emalls
        } else {
            Marketplace::Other
        }
    }
}

/// Syntactic URL check only: absolute, http or https. No network call.
pub fn is_valid_url(raw: &str) -> bool {
    if raw.trim().is_empty() {
        return false;
    }

    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
