use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Structured product data extracted from one successful fetch.
/// Not persisted directly; the executor maps it into a
/// [`Product`] / [`PricePoint`] pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub title: String,
    pub price: f64,
    pub is_available: bool,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A product tracked in the system, keyed uniquely by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub current_price: f64,
    pub is_available: bool,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One entry in a product's append-only price series. Written only
/// when the observed price differs from the latest recorded one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

/// A price-change fact produced for external consumers (delivery is
/// someone else's concern). `old_price` is `None` for a product seen
/// for the first time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub product_id: Uuid,
    pub product_name: String,
    pub url: String,
    pub old_price: Option<f64>,
    pub new_price: f64,
    pub observed_at: DateTime<Utc>,
}
