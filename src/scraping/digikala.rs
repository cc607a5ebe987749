//! Digikala product-page fetcher.
//!
//! Digikala pages move their markup around frequently, so every field
//! is extracted through a chain of fallback selectors rather than one
//! canonical path.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ScraperConfig;
use crate::models::product::ProductSnapshot;
use crate::scraping::client::FetchClient;
use crate::scraping::fetcher::{FetchError, Fetched, MarketplaceFetcher};
use crate::scraping::marketplace::Marketplace;
use crate::scraping::proxy::ProxyRotator;

/// Tokens whose presence anywhere in the page marks the product as
/// out of stock.
const UNAVAILABLE_MARKERS: &[&str] = &["ناموجود", "unavailable", "out-of-stock", "موجود نیست"];

pub struct DigikalaFetcher {
    client: FetchClient,
}

impl DigikalaFetcher {
    pub fn new(config: ScraperConfig, proxies: Arc<ProxyRotator>) -> Self {
        Self {
            client: FetchClient::new(config, proxies),
        }
    }
}

#[async_trait]
impl MarketplaceFetcher for DigikalaFetcher {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Digikala
    }

    fn can_handle(&self, url: &str) -> bool {
        !url.trim().is_empty() && url.to_lowercase().contains("digikala.com")
    }

    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let url_owned = url.to_string();
        self.client
            .fetch_page(url, move |html| parse_product_page(html, &url_owned))
            .await
    }
}

/// Extract a [`ProductSnapshot`] from a Digikala product page.
pub fn parse_product_page(html: &str, url: &str) -> Result<ProductSnapshot, FetchError> {
    let document = Html::parse_document(html);

    let title = extract_title(&document)
        .ok_or_else(|| FetchError::Extract("no product title found".into()))?;
    let price = extract_price(&document)
        .ok_or_else(|| FetchError::Extract("no product price found".into()))?;
    let image_url = extract_image_url(&document);
    let is_available = check_availability(html);
    let sku = extract_sku_from_url(url);

    let mut metadata = HashMap::new();
    metadata.insert("source".to_string(), "digikala".to_string());

    Ok(ProductSnapshot {
        title,
        price,
        is_available,
        image_url,
        sku,
        metadata,
    })
}

fn extract_title(document: &Html) -> Option<String> {
    let heading_selectors = ["h1.text-h4", "h1"];
    for sel in heading_selectors {
        let selector = Selector::parse(sel).expect("valid selector");
        if let Some(node) = document.select(&selector).next() {
            let text: String = node.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    // Meta and <title> fallbacks.
    let og_title = Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector");
    if let Some(node) = document.select(&og_title).next() {
        if let Some(content) = node.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }

    let title_tag = Selector::parse("title").expect("valid selector");
    document
        .select(&title_tag)
        .next()
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_price(document: &Html) -> Option<f64> {
    let price_selectors = [
        r#"div[class*="price-section"] span[class*="text-h5"]"#,
        r#"div[class*="price"] span[class*="price-value"]"#,
        r#"span[data-testid*="price-final"]"#,
        r#"span[class*="price-now"]"#,
    ];

    for sel in price_selectors {
        let selector = Selector::parse(sel).expect("valid selector");
        for node in document.select(&selector) {
            let raw: String = node.text().collect();
            if let Some(price) = normalize_price(&raw) {
                return Some(price);
            }
        }
    }

    None
}

/// Strip separators and Persian currency words, then parse.
fn normalize_price(raw: &str) -> Option<f64> {
    let cleaned = raw
        .replace(',', "")
        .replace("تومان", "")
        .replace("ریال", "")
        .replace(char::is_whitespace, "");

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|p| *p > 0.0)
}

fn extract_image_url(document: &Html) -> Option<String> {
    let image_selectors = [r#"img[class*="product-image"]"#, r#"img[alt*="تصویر"]"#];

    for sel in image_selectors {
        let selector = Selector::parse(sel).expect("valid selector");
        if let Some(node) = document.select(&selector).next() {
            if let Some(src) = node.value().attr("src") {
                let src = src.trim();
                if !src.is_empty() {
                    return Some(src.to_string());
                }
            }
        }
    }

    let og_image = Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector");
    document
        .select(&og_image)
        .next()
        .and_then(|node| node.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn check_availability(html: &str) -> bool {
    let lower = html.to_lowercase();
    !UNAVAILABLE_MARKERS.iter().any(|marker| lower.contains(&marker.to_lowercase()))
}

/// Digikala URLs carry product IDs like `dkp-123456`.
fn extract_sku_from_url(url: &str) -> Option<String> {
    let dkp = regex::Regex::new(r"(?i)dkp-(\d+)").expect("valid regex");
    if let Some(caps) = dkp.captures(url) {
        return Some(caps[1].to_string());
    }

    // Fallback: any path segment that is a bare number.
    let numeric = regex::Regex::new(r"/(\d+)/?").expect("valid regex");
    numeric.captures(url).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = r#"
    <html>
      <head>
        <meta property="og:title" content="Meta Title" />
        <meta property="og:image" content="https://cdn.example.com/meta.jpg" />
        <title>Tab Title</title>
      </head>
      <body>
        <h1 class="text-h4 font-bold">گوشی موبایل سامسونگ</h1>
        <div class="price-section">
          <span class="text-h5">12,500,000 تومان</span>
        </div>
        <img class="product-image main" src="https://cdn.example.com/p.jpg" />
      </body>
    </html>
    "#;

    #[test]
    fn parses_full_product_page() {
        let snapshot =
            parse_product_page(SAMPLE_PAGE, "https://www.digikala.com/product/dkp-654321/x")
                .expect("should parse");

        assert_eq!(snapshot.title, "گوشی موبایل سامسونگ");
        assert_eq!(snapshot.price, 12_500_000.0);
        assert!(snapshot.is_available);
        assert_eq!(snapshot.image_url.as_deref(), Some("https://cdn.example.com/p.jpg"));
        assert_eq!(snapshot.sku.as_deref(), Some("654321"));
        assert_eq!(snapshot.metadata.get("source").map(String::as_str), Some("digikala"));
    }

    #[test]
    fn falls_back_to_meta_title() {
        let html = r#"<html><head><meta property="og:title" content="Meta Only" /></head>
            <body><div class="price-section"><span class="text-h5">900</span></div></body></html>"#;
        let snapshot = parse_product_page(html, "https://www.digikala.com/product/dkp-1/x")
            .expect("should parse");
        assert_eq!(snapshot.title, "Meta Only");
    }

    #[test]
    fn missing_price_is_extract_error() {
        let html = "<html><body><h1>Product</h1></body></html>";
        let err = parse_product_page(html, "https://www.digikala.com/product/dkp-1/x")
            .expect_err("no price");
        assert!(matches!(err, FetchError::Extract(_)));
    }

    #[test]
    fn unavailable_marker_clears_availability() {
        let html = r#"<html><body>
            <h1>Product</h1>
            <div class="price-section"><span class="text-h5">100</span></div>
            <span>ناموجود</span>
        </body></html>"#;
        let snapshot = parse_product_page(html, "https://www.digikala.com/product/dkp-1/x")
            .expect("should parse");
        assert!(!snapshot.is_available);
    }

    #[test]
    fn price_normalization() {
        assert_eq!(normalize_price("12,500 تومان"), Some(12_500.0));
        assert_eq!(normalize_price(" 990000 ریال "), Some(990_000.0));
        assert_eq!(normalize_price("تومان"), None);
        assert_eq!(normalize_price(""), None);
    }

    #[test]
    fn sku_extraction() {
        assert_eq!(
            extract_sku_from_url("https://www.digikala.com/product/dkp-123456/x").as_deref(),
            Some("123456")
        );
        assert_eq!(
            extract_sku_from_url("https://www.digikala.com/product/DKP-42/").as_deref(),
            Some("42")
        );
        assert_eq!(
            extract_sku_from_url("https://www.digikala.com/p/98765/").as_deref(),
            Some("98765")
        );
        assert_eq!(extract_sku_from_url("https://www.digikala.com/about"), None);
    }
}
