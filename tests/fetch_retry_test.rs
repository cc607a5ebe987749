//! FetchClient retry behavior against a local HTTP endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pricewatch::config::ScraperConfig;
use pricewatch::scraping::client::FetchClient;
use pricewatch::scraping::fetcher::FetchError;
use pricewatch::scraping::proxy::ProxyRotator;

/// Minimal HTTP responder: 500s for the first `failures` requests,
/// then a small HTML page. Returns the base URL and the hit counter.
async fn serve(failures: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };

            let hit = counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let response = if hit < failures {
                "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    .to_string()
            } else {
                let body = "<html><body>priced</body></html>";
                format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
            };

            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/product"), hits)
}

fn client(max_retries: u32) -> FetchClient {
    let config = ScraperConfig {
        max_retries,
        timeout_seconds: 5,
        ..ScraperConfig::default()
    };
    FetchClient::new(config, Arc::new(ProxyRotator::new(Vec::new(), 3)))
}

#[tokio::test]
async fn two_failures_then_success_spends_three_attempts() {
    let (url, hits) = serve(2).await;

    let fetched = client(3)
        .fetch_page(&url, |html| {
            assert!(html.contains("priced"));
            Ok(support_snapshot())
        })
        .await
        .expect("third attempt should succeed");

    assert_eq!(fetched.attempts, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_carry_the_last_error() {
    let (url, hits) = serve(usize::MAX).await;

    let err = client(2)
        .fetch_page(&url, |_html| Ok(support_snapshot()))
        .await
        .expect_err("server never recovers");

    match err {
        FetchError::Exhausted { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("500"), "got: {last_error}");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

fn support_snapshot() -> pricewatch::models::product::ProductSnapshot {
    pricewatch::models::product::ProductSnapshot {
        title: "Fetched".to_string(),
        price: 10.0,
        is_available: true,
        image_url: None,
        sku: None,
        metadata: std::collections::HashMap::new(),
    }
}
