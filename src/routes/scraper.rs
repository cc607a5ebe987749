use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::{BatchScrapeRequest, ErrorBody, ScrapeUrlRequest, ValidateUrlResponse};
use crate::scraping::marketplace::{is_valid_url, Marketplace};
use crate::scraping::orchestrator::ScrapeOutcome;

type ApiError = (StatusCode, Json<ErrorBody>);

/// POST /api/v1/scraper/test — scrape a single URL immediately.
pub async fn test_scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeUrlRequest>,
) -> Result<Json<ScrapeOutcome>, ApiError> {
    if let Err(report) = request.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorBody::new(report.to_string()))));
    }

    if !is_valid_url(&request.url) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Invalid URL format")),
        ));
    }

    tracing::info!(url = %request.url, "testing scraper");

    let outcome = state.orchestrator.scrape_one(&request.url).await;
    Ok(Json(outcome))
}

/// POST /api/v1/scraper/batch — scrape several URLs concurrently.
pub async fn batch_scrape(
    State(state): State<AppState>,
    Json(request): Json<BatchScrapeRequest>,
) -> Result<Json<crate::models::api::BatchScrapeResponse>, ApiError> {
    if let Err(report) = request.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorBody::new(report.to_string()))));
    }

    let results = state.orchestrator.scrape_many(&request.urls).await;
    let successful = results.iter().filter(|r| r.success).count();

    Ok(Json(crate::models::api::BatchScrapeResponse {
        total: results.len(),
        successful,
        failed: results.len() - successful,
        results,
    }))
}

/// POST /api/v1/scraper/validate — syntax check plus marketplace
/// detection; never touches the network.
pub async fn validate_url(Json(request): Json<ScrapeUrlRequest>) -> Json<ValidateUrlResponse> {
    let valid = is_valid_url(&request.url);
    let marketplace = Marketplace::detect(&request.url);

    Json(ValidateUrlResponse {
        valid,
        marketplace: marketplace.to_string(),
        message: if valid {
            "URL is valid".to_string()
        } else {
            "URL format is invalid".to_string()
        },
    })
}
