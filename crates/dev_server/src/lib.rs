//! Local stand-in for the DreamDecode backend. Serves the five client routes
//! from memory so the session flow can run without payment or AI providers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::{current_hebrew_year, DraftSubmission, DreamId, ReferralCode},
    error::ErrorDetail,
    protocol::{
        CheckoutRequest, CheckoutResponse, HealthResponse, ReferralInfoResponse, TeaserResponse,
        VerifyPaymentRequest, VerifyPaymentResponse, PAYMENT_STATUS_PAID,
    },
};
use tracing::{info, warn};
use url::Url;

pub mod config;
pub mod content;
pub mod store;

use store::{DreamStore, StoreError};

type ApiError = (StatusCode, Json<ErrorDetail>);

#[derive(Clone)]
pub struct AppState {
    pub store: DreamStore,
    /// Checkout return URLs are built on this origin.
    pub frontend_url: Url,
}

impl AppState {
    pub fn new(frontend_url: Url) -> Self {
        Self {
            store: DreamStore::new(),
            frontend_url,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/referral/:code", get(referral_info))
        .route("/api/analyze-teaser", post(analyze_teaser))
        .route("/api/create-checkout-session", post(create_checkout_session))
        .route("/api/verify-payment", post(verify_payment))
        .route("/api/download-pdf/:dream_id", get(download_report))
        .with_state(state)
}

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(ErrorDetail::new(detail)))
}

impl From<StoreError> for (StatusCode, Json<ErrorDetail>) {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::DreamNotFound => StatusCode::NOT_FOUND,
            StoreError::UnknownSession(_) => StatusCode::BAD_REQUEST,
        };
        api_error(status, err.to_string())
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        hebrew_year: current_hebrew_year(),
    })
}

async fn referral_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ReferralInfoResponse>, ApiError> {
    let referrer = state
        .store
        .find_by_referral_code(&ReferralCode::new(code))
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Blessing code not found"))?;

    Ok(Json(ReferralInfoResponse {
        message: content::referral_message(&referrer.draft.name),
        referrer_dream_preview: Some(content::teaser_preview(&referrer.teaser)),
        discount_active: Some(true),
        discount_percent: Some(50),
        referrer_name: referrer.draft.name,
    }))
}

async fn analyze_teaser(
    State(state): State<AppState>,
    Json(draft): Json<DraftSubmission>,
) -> Result<Json<TeaserResponse>, ApiError> {
    draft
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let teaser = content::teaser_for(&draft);
    let record = state.store.create_dream(draft, teaser).await;
    info!(
        dream_id = %record.id,
        discount = record.discount_applied(),
        "teaser generated"
    );

    Ok(Json(TeaserResponse {
        price: record.price(),
        discount_applied: record.discount_applied(),
        hebrew_year: Some(current_hebrew_year()),
        dream_id: record.id,
        referral_code: record.referral_code,
        teaser: record.teaser,
    }))
}

fn reveal_url(frontend_url: &Url, session_id: &str, dream_id: &DreamId) -> Url {
    let mut url = frontend_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("reveal");
    }
    url.query_pairs_mut()
        .append_pair("session_id", session_id)
        .append_pair("dream_id", dream_id.as_str());
    url
}

/// Payment always succeeds here: the returned URL is the post-payment return link.
async fn create_checkout_session(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let (session_id, price) = state.store.open_checkout(&req.dream_id).await?;
    info!(dream_id = %req.dream_id, %session_id, %price, "checkout session opened");

    Ok(Json(CheckoutResponse {
        url: reveal_url(&state.frontend_url, &session_id, &req.dream_id).to_string(),
        amount: Some(price),
    }))
}

async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let settlement = state
        .store
        .settle_checkout(&req.session_id, &req.dream_id, |record| {
            content::full_report(&record.draft)
        })
        .await
        .map_err(|err| {
            warn!(session_id = %req.session_id, %err, "payment verification rejected");
            err
        })?;

    let message = if settlement.newly_paid {
        info!(
            dream_id = %req.dream_id,
            "payment settled; report email not sent by the dev server"
        );
        if let Some(referrer) = &settlement.credited_referrer {
            info!(
                dream_id = %req.dream_id,
                %referrer,
                "referrer credited; notification email not sent by the dev server"
            );
        }
        "Your revelation is ready"
    } else {
        "Report already generated"
    };
    let record = settlement.record;

    Ok(Json(VerifyPaymentResponse {
        status: PAYMENT_STATUS_PAID.to_string(),
        report: record.report,
        message: Some(message.to_string()),
        referral_code: Some(record.referral_code),
        name: Some(record.draft.name),
    }))
}

async fn download_report(
    State(state): State<AppState>,
    Path(dream_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let dream_id = DreamId::new(dream_id);
    let (record, report) = state
        .store
        .paid_report(&dream_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Report not found"))?;

    let body = content::render_report(&record.draft.name, current_hebrew_year(), &report);
    let disposition = format!("attachment; filename=dream-revelation-{dream_id}.txt");
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
