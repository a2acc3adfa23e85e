//! HTTP/JSON port to the DreamDecode backend.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{DraftSubmission, DreamId, ReferralCode},
    error::ErrorDetail,
    protocol::{
        CheckoutRequest, CheckoutResponse, ReferralInfoResponse, TeaserResponse,
        VerifyPaymentRequest, VerifyPaymentResponse,
    },
};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub const REFERRAL_ENDPOINT: &str = "referral";
pub const ANALYZE_TEASER_ENDPOINT: &str = "analyze-teaser";
pub const CHECKOUT_ENDPOINT: &str = "create-checkout-session";
pub const VERIFY_PAYMENT_ENDPOINT: &str = "verify-payment";
pub const DOWNLOAD_PDF_ENDPOINT: &str = "download-pdf";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("{endpoint}: request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint}: backend returned {status}: {detail}")]
    Status {
        endpoint: &'static str,
        status: u16,
        detail: String,
    },
    #[error("{endpoint}: unreadable response body: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Status { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }

    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            BackendError::InvalidBaseUrl { .. } => None,
            BackendError::Transport { endpoint, .. }
            | BackendError::Status { endpoint, .. }
            | BackendError::Decode { endpoint, .. } => Some(endpoint),
        }
    }
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn referral_info(&self, code: &ReferralCode)
        -> Result<ReferralInfoResponse, BackendError>;
    async fn analyze_teaser(&self, draft: &DraftSubmission)
        -> Result<TeaserResponse, BackendError>;
    async fn create_checkout_session(
        &self,
        dream_id: &DreamId,
    ) -> Result<CheckoutResponse, BackendError>;
    async fn verify_payment(
        &self,
        session_id: &str,
        dream_id: &DreamId,
    ) -> Result<VerifyPaymentResponse, BackendError>;
    /// Location of the PDF report. It is opened by the host, never fetched inline.
    fn pdf_url(&self, dream_id: &DreamId) -> Url;
}

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, BackendError> {
        let raw = base_url.trim();
        let parsed = Url::parse(raw).map_err(|err| BackendError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::InvalidBaseUrl {
                url: raw.to_string(),
                reason: "expected an http(s) url".to_string(),
            });
        }
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorDetail>(&body) {
            Ok(parsed) => parsed.detail,
            Err(_) if body.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => body,
        };
        return Err(BackendError::Status {
            endpoint,
            status: status.as_u16(),
            detail,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|source| BackendError::Decode { endpoint, source })
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn referral_info(
        &self,
        code: &ReferralCode,
    ) -> Result<ReferralInfoResponse, BackendError> {
        let url = self.endpoint(&[REFERRAL_ENDPOINT, code.as_str()]);
        debug!(%url, "fetching referral info");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: REFERRAL_ENDPOINT,
                source,
            })?;
        read_json(REFERRAL_ENDPOINT, response).await
    }

    async fn analyze_teaser(
        &self,
        draft: &DraftSubmission,
    ) -> Result<TeaserResponse, BackendError> {
        let url = self.endpoint(&[ANALYZE_TEASER_ENDPOINT]);
        debug!(%url, "requesting teaser analysis");
        let response = self
            .http
            .post(url)
            .json(draft)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: ANALYZE_TEASER_ENDPOINT,
                source,
            })?;
        read_json(ANALYZE_TEASER_ENDPOINT, response).await
    }

    async fn create_checkout_session(
        &self,
        dream_id: &DreamId,
    ) -> Result<CheckoutResponse, BackendError> {
        let url = self.endpoint(&[CHECKOUT_ENDPOINT]);
        debug!(%url, %dream_id, "creating checkout session");
        let response = self
            .http
            .post(url)
            .json(&CheckoutRequest {
                dream_id: dream_id.clone(),
            })
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: CHECKOUT_ENDPOINT,
                source,
            })?;
        read_json(CHECKOUT_ENDPOINT, response).await
    }

    async fn verify_payment(
        &self,
        session_id: &str,
        dream_id: &DreamId,
    ) -> Result<VerifyPaymentResponse, BackendError> {
        let url = self.endpoint(&[VERIFY_PAYMENT_ENDPOINT]);
        debug!(%url, %dream_id, "verifying payment");
        let response = self
            .http
            .post(url)
            .json(&VerifyPaymentRequest {
                session_id: session_id.to_string(),
                dream_id: dream_id.clone(),
            })
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: VERIFY_PAYMENT_ENDPOINT,
                source,
            })?;
        read_json(VERIFY_PAYMENT_ENDPOINT, response).await
    }

    fn pdf_url(&self, dream_id: &DreamId) -> Url {
        self.endpoint(&[DOWNLOAD_PDF_ENDPOINT, dream_id.as_str()])
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
