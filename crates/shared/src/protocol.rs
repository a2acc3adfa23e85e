use serde::{Deserialize, Serialize};

use crate::domain::{DreamId, GiftInfo, Price, ReferralCode, Report};

pub const PAYMENT_STATUS_PAID: &str = "paid";

/// `GET /api/referral/{code}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralInfoResponse {
    pub referrer_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_dream_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<u8>,
}

impl ReferralInfoResponse {
    pub fn gift_info(&self) -> GiftInfo {
        GiftInfo {
            referrer_name: self.referrer_name.clone(),
            message: self.message.clone(),
        }
    }
}

/// `POST /api/analyze-teaser`; the request body is the draft submission itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeaserResponse {
    pub dream_id: DreamId,
    pub referral_code: ReferralCode,
    pub teaser: String,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hebrew_year: Option<i32>,
    #[serde(default)]
    pub discount_applied: bool,
}

/// `POST /api/create-checkout-session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub dream_id: DreamId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Price>,
}

/// `POST /api/verify-payment`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub session_id: String,
    pub dream_id: DreamId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Share code of the paid dream, when the backend echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<ReferralCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl VerifyPaymentResponse {
    pub fn unpaid() -> Self {
        Self {
            status: "unpaid".to_string(),
            report: None,
            message: None,
            referral_code: None,
            name: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == PAYMENT_STATUS_PAID
    }
}

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub hebrew_year: i32,
}
