use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use shared::domain::{DraftSubmission, DreamId, Price, ReferralCode, Report};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

const REFERRAL_CODE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone)]
pub struct DreamRecord {
    pub id: DreamId,
    pub draft: DraftSubmission,
    pub teaser: String,
    pub referral_code: ReferralCode,
    /// Id of the dream whose share code was used on submission.
    pub referred_by: Option<DreamId>,
    pub referral_count: u32,
    pub status: PaymentStatus,
    pub report: Option<Report>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl DreamRecord {
    pub fn discount_applied(&self) -> bool {
        self.referred_by.is_some()
    }

    pub fn price(&self) -> Price {
        if self.discount_applied() {
            Price::BASE.halved()
        } else {
            Price::BASE
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Dream not found")]
    DreamNotFound,
    #[error("No such checkout session: {0}")]
    UnknownSession(String),
}

/// Outcome of confirming a checkout session.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub record: DreamRecord,
    /// `false` when the dream was already paid before this call.
    pub newly_paid: bool,
    /// Referrer whose count this call incremented.
    pub credited_referrer: Option<DreamId>,
}

#[derive(Default)]
struct StoreInner {
    dreams: HashMap<DreamId, DreamRecord>,
    by_referral_code: HashMap<ReferralCode, DreamId>,
    checkout_sessions: HashMap<String, DreamId>,
}

impl StoreInner {
    fn fresh_referral_code(&self) -> ReferralCode {
        loop {
            let mut code = Uuid::new_v4().simple().to_string();
            code.truncate(REFERRAL_CODE_LEN);
            let code = ReferralCode::new(code);
            if !self.by_referral_code.contains_key(&code) {
                return code;
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct DreamStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl DreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn find_by_referral_code(&self, code: &ReferralCode) -> Option<DreamRecord> {
        let inner = self.inner.read().await;
        inner
            .by_referral_code
            .get(code)
            .and_then(|id| inner.dreams.get(id))
            .cloned()
    }

    pub async fn get(&self, id: &DreamId) -> Option<DreamRecord> {
        self.inner.read().await.dreams.get(id).cloned()
    }

    /// Stores a new pending dream. An inbound code that belongs to an existing
    /// dream links the two and discounts the new one; unknown codes are ignored.
    pub async fn create_dream(&self, draft: DraftSubmission, teaser: String) -> DreamRecord {
        let mut inner = self.inner.write().await;
        let referred_by = draft
            .referral_code
            .as_ref()
            .and_then(|code| inner.by_referral_code.get(code))
            .cloned();
        let record = DreamRecord {
            id: DreamId::new(Uuid::new_v4().to_string()),
            draft,
            teaser,
            referral_code: inner.fresh_referral_code(),
            referred_by,
            referral_count: 0,
            status: PaymentStatus::Pending,
            report: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        inner
            .by_referral_code
            .insert(record.referral_code.clone(), record.id.clone());
        inner.dreams.insert(record.id.clone(), record.clone());
        record
    }

    pub async fn open_checkout(&self, dream_id: &DreamId) -> Result<(String, Price), StoreError> {
        let mut inner = self.inner.write().await;
        let price = inner
            .dreams
            .get(dream_id)
            .map(DreamRecord::price)
            .ok_or(StoreError::DreamNotFound)?;
        let session_id = format!("cs_dev_{}", Uuid::new_v4().simple());
        inner
            .checkout_sessions
            .insert(session_id.clone(), dream_id.clone());
        Ok((session_id, price))
    }

    /// Marks the dream paid and credits its referrer once. Repeated calls
    /// return the stored record untouched.
    pub async fn settle_checkout(
        &self,
        session_id: &str,
        dream_id: &DreamId,
        write_report: impl FnOnce(&DreamRecord) -> Report,
    ) -> Result<Settlement, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.checkout_sessions.get(session_id) != Some(dream_id) {
            return Err(StoreError::UnknownSession(session_id.to_string()));
        }

        let record = inner
            .dreams
            .get_mut(dream_id)
            .ok_or(StoreError::DreamNotFound)?;
        if record.is_paid() && record.report.is_some() {
            return Ok(Settlement {
                record: record.clone(),
                newly_paid: false,
                credited_referrer: None,
            });
        }

        let report = write_report(record);
        record.status = PaymentStatus::Paid;
        record.paid_at = Some(Utc::now());
        record.report = Some(report);
        let settled = record.clone();

        let credited_referrer = match settled
            .referred_by
            .as_ref()
            .and_then(|id| inner.dreams.get_mut(id))
        {
            Some(referrer) => {
                referrer.referral_count += 1;
                Some(referrer.id.clone())
            }
            None => None,
        };

        Ok(Settlement {
            record: settled,
            newly_paid: true,
            credited_referrer,
        })
    }

    pub async fn paid_report(&self, dream_id: &DreamId) -> Option<(DreamRecord, Report)> {
        let inner = self.inner.read().await;
        let record = inner.dreams.get(dream_id).filter(|r| r.is_paid())?;
        let report = record.report.clone()?;
        Some((record.clone(), report))
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
