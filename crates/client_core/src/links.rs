//! Entry-URL parsing for gift and post-payment deep links, and share-link derivation.

use std::borrow::Cow;

use shared::domain::{DreamId, ReferralCode};
use url::{form_urlencoded, Url};

pub const GIFT_PATH: &str = "/gift";

/// Parameters recognised on the page the session starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryParams {
    pub referral_code: Option<ReferralCode>,
    pub payment_return: Option<PaymentReturn>,
}

/// Present when the visitor lands back from the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReturn {
    pub session_id: String,
    pub dream_id: DreamId,
}

impl EntryParams {
    pub fn parse(raw_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(&Url::parse(raw_url.trim())?))
    }

    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(form_urlencoded::parse(
            query.trim_start_matches('?').as_bytes(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.referral_code.is_none() && self.payment_return.is_none()
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        // First occurrence wins; an empty value counts as absent.
        let mut code: Option<String> = None;
        let mut session_id: Option<String> = None;
        let mut dream_id: Option<String> = None;

        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut code,
                "session_id" => &mut session_id,
                "dream_id" => &mut dream_id,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let payment_return = match (non_empty(session_id), non_empty(dream_id)) {
            (Some(session_id), Some(dream_id)) => Some(PaymentReturn {
                session_id,
                dream_id: DreamId(dream_id),
            }),
            _ => None,
        };

        Self {
            referral_code: non_empty(code).map(ReferralCode),
            payment_return,
        }
    }
}

/// `<origin>/gift?code=<code>&from=<name>`, both values form-urlencoded.
pub fn share_link(origin: &Url, referral_code: &ReferralCode, name: &str) -> Url {
    let mut link = origin.clone();
    link.set_path(GIFT_PATH);
    link.set_query(None);
    link.set_fragment(None);
    link.query_pairs_mut()
        .append_pair("code", referral_code.as_str())
        .append_pair("from", name.trim());
    link
}
