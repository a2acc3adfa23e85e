use std::{fmt, sync::Arc};

use anyhow::{anyhow, Result};
use futures::future::join_all;
use shared::{
    domain::{DraftSubmission, DreamId, GiftInfo, Price, ReferralCode, Report},
    error::ValidationError,
    protocol::VerifyPaymentResponse,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use url::Url;

pub mod backend;
pub mod events;
pub mod links;

pub use backend::{BackendApi, BackendError, HttpBackend, DEFAULT_API_URL};
pub use events::{
    Notice, NoticeCategory, NoticeContext, NoticeLevel, RevealPhase, SessionEvent,
    SHARE_LINK_COPIED,
};
pub use links::{share_link, EntryParams, PaymentReturn};

/// Site origin used for share links during local development.
pub const DEFAULT_SITE_URL: &str = "http://localhost:5173";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Leaves the page or opens side windows on behalf of the session.
pub trait Navigator: Send + Sync {
    /// Full-page redirect; the current session is abandoned afterwards.
    fn redirect(&self, url: &Url) -> Result<()>;
    fn open_in_new_context(&self, url: &Url) -> Result<()>;
}

pub struct MissingNavigator;

impl Navigator for MissingNavigator {
    fn redirect(&self, url: &Url) -> Result<()> {
        Err(anyhow!("no navigator available to redirect to {url}"))
    }

    fn open_in_new_context(&self, url: &Url) -> Result<()> {
        Err(anyhow!("no navigator available to open {url}"))
    }
}

pub trait ClipboardSink: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

pub struct MissingClipboard;

impl ClipboardSink for MissingClipboard {
    fn write_text(&self, _text: &str) -> Result<()> {
        Err(anyhow!("system clipboard is unavailable"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Input,
    Teaser,
    Reveal,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewKind::Input => "input",
            ViewKind::Teaser => "teaser",
            ViewKind::Reveal => "reveal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeaserState {
    pub dream_id: DreamId,
    /// The visitor's own shareable code, not the one they arrived with.
    pub referral_code: ReferralCode,
    pub teaser_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RevealStatus {
    Verifying,
    /// The provider has not confirmed payment yet. Shown as pending, not as an error.
    AwaitingConfirmation,
    Ready(Report),
    Failed { message: String },
}

impl RevealStatus {
    pub fn phase(&self) -> RevealPhase {
        match self {
            RevealStatus::Verifying => RevealPhase::Verifying,
            RevealStatus::AwaitingConfirmation => RevealPhase::AwaitingConfirmation,
            RevealStatus::Ready(_) => RevealPhase::Ready,
            RevealStatus::Failed { .. } => RevealPhase::Failed,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            RevealStatus::Ready(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevealState {
    pub dream_id: DreamId,
    pub status: RevealStatus,
    pub referral_code: Option<ReferralCode>,
    pub payer_name: Option<String>,
}

impl RevealState {
    fn verifying(dream_id: DreamId) -> Self {
        Self {
            dream_id,
            status: RevealStatus::Verifying,
            referral_code: None,
            payer_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionView {
    Input,
    Teaser(TeaserState),
    Reveal(RevealState),
}

impl SessionView {
    pub fn kind(&self) -> ViewKind {
        match self {
            SessionView::Input => ViewKind::Input,
            SessionView::Teaser(_) => ViewKind::Teaser,
            SessionView::Reveal(_) => ViewKind::Reveal,
        }
    }

    pub fn dream_id(&self) -> Option<&DreamId> {
        match self {
            SessionView::Input => None,
            SessionView::Teaser(teaser) => Some(&teaser.dream_id),
            SessionView::Reveal(reveal) => Some(&reveal.dream_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Base,
    ReferralPreview,
    /// Quoted by the teaser analysis; never overridden afterwards.
    Quoted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub view: SessionView,
    pub draft: DraftSubmission,
    pub price: Price,
    pub price_source: PriceSource,
    pub gift: Option<GiftInfo>,
    pub loading: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            view: SessionView::Input,
            draft: DraftSubmission::default(),
            price: Price::BASE,
            price_source: PriceSource::Base,
            gift: None,
            loading: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another request is already in progress")]
    Busy,
    #[error("operation requires the {expected} view but the session is in the {actual} view")]
    WrongView { expected: ViewKind, actual: ViewKind },
    #[error("the submission can no longer be edited")]
    DraftFrozen,
    #[error("no dream has been submitted in this session")]
    NoDream,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("backend returned an unusable checkout url '{url}': {reason}")]
    InvalidCheckoutUrl { url: String, reason: String },
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("clipboard write failed: {0}")]
    Clipboard(String),
    #[error("no share link is available yet")]
    ShareLinkUnavailable,
}

/// Background work started by [`SessionController::resume`].
pub struct StartupTasks {
    referral: Option<JoinHandle<()>>,
    verification: Option<JoinHandle<()>>,
}

impl StartupTasks {
    pub fn is_empty(&self) -> bool {
        self.referral.is_none() && self.verification.is_none()
    }

    pub async fn join(self) {
        let handles = self.referral.into_iter().chain(self.verification);
        for result in join_all(handles).await {
            if let Err(err) = result {
                warn!(%err, "session startup task ended abnormally");
            }
        }
    }
}

pub struct SessionController {
    backend: Arc<dyn BackendApi>,
    navigator: Arc<dyn Navigator>,
    clipboard: Arc<dyn ClipboardSink>,
    site_origin: Url,
    inner: Mutex<Session>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn BackendApi>, site_origin: Url) -> Arc<Self> {
        Self::new_with_dependencies(
            backend,
            Arc::new(MissingNavigator),
            Arc::new(MissingClipboard),
            site_origin,
        )
    }

    pub fn new_with_dependencies(
        backend: Arc<dyn BackendApi>,
        navigator: Arc<dyn Navigator>,
        clipboard: Arc<dyn ClipboardSink>,
        site_origin: Url,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            navigator,
            clipboard,
            site_origin,
            inner: Mutex::new(Session::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.lock().await.clone()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Applies the entry-URL parameters. Call once, right after construction.
    ///
    /// A payment return switches the view to `Reveal` before this returns; the referral
    /// lookup and the payment verification then run as independent tasks. They write
    /// disjoint parts of the session, so either may finish first.
    pub async fn resume(self: &Arc<Self>, entry: EntryParams) -> StartupTasks {
        {
            let mut session = self.inner.lock().await;
            if let Some(code) = &entry.referral_code {
                session.draft.referral_code = Some(code.clone());
            }
            if let Some(payment_return) = &entry.payment_return {
                session.view =
                    SessionView::Reveal(RevealState::verifying(payment_return.dream_id.clone()));
                session.loading = true;
            }
        }

        if entry.payment_return.is_some() {
            self.emit(SessionEvent::LoadingChanged(true));
            self.emit(SessionEvent::RevealUpdated(RevealPhase::Verifying));
        }

        let referral = entry.referral_code.map(|code| {
            info!(code = %code, "gift link detected");
            let controller = Arc::clone(self);
            tokio::spawn(async move { controller.apply_referral(code).await })
        });
        let verification = entry.payment_return.map(|payment_return| {
            let controller = Arc::clone(self);
            tokio::spawn(async move { controller.verify_payment(payment_return).await })
        });

        StartupTasks {
            referral,
            verification,
        }
    }

    pub async fn update_draft<F>(&self, edit: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut DraftSubmission) + Send,
    {
        let mut session = self.inner.lock().await;
        if session.view.kind() != ViewKind::Input {
            return Err(SessionError::DraftFrozen);
        }
        edit(&mut session.draft);
        Ok(())
    }

    pub async fn submit_teaser(&self) -> Result<TeaserState, SessionError> {
        let draft = {
            let mut session = self.inner.lock().await;
            if session.loading {
                return Err(SessionError::Busy);
            }
            if session.view.kind() != ViewKind::Input {
                return Err(SessionError::WrongView {
                    expected: ViewKind::Input,
                    actual: session.view.kind(),
                });
            }
            if let Err(err) = session.draft.validate() {
                drop(session);
                let err = SessionError::from(err);
                self.emit(SessionEvent::Notice(Notice::from_session_error(
                    NoticeContext::SubmitTeaser,
                    &err,
                )));
                return Err(err);
            }
            session.loading = true;
            session.draft.clone()
        };
        self.emit(SessionEvent::LoadingChanged(true));
        info!(
            has_referral = draft.referral_code.is_some(),
            emotion = ?draft.emotion,
            "submitting dream for teaser analysis"
        );

        let result = self.backend.analyze_teaser(&draft).await;

        let mut session = self.inner.lock().await;
        session.loading = false;
        match result {
            Ok(response) => {
                if response.price != session.price {
                    debug!(
                        preview = %session.price,
                        quoted = %response.price,
                        "backend quote differs from the displayed price"
                    );
                }
                let teaser = TeaserState {
                    dream_id: response.dream_id,
                    referral_code: response.referral_code,
                    teaser_text: response.teaser,
                };
                session.price = response.price;
                session.price_source = PriceSource::Quoted;
                session.view = SessionView::Teaser(teaser.clone());
                let price = session.price;
                drop(session);

                info!(dream_id = %teaser.dream_id, %price, "teaser ready");
                self.emit(SessionEvent::LoadingChanged(false));
                self.emit(SessionEvent::TeaserReady {
                    dream_id: teaser.dream_id.clone(),
                    price,
                });
                Ok(teaser)
            }
            Err(err) => {
                drop(session);
                warn!(error = %err, "teaser analysis failed");
                self.emit(SessionEvent::LoadingChanged(false));
                self.emit(SessionEvent::Notice(Notice::from_backend_error(
                    NoticeContext::SubmitTeaser,
                    &err,
                )));
                Err(err.into())
            }
        }
    }

    /// Requests a checkout session and hands the payment URL to the navigator.
    ///
    /// On success `loading` stays set: the page is left for the payment provider and
    /// the flow continues from the return URL in a new session.
    pub async fn initiate_payment(&self) -> Result<Url, SessionError> {
        let dream_id = {
            let mut session = self.inner.lock().await;
            if session.loading {
                return Err(SessionError::Busy);
            }
            let dream_id = match &session.view {
                SessionView::Teaser(teaser) => teaser.dream_id.clone(),
                other => {
                    return Err(SessionError::WrongView {
                        expected: ViewKind::Teaser,
                        actual: other.kind(),
                    })
                }
            };
            session.loading = true;
            dream_id
        };
        self.emit(SessionEvent::LoadingChanged(true));
        info!(%dream_id, "creating checkout session");

        let result = match self.backend.create_checkout_session(&dream_id).await {
            Ok(response) => Url::parse(&response.url)
                .map_err(|err| SessionError::InvalidCheckoutUrl {
                    url: response.url.clone(),
                    reason: err.to_string(),
                })
                .and_then(|url| {
                    self.navigator
                        .redirect(&url)
                        .map_err(|err| SessionError::Navigation(err.to_string()))?;
                    Ok(url)
                }),
            Err(err) => Err(SessionError::from(err)),
        };

        match result {
            Ok(url) => {
                info!(%dream_id, %url, "redirecting to hosted checkout");
                self.emit(SessionEvent::CheckoutRedirect(url.clone()));
                Ok(url)
            }
            Err(err) => {
                self.inner.lock().await.loading = false;
                warn!(%dream_id, error = %err, "checkout could not be started");
                self.emit(SessionEvent::LoadingChanged(false));
                self.emit(SessionEvent::Notice(Notice::from_session_error(
                    NoticeContext::Checkout,
                    &err,
                )));
                Err(err)
            }
        }
    }

    /// Opens the PDF download in a new browsing context. Needs a dream id, so it works from
    /// `Teaser` as well as `Reveal`. No session state changes.
    pub async fn download_report(&self) -> Result<Url, SessionError> {
        let dream_id = {
            let session = self.inner.lock().await;
            match session.view.dream_id() {
                Some(dream_id) => dream_id.clone(),
                None => return Err(SessionError::NoDream),
            }
        };

        let url = self.backend.pdf_url(&dream_id);
        if let Err(err) = self.navigator.open_in_new_context(&url) {
            let err = SessionError::Navigation(err.to_string());
            self.emit(SessionEvent::Notice(Notice::from_session_error(
                NoticeContext::DownloadReport,
                &err,
            )));
            return Err(err);
        }
        debug!(%dream_id, %url, "opened report download");
        Ok(url)
    }

    /// Derived from the current share code and name; `None` until a share code exists.
    pub async fn share_link(&self) -> Option<Url> {
        let (code, name) = {
            let session = self.inner.lock().await;
            match &session.view {
                SessionView::Input => return None,
                SessionView::Teaser(teaser) => {
                    (teaser.referral_code.clone(), session.draft.name.clone())
                }
                SessionView::Reveal(reveal) => {
                    let code = reveal.referral_code.clone()?;
                    let name = reveal
                        .payer_name
                        .clone()
                        .unwrap_or_else(|| session.draft.name.clone());
                    (code, name)
                }
            }
        };
        Some(share_link(&self.site_origin, &code, &name))
    }

    pub async fn copy_share_link(&self) -> Result<Url, SessionError> {
        let link = self
            .share_link()
            .await
            .ok_or(SessionError::ShareLinkUnavailable)?;
        if let Err(err) = self.clipboard.write_text(link.as_str()) {
            let err = SessionError::Clipboard(err.to_string());
            self.emit(SessionEvent::Notice(Notice::from_session_error(
                NoticeContext::ShareLink,
                &err,
            )));
            return Err(err);
        }
        self.emit(SessionEvent::Notice(Notice::confirmation(
            NoticeContext::ShareLink,
            SHARE_LINK_COPIED,
        )));
        Ok(link)
    }

    async fn apply_referral(&self, code: ReferralCode) {
        let gift = match self.backend.referral_info(&code).await {
            Ok(info) => info.gift_info(),
            Err(err) => {
                warn!(code = %code, error = %err, "referral lookup failed; keeping base price");
                return;
            }
        };

        let preview_price = {
            let mut session = self.inner.lock().await;
            session.gift = Some(gift.clone());
            // Only the form shows a preview; a quote or a payment return settles the price.
            if session.view.kind() != ViewKind::Input
                || session.price_source == PriceSource::Quoted
            {
                None
            } else {
                session.price = Price::BASE.halved();
                session.price_source = PriceSource::ReferralPreview;
                Some(session.price)
            }
        };

        info!(
            code = %code,
            referrer = %gift.referrer_name,
            preview_price = ?preview_price.map(|price| price.to_string()),
            "gift applied"
        );
        self.emit(SessionEvent::GiftApplied {
            gift,
            preview_price,
        });
    }

    async fn verify_payment(&self, payment_return: PaymentReturn) {
        let PaymentReturn {
            session_id,
            dream_id,
        } = payment_return;
        info!(%dream_id, "verifying payment");

        let outcome = self.backend.verify_payment(&session_id, &dream_id).await;
        let (status, share_code, payer_name, notice) = match outcome {
            Ok(response) if response.is_paid() => resolve_paid(response),
            Ok(response) => {
                debug!(%dream_id, status = %response.status, "payment not confirmed yet");
                (RevealStatus::AwaitingConfirmation, None, None, None)
            }
            Err(err) => {
                warn!(%dream_id, error = %err, "payment verification failed");
                let notice = Notice::from_backend_error(NoticeContext::VerifyPayment, &err);
                let status = RevealStatus::Failed {
                    message: notice.message().to_string(),
                };
                (status, None, None, Some(notice))
            }
        };
        let phase = status.phase();

        {
            let mut session = self.inner.lock().await;
            session.loading = false;
            match &mut session.view {
                SessionView::Reveal(reveal) if reveal.dream_id == dream_id => {
                    reveal.status = status;
                    if share_code.is_some() {
                        reveal.referral_code = share_code;
                    }
                    if payer_name.is_some() {
                        reveal.payer_name = payer_name;
                    }
                }
                other => {
                    warn!(%dream_id, view = %other.kind(), "verification result no longer applies");
                }
            }
        }

        info!(%dream_id, ?phase, "payment verification finished");
        self.emit(SessionEvent::LoadingChanged(false));
        self.emit(SessionEvent::RevealUpdated(phase));
        if let Some(notice) = notice {
            self.emit(SessionEvent::Notice(notice));
        }
    }
}

type PaidOutcome = (
    RevealStatus,
    Option<ReferralCode>,
    Option<String>,
    Option<Notice>,
);

fn resolve_paid(response: VerifyPaymentResponse) -> PaidOutcome {
    match response.report {
        Some(report) if report.is_complete() => (
            RevealStatus::Ready(report),
            response.referral_code,
            response.name,
            None,
        ),
        _ => {
            let notice = Notice::blocking(
                NoticeContext::VerifyPayment,
                NoticeCategory::Backend,
                "payment confirmed but the report is missing",
            );
            let status = RevealStatus::Failed {
                message: notice.message().to_string(),
            };
            (status, response.referral_code, response.name, Some(notice))
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
