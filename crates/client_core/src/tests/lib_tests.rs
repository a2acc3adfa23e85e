use super::*;
use async_trait::async_trait;
use shared::{
    domain::{Emotion, Interpretation, Scripture},
    protocol::{CheckoutResponse, ReferralInfoResponse, TeaserResponse},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex as StdMutex,
};
use tokio::sync::Notify;

#[derive(Default)]
struct FakeBackend {
    referral: Option<ReferralInfoResponse>,
    teaser: Option<TeaserResponse>,
    checkout_url: Option<String>,
    verify: Option<VerifyPaymentResponse>,
    referral_gate: Option<Arc<Notify>>,
    teaser_gate: Option<Arc<Notify>>,
    verify_gate: Option<Arc<Notify>>,
    referral_calls: AtomicUsize,
    teaser_calls: AtomicUsize,
    checkout_calls: AtomicUsize,
    submitted: StdMutex<Vec<DraftSubmission>>,
    verified: StdMutex<Vec<(String, DreamId)>>,
}

fn status_error(endpoint: &'static str, status: u16, detail: &str) -> BackendError {
    BackendError::Status {
        endpoint,
        status,
        detail: detail.to_string(),
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn referral_info(
        &self,
        _code: &ReferralCode,
    ) -> Result<ReferralInfoResponse, BackendError> {
        self.referral_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.referral_gate {
            gate.notified().await;
        }
        self.referral
            .clone()
            .ok_or_else(|| status_error("referral", 404, "Blessing code not found"))
    }

    async fn analyze_teaser(
        &self,
        draft: &DraftSubmission,
    ) -> Result<TeaserResponse, BackendError> {
        self.teaser_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().expect("submitted").push(draft.clone());
        if let Some(gate) = &self.teaser_gate {
            gate.notified().await;
        }
        self.teaser
            .clone()
            .ok_or_else(|| status_error("analyze-teaser", 500, "model unavailable"))
    }

    async fn create_checkout_session(
        &self,
        _dream_id: &DreamId,
    ) -> Result<CheckoutResponse, BackendError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        match &self.checkout_url {
            Some(url) => Ok(CheckoutResponse {
                url: url.clone(),
                amount: None,
            }),
            None => Err(status_error("create-checkout-session", 400, "card declined")),
        }
    }

    async fn verify_payment(
        &self,
        session_id: &str,
        dream_id: &DreamId,
    ) -> Result<VerifyPaymentResponse, BackendError> {
        self.verified
            .lock()
            .expect("verified")
            .push((session_id.to_string(), dream_id.clone()));
        if let Some(gate) = &self.verify_gate {
            gate.notified().await;
        }
        self.verify
            .clone()
            .ok_or_else(|| status_error("verify-payment", 502, "provider unreachable"))
    }

    fn pdf_url(&self, dream_id: &DreamId) -> Url {
        Url::parse(&format!("http://backend.test/api/download-pdf/{dream_id}")).expect("pdf url")
    }
}

#[derive(Default)]
struct RecordingNavigator {
    redirects: StdMutex<Vec<Url>>,
    opened: StdMutex<Vec<Url>>,
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &Url) -> Result<()> {
        self.redirects.lock().expect("redirects").push(url.clone());
        Ok(())
    }

    fn open_in_new_context(&self, url: &Url) -> Result<()> {
        self.opened.lock().expect("opened").push(url.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingClipboard {
    contents: StdMutex<Option<String>>,
}

impl ClipboardSink for RecordingClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        *self.contents.lock().expect("clipboard") = Some(text.to_string());
        Ok(())
    }
}

struct Harness {
    controller: Arc<SessionController>,
    backend: Arc<FakeBackend>,
    navigator: Arc<RecordingNavigator>,
    clipboard: Arc<RecordingClipboard>,
}

fn harness(backend: FakeBackend) -> Harness {
    let backend = Arc::new(backend);
    let navigator = Arc::new(RecordingNavigator::default());
    let clipboard = Arc::new(RecordingClipboard::default());
    let controller = SessionController::new_with_dependencies(
        backend.clone(),
        navigator.clone(),
        clipboard.clone(),
        Url::parse("https://dreamdecode.test").expect("origin"),
    );
    Harness {
        controller,
        backend,
        navigator,
        clipboard,
    }
}

fn gift_response() -> ReferralInfoResponse {
    ReferralInfoResponse {
        referrer_name: "Ruth".to_string(),
        message: "Your friend Ruth has blessed you with a 50% discount.".to_string(),
        referrer_dream_preview: None,
        discount_active: Some(true),
        discount_percent: Some(50),
    }
}

fn teaser_response(price: Price) -> TeaserResponse {
    TeaserResponse {
        dream_id: DreamId::new("d1"),
        referral_code: ReferralCode::new("ABC123"),
        teaser: "The crimson door speaks of a season turning, but...".to_string(),
        price,
        hebrew_year: Some(5785),
        discount_applied: price.is_discounted(),
    }
}

fn sample_report() -> Report {
    Report {
        interpretations: vec![Interpretation {
            title: "The Revelation".to_string(),
            meaning: "A door opening onto a new season.".to_string(),
        }],
        scripture: Scripture {
            text: "Behold, I have set before thee an open door".to_string(),
            reference: "Revelation 3:8".to_string(),
            context: "Open doors mark new assignments.".to_string(),
        },
        prayer: "Lord, guide me through the door you have opened.".to_string(),
    }
}

fn paid_response() -> VerifyPaymentResponse {
    VerifyPaymentResponse {
        status: "paid".to_string(),
        report: Some(sample_report()),
        message: Some("Your revelation has been emailed to you".to_string()),
        referral_code: Some(ReferralCode::new("ABC123")),
        name: Some("Mary Ann".to_string()),
    }
}

fn payment_return() -> EntryParams {
    EntryParams::from_query("session_id=sess_1&dream_id=d1")
}

async fn fill_valid_draft(controller: &SessionController) {
    controller
        .update_draft(|draft| {
            draft.name = "Mary Ann".to_string();
            draft.email = "mary@example.com".to_string();
            draft.dream_text = "I stood before a crimson door on a mountain.".to_string();
            draft.emotion = Some(Emotion::Awe);
            draft.colors = "Crimson, gold".to_string();
        })
        .await
        .expect("draft editable");
}

fn drain_notices(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SessionEvent::Notice(notice) = event {
            notices.push(notice);
        }
    }
    notices
}

async fn wait_for_loading(rx: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await.expect("event stream") {
            SessionEvent::LoadingChanged(true) => return,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn submit_teaser_moves_to_teaser_with_quoted_price() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::from_cents(1234))),
        ..FakeBackend::default()
    });
    fill_valid_draft(&h.controller).await;

    let teaser = h.controller.submit_teaser().await.expect("submit");
    assert_eq!(teaser.dream_id, DreamId::new("d1"));

    let session = h.controller.snapshot().await;
    assert_eq!(session.view, SessionView::Teaser(teaser));
    assert_eq!(session.price, Price::from_cents(1234));
    assert_eq!(session.price_source, PriceSource::Quoted);
    assert!(!session.loading);

    let submitted = h.backend.submitted.lock().expect("submitted").clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].colors, "Crimson, gold");
    assert_eq!(submitted[0].emotion, Some(Emotion::Awe));
}

#[tokio::test]
async fn failed_submit_keeps_input_view_and_draft() {
    let h = harness(FakeBackend::default());
    fill_valid_draft(&h.controller).await;
    let before = h.controller.snapshot().await;
    let mut events = h.controller.subscribe_events();

    let err = h.controller.submit_teaser().await.expect_err("must fail");
    assert!(matches!(err, SessionError::Backend(_)), "unexpected: {err}");

    let after = h.controller.snapshot().await;
    assert_eq!(after.view, SessionView::Input);
    assert_eq!(after.draft, before.draft);
    assert!(!after.loading);

    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].is_blocking());
    assert_eq!(notices[0].context(), NoticeContext::SubmitTeaser);
    assert!(notices[0].message().contains("model unavailable"));

    h.controller
        .update_draft(|draft| draft.symbols = "Serpent".to_string())
        .await
        .expect("draft stays editable for retry");
}

#[tokio::test]
async fn invalid_draft_is_rejected_before_any_request() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        ..FakeBackend::default()
    });
    h.controller
        .update_draft(|draft| {
            draft.name = "Mary".to_string();
            draft.email = "not-an-email".to_string();
            draft.dream_text = "Water over stones".to_string();
        })
        .await
        .expect("edit");

    let err = h.controller.submit_teaser().await.expect_err("invalid");
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::InvalidEmail(_))
    ));
    assert_eq!(h.backend.teaser_calls.load(Ordering::SeqCst), 0);
    assert!(!h.controller.snapshot().await.loading);
}

#[tokio::test]
async fn repeated_submit_while_loading_issues_one_request() {
    let gate = Arc::new(Notify::new());
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        teaser_gate: Some(gate.clone()),
        ..FakeBackend::default()
    });
    fill_valid_draft(&h.controller).await;
    let mut events = h.controller.subscribe_events();

    let first = {
        let controller = Arc::clone(&h.controller);
        tokio::spawn(async move { controller.submit_teaser().await })
    };
    wait_for_loading(&mut events).await;

    for _ in 0..3 {
        let err = h.controller.submit_teaser().await.expect_err("busy");
        assert!(matches!(err, SessionError::Busy));
    }

    gate.notify_one();
    first.await.expect("join").expect("first submit");
    assert_eq!(h.backend.teaser_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gift_code_previews_half_price() {
    let h = harness(FakeBackend {
        referral: Some(gift_response()),
        ..FakeBackend::default()
    });

    let tasks = h
        .controller
        .resume(EntryParams::from_query("code=GIFT50"))
        .await;
    tasks.join().await;

    let session = h.controller.snapshot().await;
    assert_eq!(session.draft.referral_code, Some(ReferralCode::new("GIFT50")));
    assert_eq!(session.price, Price::BASE.halved());
    assert_eq!(session.price, Price::from_cents(850));
    assert_eq!(session.price_source, PriceSource::ReferralPreview);
    assert_eq!(
        session.gift.map(|gift| gift.referrer_name),
        Some("Ruth".to_string())
    );
    assert_eq!(session.view, SessionView::Input);
}

#[tokio::test]
async fn unknown_gift_code_is_ignored_silently() {
    let h = harness(FakeBackend::default());
    let mut events = h.controller.subscribe_events();

    h.controller
        .resume(EntryParams::from_query("code=NOPE"))
        .await
        .join()
        .await;

    let session = h.controller.snapshot().await;
    assert_eq!(session.price, Price::BASE);
    assert!(session.gift.is_none());
    assert_eq!(session.draft.referral_code, Some(ReferralCode::new("NOPE")));
    assert_eq!(h.backend.referral_calls.load(Ordering::SeqCst), 1);
    assert!(drain_notices(&mut events).is_empty());
}

#[tokio::test]
async fn payment_return_enters_reveal_before_verification_finishes() {
    let gate = Arc::new(Notify::new());
    let h = harness(FakeBackend {
        verify: Some(paid_response()),
        verify_gate: Some(gate.clone()),
        ..FakeBackend::default()
    });

    let tasks = h.controller.resume(payment_return()).await;

    let session = h.controller.snapshot().await;
    match &session.view {
        SessionView::Reveal(reveal) => {
            assert_eq!(reveal.dream_id, DreamId::new("d1"));
            assert_eq!(reveal.status, RevealStatus::Verifying);
        }
        other => panic!("expected reveal view, got {other:?}"),
    }
    assert!(session.loading);

    gate.notify_one();
    tasks.join().await;

    let verified = h.backend.verified.lock().expect("verified").clone();
    assert_eq!(verified, vec![("sess_1".to_string(), DreamId::new("d1"))]);

    let session = h.controller.snapshot().await;
    assert!(!session.loading);
    match session.view {
        SessionView::Reveal(reveal) => {
            assert_eq!(reveal.status.report(), Some(&sample_report()));
        }
        other => panic!("expected reveal view, got {other:?}"),
    }
}

#[tokio::test]
async fn unpaid_verification_waits_without_error() {
    let h = harness(FakeBackend {
        verify: Some(VerifyPaymentResponse::unpaid()),
        ..FakeBackend::default()
    });
    let mut events = h.controller.subscribe_events();

    h.controller.resume(payment_return()).await.join().await;

    let session = h.controller.snapshot().await;
    match session.view {
        SessionView::Reveal(reveal) => {
            assert_eq!(reveal.status, RevealStatus::AwaitingConfirmation)
        }
        other => panic!("expected reveal view, got {other:?}"),
    }
    assert!(drain_notices(&mut events).is_empty());
}

#[tokio::test]
async fn verification_failure_is_surfaced() {
    let h = harness(FakeBackend::default());
    let mut events = h.controller.subscribe_events();

    h.controller.resume(payment_return()).await.join().await;

    let session = h.controller.snapshot().await;
    match session.view {
        SessionView::Reveal(reveal) => {
            assert_eq!(reveal.status.phase(), RevealPhase::Failed);
        }
        other => panic!("expected reveal view, got {other:?}"),
    }
    assert!(!session.loading);

    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].context(), NoticeContext::VerifyPayment);
    assert_eq!(notices[0].category(), NoticeCategory::Backend);
}

#[tokio::test]
async fn paid_status_without_report_is_not_treated_as_ready() {
    let mut response = paid_response();
    response.report = Some(Report {
        interpretations: Vec::new(),
        ..sample_report()
    });
    let h = harness(FakeBackend {
        verify: Some(response),
        ..FakeBackend::default()
    });

    h.controller.resume(payment_return()).await.join().await;

    match h.controller.snapshot().await.view {
        SessionView::Reveal(reveal) => assert_eq!(reveal.status.phase(), RevealPhase::Failed),
        other => panic!("expected reveal view, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_startup_results_are_both_kept() {
    let referral_gate = Arc::new(Notify::new());
    let verify_gate = Arc::new(Notify::new());
    let h = harness(FakeBackend {
        referral: Some(gift_response()),
        verify: Some(paid_response()),
        referral_gate: Some(referral_gate.clone()),
        verify_gate: Some(verify_gate.clone()),
        ..FakeBackend::default()
    });

    let tasks = h
        .controller
        .resume(EntryParams::from_query(
            "code=GIFT50&session_id=sess_1&dream_id=d1",
        ))
        .await;
    verify_gate.notify_one();
    referral_gate.notify_one();
    tasks.join().await;

    let session = h.controller.snapshot().await;
    assert!(session.gift.is_some());
    match session.view {
        SessionView::Reveal(reveal) => assert!(reveal.status.report().is_some()),
        other => panic!("expected reveal view, got {other:?}"),
    }
}

#[tokio::test]
async fn gift_arriving_on_reveal_leaves_price_alone() {
    let h = harness(FakeBackend {
        referral: Some(gift_response()),
        verify: Some(paid_response()),
        ..FakeBackend::default()
    });
    let mut events = h.controller.subscribe_events();

    h.controller
        .resume(EntryParams::from_query(
            "code=GIFT50&session_id=sess_1&dream_id=d1",
        ))
        .await
        .join()
        .await;

    let session = h.controller.snapshot().await;
    assert_eq!(
        session.gift.map(|gift| gift.referrer_name),
        Some("Ruth".to_string())
    );
    assert_eq!(session.price, Price::BASE);
    assert_eq!(session.price_source, PriceSource::Base);

    let mut preview = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::GiftApplied { preview_price, .. } = event {
            preview = Some(preview_price);
        }
    }
    assert_eq!(preview, Some(None));
}

#[tokio::test]
async fn late_gift_lookup_keeps_quoted_price() {
    let referral_gate = Arc::new(Notify::new());
    let h = harness(FakeBackend {
        referral: Some(gift_response()),
        referral_gate: Some(referral_gate.clone()),
        teaser: Some(teaser_response(Price::BASE)),
        ..FakeBackend::default()
    });

    let tasks = h
        .controller
        .resume(EntryParams::from_query("code=GIFT50"))
        .await;
    fill_valid_draft(&h.controller).await;
    h.controller.submit_teaser().await.expect("submit");

    referral_gate.notify_one();
    tasks.join().await;

    let session = h.controller.snapshot().await;
    assert!(session.gift.is_some());
    assert_eq!(session.price, Price::BASE);
    assert_eq!(session.price_source, PriceSource::Quoted);
}

#[tokio::test]
async fn initiate_payment_redirects_to_checkout() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        checkout_url: Some("https://checkout.test/pay/cs_123".to_string()),
        ..FakeBackend::default()
    });
    fill_valid_draft(&h.controller).await;
    h.controller.submit_teaser().await.expect("submit");

    let url = h.controller.initiate_payment().await.expect("checkout");
    assert_eq!(url.as_str(), "https://checkout.test/pay/cs_123");
    assert_eq!(
        h.navigator.redirects.lock().expect("redirects").clone(),
        vec![url]
    );
    assert!(h.controller.snapshot().await.loading);

    let err = h.controller.initiate_payment().await.expect_err("busy");
    assert!(matches!(err, SessionError::Busy));
    assert_eq!(h.backend.checkout_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_checkout_stays_on_teaser() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        ..FakeBackend::default()
    });
    fill_valid_draft(&h.controller).await;
    h.controller.submit_teaser().await.expect("submit");
    let mut events = h.controller.subscribe_events();

    h.controller.initiate_payment().await.expect_err("declined");

    let session = h.controller.snapshot().await;
    assert_eq!(session.view.kind(), ViewKind::Teaser);
    assert!(!session.loading);
    assert!(h.navigator.redirects.lock().expect("redirects").is_empty());
    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].context(), NoticeContext::Checkout);
    assert_eq!(notices[0].category(), NoticeCategory::Validation);
}

#[tokio::test]
async fn checkout_requires_teaser_view() {
    let h = harness(FakeBackend::default());
    let err = h.controller.initiate_payment().await.expect_err("no teaser");
    assert!(matches!(
        err,
        SessionError::WrongView {
            expected: ViewKind::Teaser,
            actual: ViewKind::Input
        }
    ));
    assert_eq!(h.backend.checkout_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn draft_freezes_after_teaser() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        ..FakeBackend::default()
    });
    fill_valid_draft(&h.controller).await;
    h.controller.submit_teaser().await.expect("submit");

    let err = h
        .controller
        .update_draft(|draft| draft.name = "Someone Else".to_string())
        .await
        .expect_err("frozen");
    assert!(matches!(err, SessionError::DraftFrozen));
    assert_eq!(h.controller.snapshot().await.draft.name, "Mary Ann");
}

#[tokio::test]
async fn share_link_is_copied_with_confirmation() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        ..FakeBackend::default()
    });
    assert!(h.controller.share_link().await.is_none());
    fill_valid_draft(&h.controller).await;
    h.controller.submit_teaser().await.expect("submit");
    let mut events = h.controller.subscribe_events();

    let link = h.controller.copy_share_link().await.expect("copy");
    assert!(!link.as_str().contains(' '));
    assert!(link.as_str().starts_with("https://dreamdecode.test/gift?code=ABC123&from="));
    assert_eq!(
        h.clipboard.contents.lock().expect("clipboard").clone(),
        Some(link.to_string())
    );

    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert!(!notices[0].is_blocking());
    assert_eq!(notices[0].message(), SHARE_LINK_COPIED);
}

#[tokio::test]
async fn resumed_reveal_shares_with_echoed_identity() {
    let h = harness(FakeBackend {
        verify: Some(paid_response()),
        ..FakeBackend::default()
    });
    h.controller.resume(payment_return()).await.join().await;

    let link = h.controller.share_link().await.expect("share link");
    let pairs: Vec<(String, String)> = link
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(pairs[0], ("code".to_string(), "ABC123".to_string()));
    assert_eq!(pairs[1], ("from".to_string(), "Mary Ann".to_string()));
}

#[tokio::test]
async fn download_opens_pdf_in_new_context() {
    let h = harness(FakeBackend {
        verify: Some(paid_response()),
        ..FakeBackend::default()
    });
    let err = h.controller.download_report().await.expect_err("no dream yet");
    assert!(matches!(err, SessionError::NoDream));
    assert_eq!(err.to_string(), "no dream has been submitted in this session");

    h.controller.resume(payment_return()).await.join().await;
    let url = h.controller.download_report().await.expect("download");

    assert_eq!(url.as_str(), "http://backend.test/api/download-pdf/d1");
    assert_eq!(h.navigator.opened.lock().expect("opened").clone(), vec![url]);
}

#[tokio::test]
async fn missing_host_ports_surface_errors() {
    let controller = SessionController::new(
        Arc::new(FakeBackend {
            teaser: Some(teaser_response(Price::BASE)),
            checkout_url: Some("https://checkout.test/pay".to_string()),
            ..FakeBackend::default()
        }),
        Url::parse("https://dreamdecode.test").expect("origin"),
    );
    fill_valid_draft(&controller).await;
    controller.submit_teaser().await.expect("submit");

    let err = controller.copy_share_link().await.expect_err("no clipboard");
    assert!(matches!(err, SessionError::Clipboard(_)));

    let err = controller.initiate_payment().await.expect_err("no navigator");
    assert!(matches!(err, SessionError::Navigation(_)));
    let session = controller.snapshot().await;
    assert_eq!(session.view.kind(), ViewKind::Teaser);
    assert!(!session.loading);
}

#[tokio::test]
async fn download_is_available_from_teaser() {
    let h = harness(FakeBackend {
        teaser: Some(teaser_response(Price::BASE)),
        ..FakeBackend::default()
    });
    fill_valid_draft(&h.controller).await;
    h.controller.submit_teaser().await.expect("submit");

    let url = h.controller.download_report().await.expect("download");
    assert_eq!(url.as_str(), "http://backend.test/api/download-pdf/d1");
}
