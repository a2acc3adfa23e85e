use std::fmt::Write as _;

use client_core::{RevealStatus, Session, SessionView};
use shared::domain::{GiftInfo, Price, Report};

pub fn gift_banner(gift: &GiftInfo, price: Price) -> String {
    format!(
        "A gift from {}\n{}\nYour price: {price}",
        gift.referrer_name, gift.message
    )
}

pub fn price_line(price: Price) -> String {
    if price.is_discounted() {
        format!("Unlock your full revelation for {price} (was {})", Price::BASE)
    } else {
        format!("Unlock your full revelation for {price}")
    }
}

pub fn session(session: &Session, hebrew_year: i32) -> String {
    match &session.view {
        SessionView::Input => {
            let mut out = String::from("Share your dream to receive a teaser interpretation.");
            if let Some(gift) = &session.gift {
                let _ = write!(out, "\n\n{}", gift_banner(gift, session.price));
            }
            out
        }
        SessionView::Teaser(teaser) => {
            format!(
                "{}\n\n{}\nDream id: {}",
                teaser.teaser_text,
                price_line(session.price),
                teaser.dream_id
            )
        }
        SessionView::Reveal(reveal) => match &reveal.status {
            RevealStatus::Verifying => "Verifying your payment...".to_string(),
            RevealStatus::AwaitingConfirmation => {
                "Your payment has not been confirmed yet. Run this again in a moment.".to_string()
            }
            RevealStatus::Ready(report) => revelation(report, hebrew_year),
            RevealStatus::Failed { message } => message.clone(),
        },
    }
}

pub fn revelation(report: &Report, hebrew_year: i32) -> String {
    let mut out = format!("Your Dream Revelation, Year {hebrew_year}\n");
    for interpretation in &report.interpretations {
        let _ = write!(
            out,
            "\n{}\n{}\n",
            interpretation.title, interpretation.meaning
        );
    }
    let _ = write!(
        out,
        "\n\"{}\"\n  {}\n{}\n",
        report.scripture.text, report.scripture.reference, report.scripture.context
    );
    let _ = write!(out, "\nPrayer\n{}", report.prayer);
    out
}
