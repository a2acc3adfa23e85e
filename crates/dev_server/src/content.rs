//! Canned interpretation text so the client flow can be exercised offline.

use std::fmt::Write as _;

use shared::domain::{DraftSubmission, Interpretation, Report, Scripture};

const PREVIEW_CHARS: usize = 100;
const PREVIEW_FALLBACK: &str = "A blessed vision";

struct Typology {
    keywords: &'static [&'static str],
    meaning: &'static str,
    reference: &'static str,
    text: &'static str,
}

const TYPOLOGY: &[Typology] = &[
    Typology {
        keywords: &["water", "river", "sea", "rain", "flood"],
        meaning: "Water speaks of the Holy Spirit, of cleansing, or of chaos yet to be stilled.",
        reference: "Ezekiel 47:9",
        text: "And every thing shall live whither the river cometh.",
    },
    Typology {
        keywords: &["fire", "flame", "burn", "smoke"],
        meaning: "Fire marks Pentecost, purification, or judgment drawing near.",
        reference: "Malachi 3:2",
        text: "For he is like a refiner's fire, and like fullers' soap.",
    },
    Typology {
        keywords: &["serpent", "snake"],
        meaning: "The serpent warns of deception, yet lifted up it became healing.",
        reference: "Numbers 21:9",
        text: "And Moses made a serpent of brass, and put it upon a pole.",
    },
    Typology {
        keywords: &["mountain", "height", "tower", "cliff", "roof"],
        meaning: "Heights reveal authority given, or pride that must be laid down.",
        reference: "Isaiah 2:2",
        text: "The mountain of the Lord's house shall be established in the top of the mountains.",
    },
    Typology {
        keywords: &["door", "gate", "threshold"],
        meaning: "A door announces a new season, or a place left open to the enemy.",
        reference: "Revelation 3:8",
        text: "Behold, I have set before thee an open door, and no man can shut it.",
    },
];

const FALLBACK_SCRIPTURE: (&str, &str) = (
    "Genesis 40:8",
    "Do not interpretations belong to God? tell me them, I pray you.",
);

fn dream_corpus(draft: &DraftSubmission) -> String {
    format!("{} {} {}", draft.dream_text, draft.symbols, draft.colors).to_lowercase()
}

fn matched_typology(draft: &DraftSubmission) -> Option<&'static Typology> {
    let corpus = dream_corpus(draft);
    TYPOLOGY
        .iter()
        .find(|entry| entry.keywords.iter().any(|kw| corpus.contains(kw)))
}

/// Two sentences that name one detail of the dream and stop short of explaining it.
pub fn teaser_for(draft: &DraftSubmission) -> String {
    let detail = if !draft.colors.trim().is_empty() {
        format!("The {} you saw", draft.colors.trim().to_lowercase())
    } else if let Some(emotion) = draft.emotion {
        format!("The {} that lingered when you woke", emotion.name().to_lowercase())
    } else {
        "What you saw in the night".to_string()
    };
    format!(
        "{detail} is no accident; it echoes the visions given to Joseph in Pharaoh's court. \
         Something is being prepared for you, but..."
    )
}

pub fn referral_message(referrer_name: &str) -> String {
    format!(
        "Your friend {referrer_name} has blessed you with a 50% discount on your dream \
         interpretation. Like the loaves and fishes, this blessing multiplies when shared."
    )
}

pub fn teaser_preview(teaser: &str) -> String {
    if teaser.is_empty() {
        return PREVIEW_FALLBACK.to_string();
    }
    let preview: String = teaser.chars().take(PREVIEW_CHARS).collect();
    format!("{preview}...")
}

pub fn full_report(draft: &DraftSubmission) -> Report {
    let typology = matched_typology(draft);
    let revelation = typology
        .map(|t| t.meaning)
        .unwrap_or("Your dream carries a message in the language of parables.");
    let (reference, text) = typology
        .map(|t| (t.reference, t.text))
        .unwrap_or(FALLBACK_SCRIPTURE);
    let emotion = draft
        .emotion
        .map(|e| e.name().to_lowercase())
        .unwrap_or_else(|| "stillness".to_string());

    Report {
        interpretations: vec![
            Interpretation {
                title: "The Revelation".to_string(),
                meaning: format!("{}, {revelation}", draft.name.trim()),
            },
            Interpretation {
                title: "The Warning/Confirmation".to_string(),
                meaning: format!(
                    "The {emotion} you carried is confirmation that this dream was meant for you."
                ),
            },
            Interpretation {
                title: "The Action Step".to_string(),
                meaning: "Write the vision down and make it plain, then wait on its appointed time."
                    .to_string(),
            },
        ],
        scripture: Scripture {
            text: text.to_string(),
            reference: reference.to_string(),
            context: "Scripture interprets the symbols your dream placed before you.".to_string(),
        },
        prayer: format!(
            "Lord, give {} understanding of what was shown in the night, and the courage to walk in it. Amen.",
            draft.name.trim()
        ),
    }
}

/// Plain-text rendering served by the download route.
pub fn render_report(name: &str, hebrew_year: i32, report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dream Revelation for {name}");
    let _ = writeln!(out, "Year {hebrew_year}");
    out.push('\n');
    for interpretation in &report.interpretations {
        let _ = writeln!(out, "{}", interpretation.title);
        let _ = writeln!(out, "{}", interpretation.meaning);
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "\"{}\" ({})",
        report.scripture.text, report.scripture.reference
    );
    let _ = writeln!(out, "{}", report.scripture.context);
    out.push('\n');
    let _ = writeln!(out, "Prayer");
    let _ = writeln!(out, "{}", report.prayer);
    out
}
