use std::{fmt, str::FromStr};

use chrono::{Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Offset between the Gregorian and Hebrew year counts shown on the reveal heading.
pub const HEBREW_YEAR_OFFSET: i32 = 3760;

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id_newtype!(DreamId);
string_id_newtype!(ReferralCode);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Fear,
    Peace,
    Urgency,
    Joy,
    Confusion,
    Awe,
    Warning,
    Love,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Fear,
        Emotion::Peace,
        Emotion::Urgency,
        Emotion::Joy,
        Emotion::Confusion,
        Emotion::Awe,
        Emotion::Warning,
        Emotion::Love,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Emotion::Fear => "Fear",
            Emotion::Peace => "Peace",
            Emotion::Urgency => "Urgency",
            Emotion::Joy => "Joy",
            Emotion::Confusion => "Confusion",
            Emotion::Awe => "Awe",
            Emotion::Warning => "Warning",
            Emotion::Love => "Love",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Emotion {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Emotion::ALL
            .into_iter()
            .find(|emotion| emotion.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::UnknownEmotion(trimmed.to_string()))
    }
}

/// What the visitor typed into the form. Field names match the backend payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSubmission {
    pub name: String,
    pub email: String,
    pub dream_text: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub emotion: Option<Emotion>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub colors: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub symbols: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub referral_code: Option<ReferralCode>,
}

/// Forms post `""` or `null` for an unset choice.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl DraftSubmission {
    /// Form-level checks that must pass before a teaser request is attempted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::MissingField("email"));
        }
        if !is_plausible_email(self.email.trim()) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        if self.dream_text.trim().is_empty() {
            return Err(ValidationError::MissingField("dream_text"));
        }
        Ok(())
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// A USD amount held in whole cents. The backend speaks decimal numbers (`8.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price {
    cents: u32,
}

impl Price {
    pub const BASE: Price = Price { cents: 1700 };

    pub const fn from_cents(cents: u32) -> Self {
        Self { cents }
    }

    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 || amount > f64::from(u32::MAX) / 100.0 {
            return None;
        }
        Some(Self {
            cents: (amount * 100.0).round() as u32,
        })
    }

    pub fn cents(self) -> u32 {
        self.cents
    }

    pub fn as_decimal(self) -> f64 {
        f64::from(self.cents) / 100.0
    }

    /// Referral preview price.
    pub fn halved(self) -> Self {
        Self {
            cents: self.cents / 2,
        }
    }

    pub fn is_discounted(self) -> bool {
        self < Self::BASE
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::BASE
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Price::from_decimal(amount)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid price amount {amount}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftInfo {
    pub referrer_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub title: String,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripture {
    pub text: String,
    pub reference: String,
    pub context: String,
}

/// The paid report. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub interpretations: Vec<Interpretation>,
    pub scripture: Scripture,
    pub prayer: String,
}

impl Report {
    pub fn is_complete(&self) -> bool {
        !self.interpretations.is_empty()
    }
}

pub fn hebrew_year(gregorian_year: i32) -> i32 {
    gregorian_year + HEBREW_YEAR_OFFSET
}

pub fn current_hebrew_year() -> i32 {
    hebrew_year(Utc::now().year())
}
