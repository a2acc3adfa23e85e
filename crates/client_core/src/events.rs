//! Session events and user-facing notices.

use shared::domain::{DreamId, GiftInfo, Price};
use url::Url;

use crate::{backend::BackendError, SessionError};

pub const SHARE_LINK_COPIED: &str =
    "Blessing link copied! Share it with someone who needs revelation.";

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoadingChanged(bool),
    /// `preview_price` is `None` outside the form view or once the backend has quoted a price.
    GiftApplied {
        gift: GiftInfo,
        preview_price: Option<Price>,
    },
    TeaserReady {
        dream_id: DreamId,
        price: Price,
    },
    CheckoutRedirect(Url),
    RevealUpdated(RevealPhase),
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    Verifying,
    AwaitingConfirmation,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Must be acknowledged; the operation was abandoned.
    Blocking,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeCategory {
    Transport,
    Backend,
    NotFound,
    Validation,
    Host,
    Confirmation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeContext {
    SubmitTeaser,
    Checkout,
    VerifyPayment,
    ShareLink,
    DownloadReport,
}

impl NoticeContext {
    pub fn headline(self) -> &'static str {
        match self {
            NoticeContext::SubmitTeaser => "Error analyzing dream",
            NoticeContext::Checkout => "Error creating payment",
            NoticeContext::VerifyPayment => "Error verifying payment",
            NoticeContext::ShareLink => "Could not share the blessing link",
            NoticeContext::DownloadReport => "Could not open the report download",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    level: NoticeLevel,
    category: NoticeCategory,
    context: NoticeContext,
    message: String,
}

impl Notice {
    pub fn blocking(
        context: NoticeContext,
        category: NoticeCategory,
        detail: impl AsRef<str>,
    ) -> Self {
        Self {
            level: NoticeLevel::Blocking,
            category,
            context,
            message: format!("{}: {}", context.headline(), detail.as_ref()),
        }
    }

    pub fn confirmation(context: NoticeContext, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            category: NoticeCategory::Confirmation,
            context,
            message: message.into(),
        }
    }

    pub fn from_backend_error(context: NoticeContext, err: &BackendError) -> Self {
        let category = match err {
            BackendError::Transport { .. } => NoticeCategory::Transport,
            BackendError::InvalidBaseUrl { .. } => NoticeCategory::Host,
            BackendError::Decode { .. } => NoticeCategory::Backend,
            BackendError::Status { status, .. } => match *status {
                404 => NoticeCategory::NotFound,
                400 | 422 => NoticeCategory::Validation,
                _ => NoticeCategory::Backend,
            },
        };
        Self::blocking(context, category, err.to_string())
    }

    pub fn from_session_error(context: NoticeContext, err: &SessionError) -> Self {
        match err {
            SessionError::Backend(inner) => Self::from_backend_error(context, inner),
            SessionError::Validation(_) => {
                Self::blocking(context, NoticeCategory::Validation, err.to_string())
            }
            SessionError::InvalidCheckoutUrl { .. } => {
                Self::blocking(context, NoticeCategory::Backend, err.to_string())
            }
            SessionError::Navigation(_) | SessionError::Clipboard(_) => {
                Self::blocking(context, NoticeCategory::Host, err.to_string())
            }
            _ => Self::blocking(context, NoticeCategory::Unknown, err.to_string()),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.level == NoticeLevel::Blocking
    }

    pub fn level(&self) -> NoticeLevel {
        self.level
    }

    pub fn category(&self) -> NoticeCategory {
        self.category
    }

    pub fn context(&self) -> NoticeContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
