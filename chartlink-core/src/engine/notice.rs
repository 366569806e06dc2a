//! User-visible, dismissible notices.

use crate::domain::{IndicatorId, NoticeId};
use crate::error::EngineError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    FetchFailed,
    InvalidCustomIndicator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: NoticeId,
    pub kind: NoticeKind,
    /// `None` for candle failures.
    pub indicator: Option<IndicatorId>,
    pub message: String,
}

impl NoticeKind {
    /// Kind and display message for an error. Custom-code rejections keep the
    /// backend's text unchanged.
    pub fn describe(error: &EngineError) -> (NoticeKind, String) {
        match error {
            EngineError::InvalidCustomIndicator(message) => {
                (NoticeKind::InvalidCustomIndicator, message.clone())
            }
            other => (NoticeKind::FetchFailed, other.to_string()),
        }
    }
}
