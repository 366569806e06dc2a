//! Engine error type.
//!
//! None of these are fatal: the engine always keeps a renderable state, and
//! most variants end up either as an indicator's `last_error` or as a
//! dismissible notice rather than a failed operation.

use crate::domain::{IndicatorId, MarketError, PaneId, PayloadError, ViewportError};
use crate::panes::SurfaceError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Network/backend failure while loading candles or computing an indicator.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// The backend rejected submitted custom indicator code. Message is verbatim.
    #[error("custom indicator rejected: {0}")]
    InvalidCustomIndicator(String),

    /// A fetch result no longer matches the instance's current fingerprint.
    #[error("stale response for {indicator} discarded (fetched {fetched}, current {current})")]
    StaleResponseDiscarded {
        indicator: IndicatorId,
        fetched: String,
        current: String,
    },

    #[error("unknown indicator {0}")]
    UnknownIndicator(IndicatorId),

    #[error("unknown built-in indicator '{0}'")]
    UnknownBuiltin(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid custom indicator definition: {0}")]
    InvalidDefinition(String),

    #[error("unknown pane {0}")]
    UnknownPane(PaneId),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Viewport(#[from] ViewportError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] PayloadError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
