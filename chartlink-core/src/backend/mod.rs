//! Backend trait and structured error types.
//!
//! A backend supplies candles and computes indicator series. The engine never
//! calls one directly: fetch jobs are run by a dispatcher, which turns the
//! results into engine events.

pub mod http;
pub mod synthetic;

pub use http::HttpBackend;
pub use synthetic::SyntheticBackend;

use crate::domain::{Candle, Interval, SeriesPayload, Symbol};
use std::collections::BTreeMap;
use thiserror::Error;

/// Collaborator failures, displayable in CLI output and notices.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend refused the request. The message is shown to the user as-is.
    #[error("{0}")]
    Rejected(String),

    #[error("response could not be decoded: {0}")]
    Decode(String),
}

/// Source of market data and indicator computations.
pub trait Backend {
    fn fetch_candles(&self, symbol: &Symbol, interval: Interval) -> Result<Vec<Candle>, BackendError>;

    fn compute_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        name: &str,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<SeriesPayload, BackendError>;

    /// Run user-submitted code on the backend. The code is opaque here.
    fn compute_custom_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        source_code: &str,
        name: &str,
    ) -> Result<SeriesPayload, BackendError>;

    fn name(&self) -> &str;
}
