//! Series data: indicator payloads and price candles.
//!
//! Everything here arrives from an external service and is treated as
//! untrusted: `SeriesPayload::sanitize` and `validate_candles` are the gates
//! every response passes before the engine stores it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Key under which a single-line payload is drawn and looked up.
pub const SINGLE_LINE_KEY: &str = "value";

/// One `{time, value}` sample. Time is UNIX seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Computed indicator data.
///
/// Either one ordered line, or named sub-series sharing a pane
/// (Bollinger upper/middle/lower, MACD macd/signal/histogram).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesPayload {
    Single(Vec<SeriesPoint>),
    Multi(BTreeMap<String, Vec<SeriesPoint>>),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("sub-series name must not be empty")]
    EmptySeriesName,

    #[error("series '{series}' is not ascending at time {time}")]
    NotAscending { series: String, time: i64 },

    #[error("series '{series}' has duplicate time {time}")]
    DuplicateTime { series: String, time: i64 },

    #[error("multi-series payload has no sub-series")]
    NoSeries,

    #[error("candle at {time} is not sane (non-finite or high/low inconsistent)")]
    InsaneCandle { time: i64 },
}

impl SeriesPayload {
    /// Lines in draw order: `("value", points)` for a single line, sorted keys for multi.
    pub fn lines(&self) -> Vec<(&str, &[SeriesPoint])> {
        match self {
            SeriesPayload::Single(points) => vec![(SINGLE_LINE_KEY, points.as_slice())],
            SeriesPayload::Multi(map) => map
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_slice()))
                .collect(),
        }
    }

    /// Line keys in draw order.
    pub fn line_keys(&self) -> Vec<String> {
        self.lines().into_iter().map(|(k, _)| k.to_string()).collect()
    }

    pub fn point_count(&self) -> usize {
        self.lines().iter().map(|(_, pts)| pts.len()).sum()
    }

    /// Validate an untrusted payload.
    ///
    /// Non-finite values are dropped (warm-up gaps are reported as NaN by
    /// typical backends). Ordering problems and unnamed sub-series are
    /// rejected outright rather than repaired.
    pub fn sanitize(self) -> Result<Self, PayloadError> {
        match self {
            SeriesPayload::Single(points) => {
                Ok(SeriesPayload::Single(sanitize_line(SINGLE_LINE_KEY, points)?))
            }
            SeriesPayload::Multi(map) => {
                if map.is_empty() {
                    return Err(PayloadError::NoSeries);
                }
                let mut clean = BTreeMap::new();
                for (name, points) in map {
                    if name.trim().is_empty() {
                        return Err(PayloadError::EmptySeriesName);
                    }
                    let points = sanitize_line(&name, points)?;
                    clean.insert(name, points);
                }
                Ok(SeriesPayload::Multi(clean))
            }
        }
    }
}

fn sanitize_line(name: &str, points: Vec<SeriesPoint>) -> Result<Vec<SeriesPoint>, PayloadError> {
    let points: Vec<SeriesPoint> = points.into_iter().filter(|p| p.value.is_finite()).collect();
    for pair in points.windows(2) {
        if pair[1].time == pair[0].time {
            return Err(PayloadError::DuplicateTime {
                series: name.to_string(),
                time: pair[1].time,
            });
        }
        if pair[1].time < pair[0].time {
            return Err(PayloadError::NotAscending {
                series: name.to_string(),
                time: pair[1].time,
            });
        }
    }
    Ok(points)
}

/// One OHLC price bar. Time is UNIX seconds at bar open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Finite OHLC with `low <= open, close <= high`.
    pub fn is_sane(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Check the market-data contract: ascending, one bar per timestamp, sane OHLC.
pub fn validate_candles(candles: &[Candle]) -> Result<(), PayloadError> {
    if let Some(bad) = candles.iter().find(|c| !c.is_sane()) {
        return Err(PayloadError::InsaneCandle { time: bad.time });
    }
    for pair in candles.windows(2) {
        if pair[1].time == pair[0].time {
            return Err(PayloadError::DuplicateTime {
                series: "candles".into(),
                time: pair[1].time,
            });
        }
        if pair[1].time < pair[0].time {
            return Err(PayloadError::NotAscending {
                series: "candles".into(),
                time: pair[1].time,
            });
        }
    }
    Ok(())
}
