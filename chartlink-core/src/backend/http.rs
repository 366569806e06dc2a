//! HTTP backend speaking the chart service's JSON API.
//!
//! Endpoints:
//! - `GET  {base}/data/{ticker}?interval=..`             → `{ data: [{time, open, high, low, close}] }`
//! - `GET  {base}/indicator/{ticker}?interval=..&name=..&<param>=..` → `{ name, data }`
//! - `POST {base}/custom_indicator {ticker, code, interval, name}`  → `{ name, data }` or 400 `{ error }`
//!
//! `data` of an indicator is either a list of `{time, value}` points or an
//! object of named lists. Timestamps may arrive as floats.

use super::{Backend, BackendError};
use crate::domain::{Candle, Interval, SeriesPayload, SeriesPoint, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CandleResponse {
    data: Vec<WireCandle>,
}

#[derive(Debug, Deserialize)]
struct WireCandle {
    time: f64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct IndicatorResponse {
    data: WirePayload,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Single(Vec<WirePoint>),
    Multi(BTreeMap<String, Vec<WirePoint>>),
}

#[derive(Debug, Deserialize)]
struct WirePoint {
    time: f64,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct CustomRequest<'a> {
    ticker: &'a str,
    code: &'a str,
    interval: &'a str,
    name: &'a str,
}

fn to_points(points: Vec<WirePoint>) -> Vec<SeriesPoint> {
    points
        .into_iter()
        .map(|p| SeriesPoint::new(p.time as i64, p.value.unwrap_or(f64::NAN)))
        .collect()
}

impl WirePayload {
    fn into_payload(self) -> SeriesPayload {
        match self {
            WirePayload::Single(points) => SeriesPayload::Single(to_points(points)),
            WirePayload::Multi(map) => {
                SeriesPayload::Multi(map.into_iter().map(|(k, v)| (k, to_points(v))).collect())
            }
        }
    }
}

/// Blocking client for the chart service.
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chartlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response, BackendError> {
        let resp = request.send().map_err(|e| BackendError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().unwrap_or_default();
        // The service reports rejected input as 400 with an `error` field.
        if status == reqwest::StatusCode::BAD_REQUEST {
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(BackendError::Rejected(err.error));
            }
        }
        Err(BackendError::Http {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        })
    }

    fn decode_indicator(resp: reqwest::blocking::Response) -> Result<SeriesPayload, BackendError> {
        let parsed: IndicatorResponse = resp
            .json()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(parsed.data.into_payload())
    }
}

impl Backend for HttpBackend {
    fn fetch_candles(&self, symbol: &Symbol, interval: Interval) -> Result<Vec<Candle>, BackendError> {
        let url = format!("{}/data/{}", self.base_url, symbol);
        let resp = self.send(self.client.get(&url).query(&[("interval", interval.as_str())]))?;
        let parsed: CandleResponse = resp
            .json()
            .map_err(|e| BackendError::Decode(format!("candles for {symbol}: {e}")))?;
        Ok(parsed
            .data
            .into_iter()
            .map(|c| Candle {
                time: c.time as i64,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
            })
            .collect())
    }

    fn compute_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        name: &str,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<SeriesPayload, BackendError> {
        let url = format!("{}/indicator/{}", self.base_url, symbol);
        let mut query: Vec<(String, String)> = vec![
            ("interval".into(), interval.as_str().into()),
            ("name".into(), name.into()),
        ];
        query.extend(parameters.iter().map(|(k, v)| (k.clone(), v.to_string())));
        let resp = self.send(self.client.get(&url).query(&query))?;
        Self::decode_indicator(resp)
    }

    fn compute_custom_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        source_code: &str,
        name: &str,
    ) -> Result<SeriesPayload, BackendError> {
        let url = format!("{}/custom_indicator", self.base_url);
        let body = CustomRequest {
            ticker: symbol.as_str(),
            code: source_code,
            interval: interval.as_str(),
            name,
        };
        let resp = self.send(self.client.post(&url).json(&body))?;
        Self::decode_indicator(resp)
    }

    fn name(&self) -> &str {
        "http"
    }
}
