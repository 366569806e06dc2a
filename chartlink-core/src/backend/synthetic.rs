//! Offline backend: seeded random-walk candles and indicators computed from them.
//!
//! Same seed, symbol and interval always give the same candles, so every
//! series derived from them is reproducible. Custom code is never run; a
//! submission is accepted if it assigns `custom_indicator`, and answered with
//! a deterministic line derived from the code's hash.

use super::{Backend, BackendError};
use crate::domain::{Candle, Interval, SeriesPayload, SeriesPoint, Symbol};
use crate::indicators::catalog;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Rejection text for custom code that never assigns the result variable.
pub const MISSING_CUSTOM_INDICATOR: &str = "Custom indicator not found in the executed code";

/// Time of the last synthetic bar: 2024-01-01T00:00:00Z.
const ANCHOR_TIME: i64 = 1_704_067_200;

#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    seed: u64,
    bars: usize,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(42)
    }
}

impl SyntheticBackend {
    pub fn new(seed: u64) -> Self {
        Self { seed, bars: 300 }
    }

    pub fn with_bars(mut self, bars: usize) -> Self {
        self.bars = bars.max(2);
        self
    }

    fn rng_for(&self, parts: &[&[u8]]) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let hash = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(hash.as_bytes());
        StdRng::from_seed(seed)
    }

    fn candles(&self, symbol: &Symbol, interval: Interval) -> Vec<Candle> {
        let mut rng = self.rng_for(&[symbol.as_str().as_bytes(), interval.as_str().as_bytes()]);
        let step = interval.seconds();
        let start = ANCHOR_TIME - step * (self.bars as i64 - 1);
        let mut price: f64 = rng.gen_range(20.0..400.0);

        (0..self.bars)
            .map(|i| {
                let open = price;
                let drift: f64 = rng.gen_range(-0.02..0.02);
                let close = (open * (1.0 + drift)).max(0.01);
                let wick_up: f64 = rng.gen_range(0.0..0.01);
                let wick_down: f64 = rng.gen_range(0.0..0.01);
                price = close;
                Candle {
                    time: start + step * i as i64,
                    open,
                    high: open.max(close) * (1.0 + wick_up),
                    low: open.min(close) * (1.0 - wick_down),
                    close,
                }
            })
            .collect()
    }
}

impl Backend for SyntheticBackend {
    fn fetch_candles(&self, symbol: &Symbol, interval: Interval) -> Result<Vec<Candle>, BackendError> {
        Ok(self.candles(symbol, interval))
    }

    fn compute_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        name: &str,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<SeriesPayload, BackendError> {
        let spec = catalog::lookup(name)
            .ok_or_else(|| BackendError::Rejected(format!("Unknown indicator: {name}")))?;
        let candles = self.candles(symbol, interval);
        let times: Vec<i64> = candles.iter().map(|c| c.time).collect();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let param = |key: &str| {
            parameters
                .get(key)
                .copied()
                .or_else(|| spec.params.iter().find(|p| p.name == key).map(|p| p.default))
                .unwrap_or(1.0)
        };
        let period = |key: &str| (param(key).round() as usize).max(1);

        let payload = match spec.name {
            "SMA" => single(&times, &studies::sma(&closes, period("period"))),
            "EMA" => single(&times, &studies::ema(&closes, period("period"))),
            "RSI" => single(&times, &studies::rsi(&closes, period("period"))),
            "MACD" => {
                let (macd, signal, hist) = studies::macd(
                    &closes,
                    period("fastPeriod"),
                    period("slowPeriod"),
                    period("signalPeriod"),
                );
                multi(&times, [("macd", macd), ("signal", signal), ("histogram", hist)])
            }
            "BB" => {
                let (upper, middle, lower) = studies::bollinger(&closes, period("period"), param("stdDev"));
                multi(&times, [("upper", upper), ("middle", middle), ("lower", lower)])
            }
            other => return Err(BackendError::Rejected(format!("Unknown indicator: {other}"))),
        };
        Ok(payload)
    }

    fn compute_custom_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        source_code: &str,
        _name: &str,
    ) -> Result<SeriesPayload, BackendError> {
        if !source_code.contains("custom_indicator") {
            return Err(BackendError::Rejected(MISSING_CUSTOM_INDICATOR.to_string()));
        }
        let candles = self.candles(symbol, interval);
        let mut rng = self.rng_for(&[source_code.as_bytes()]);
        let period = rng.gen_range(3..30);
        let scale: f64 = rng.gen_range(0.95..1.05);
        let closes: Vec<f64> = candles.iter().map(|c| c.close * scale).collect();
        let times: Vec<i64> = candles.iter().map(|c| c.time).collect();
        Ok(single(&times, &studies::ema(&closes, period)))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

fn points(times: &[i64], values: &[f64]) -> Vec<SeriesPoint> {
    times
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite())
        .map(|(t, v)| SeriesPoint::new(*t, *v))
        .collect()
}

fn single(times: &[i64], values: &[f64]) -> SeriesPayload {
    SeriesPayload::Single(points(times, values))
}

fn multi<const N: usize>(times: &[i64], lines: [(&str, Vec<f64>); N]) -> SeriesPayload {
    SeriesPayload::Multi(
        lines
            .into_iter()
            .map(|(key, values)| (key.to_string(), points(times, &values)))
            .collect(),
    )
}

/// Close-based studies. Warm-up positions are NaN.
mod studies {
    pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
        let mut out = vec![f64::NAN; values.len()];
        if period == 0 || values.len() < period {
            return out;
        }
        let mut sum: f64 = values[..period].iter().sum();
        out[period - 1] = sum / period as f64;
        for i in period..values.len() {
            sum += values[i] - values[i - period];
            out[i] = sum / period as f64;
        }
        out
    }

    /// EMA seeded with the SMA of the first `period` values. NaN inputs before
    /// the seed window are skipped, so this also works on derived series.
    pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
        let mut out = vec![f64::NAN; values.len()];
        let Some(first) = values.iter().position(|v| v.is_finite()) else {
            return out;
        };
        if period == 0 || values.len() - first < period {
            return out;
        }
        let alpha = 2.0 / (period as f64 + 1.0);
        let seed_end = first + period;
        let mut prev = values[first..seed_end].iter().sum::<f64>() / period as f64;
        out[seed_end - 1] = prev;
        for i in seed_end..values.len() {
            prev = alpha * values[i] + (1.0 - alpha) * prev;
            out[i] = prev;
        }
        out
    }

    /// Wilder RSI.
    pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
        let n = values.len();
        let mut out = vec![f64::NAN; n];
        if period == 0 || n < period + 1 {
            return out;
        }
        let (mut gain, mut loss) = (0.0, 0.0);
        for i in 1..=period {
            let ch = values[i] - values[i - 1];
            if ch > 0.0 {
                gain += ch;
            } else {
                loss -= ch;
            }
        }
        gain /= period as f64;
        loss /= period as f64;
        out[period] = rsi_value(gain, loss);

        let alpha = 1.0 / period as f64;
        for i in (period + 1)..n {
            let ch = values[i] - values[i - 1];
            gain = alpha * ch.max(0.0) + (1.0 - alpha) * gain;
            loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * loss;
            out[i] = rsi_value(gain, loss);
        }
        out
    }

    fn rsi_value(gain: f64, loss: f64) -> f64 {
        if gain == 0.0 && loss == 0.0 {
            50.0
        } else if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    }

    pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let fast = ema(values, fast);
        let slow = ema(values, slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema(&line, signal);
        let hist = line.iter().zip(&signal).map(|(m, s)| m - s).collect();
        (line, signal, hist)
    }

    pub fn bollinger(values: &[f64], period: usize, k: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let middle = sma(values, period);
        let mut upper = vec![f64::NAN; values.len()];
        let mut lower = vec![f64::NAN; values.len()];
        for i in 0..values.len() {
            if !middle[i].is_finite() {
                continue;
            }
            let window = &values[i + 1 - period..=i];
            let var = window.iter().map(|v| (v - middle[i]).powi(2)).sum::<f64>() / period as f64;
            let sd = var.sqrt();
            upper[i] = middle[i] + k * sd;
            lower[i] = middle[i] - k * sd;
        }
        (upper, middle, lower)
    }
}
