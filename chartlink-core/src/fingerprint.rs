//! Indicator fingerprinting: the cache key for computed series.
//!
//! A fingerprint covers everything that changes the computed numbers:
//! symbol, interval, indicator kind, name, parameters, and for custom
//! indicators the submitted source. Presentation (color, plot target,
//! enabled) is deliberately absent, so toggling or retargeting an indicator
//! keeps its cache entry.

use crate::domain::MarketContext;
use crate::indicators::IndicatorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// BLAKE3 hex digest of the computation inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex chars, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Borrowed view of the inputs that determine an indicator's series.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub context: &'a MarketContext,
    pub kind: IndicatorKind,
    pub name: &'a str,
    pub parameters: &'a BTreeMap<String, f64>,
    pub source_code: Option<&'a str>,
}

impl FingerprintInput<'_> {
    /// Hash the inputs.
    ///
    /// Fields are length-prefixed and parameters visited in key order
    /// (`BTreeMap`), so the digest is stable across runs and platforms.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        update_field(&mut hasher, self.context.symbol.as_str().as_bytes());
        update_field(&mut hasher, self.context.interval.as_str().as_bytes());
        update_field(&mut hasher, self.kind.as_str().as_bytes());
        update_field(&mut hasher, self.name.as_bytes());

        hasher.update(&(self.parameters.len() as u64).to_le_bytes());
        for (key, value) in self.parameters {
            update_field(&mut hasher, key.as_bytes());
            // -0.0 and 0.0 are the same parameter
            let canonical = if *value == 0.0 { 0.0_f64 } else { *value };
            hasher.update(&canonical.to_bits().to_le_bytes());
        }

        match self.source_code {
            Some(code) => {
                hasher.update(&[1]);
                update_field(&mut hasher, code.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }

        Fingerprint(hasher.finalize().to_hex().to_string())
    }
}

fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
