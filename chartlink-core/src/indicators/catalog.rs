//! Built-in indicator catalog and color assignment.
//!
//! The catalog only describes indicators (parameters, defaults, where they
//! plot, which sub-series they produce); the numbers themselves come from the
//! computation backend.

use super::instance::PlotTarget;
use crate::error::{EngineError, EngineResult};
use std::collections::BTreeMap;

/// One tunable parameter of a built-in indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
    pub min: f64,
    pub description: &'static str,
}

/// Static description of a built-in indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub color: &'static str,
    pub default_target: PlotTarget,
    /// Sub-series names; empty for single-line indicators.
    pub outputs: &'static [&'static str],
}

const PERIOD_DESC: &str = "Number of periods";

pub static BUILTINS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "SMA",
        description: "Simple Moving Average",
        params: &[ParamSpec { name: "period", default: 20.0, min: 1.0, description: PERIOD_DESC }],
        color: "#2962FF",
        default_target: PlotTarget::Overlay,
        outputs: &[],
    },
    BuiltinSpec {
        name: "EMA",
        description: "Exponential Moving Average",
        params: &[ParamSpec { name: "period", default: 9.0, min: 1.0, description: PERIOD_DESC }],
        color: "#FF9800",
        default_target: PlotTarget::Overlay,
        outputs: &[],
    },
    BuiltinSpec {
        name: "RSI",
        description: "Relative Strength Index",
        params: &[ParamSpec { name: "period", default: 14.0, min: 1.0, description: PERIOD_DESC }],
        color: "#E91E63",
        default_target: PlotTarget::Separate,
        outputs: &[],
    },
    BuiltinSpec {
        name: "MACD",
        description: "Moving Average Convergence Divergence",
        params: &[
            ParamSpec { name: "fastPeriod", default: 12.0, min: 1.0, description: "Fast EMA period" },
            ParamSpec { name: "slowPeriod", default: 26.0, min: 1.0, description: "Slow EMA period" },
            ParamSpec { name: "signalPeriod", default: 9.0, min: 1.0, description: "Signal line period" },
        ],
        color: "#00BCD4",
        default_target: PlotTarget::Separate,
        outputs: &["macd", "signal", "histogram"],
    },
    BuiltinSpec {
        name: "BB",
        description: "Bollinger Bands",
        params: &[
            ParamSpec { name: "period", default: 20.0, min: 1.0, description: PERIOD_DESC },
            ParamSpec { name: "stdDev", default: 2.0, min: 0.1, description: "Standard deviation multiplier" },
        ],
        color: "#4CAF50",
        default_target: PlotTarget::Overlay,
        outputs: &["upper", "middle", "lower"],
    },
];

/// Fallback colors, assigned by slot index.
pub const DEFAULT_PALETTE: [&str; 6] = ["#FF0000", "#00FF00", "#0000FF", "#FFA500", "#800080", "#008080"];

/// Find a built-in by name, case-insensitively. `BBANDS` is accepted for `BB`.
pub fn lookup(name: &str) -> Option<&'static BuiltinSpec> {
    let upper = name.trim().to_ascii_uppercase();
    let canonical = if upper == "BBANDS" { "BB" } else { upper.as_str() };
    BUILTINS.iter().find(|spec| spec.name == canonical)
}

impl BuiltinSpec {
    pub fn defaults(&self) -> BTreeMap<String, f64> {
        self.params
            .iter()
            .map(|p| (p.name.to_string(), p.default))
            .collect()
    }

    /// Merge caller-supplied values over the defaults and validate them.
    ///
    /// Unknown parameter names are rejected so a typo cannot silently fall
    /// back to a default.
    pub fn resolve_parameters(
        &self,
        overrides: &BTreeMap<String, f64>,
    ) -> EngineResult<BTreeMap<String, f64>> {
        let mut resolved = self.defaults();
        for (name, value) in overrides {
            let spec = self
                .params
                .iter()
                .find(|p| p.name == name.as_str())
                .ok_or_else(|| EngineError::InvalidParameter {
                    name: name.clone(),
                    reason: format!("{} has no such parameter", self.name),
                })?;
            if !value.is_finite() {
                return Err(EngineError::InvalidParameter {
                    name: name.clone(),
                    reason: "must be a finite number".into(),
                });
            }
            if *value < spec.min {
                return Err(EngineError::InvalidParameter {
                    name: name.clone(),
                    reason: format!("must be at least {}", spec.min),
                });
            }
            resolved.insert(name.clone(), *value);
        }
        Ok(resolved)
    }
}

/// Color for the `slot`-th indicator ever added. Empty palettes fall back to the default one.
pub fn palette_color(palette: &[String], slot: usize) -> String {
    if palette.is_empty() {
        DEFAULT_PALETTE[slot % DEFAULT_PALETTE.len()].to_string()
    } else {
        palette[slot % palette.len()].clone()
    }
}
