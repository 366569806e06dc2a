//! Indicator instances and the definitions they are created from.

use crate::domain::{IndicatorId, SeriesPayload};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where an indicator's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndicatorKind {
    BuiltIn,
    Custom,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::BuiltIn => "built-in",
            IndicatorKind::Custom => "custom",
        }
    }
}

/// Which pane an indicator draws on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlotTarget {
    /// Series drawn on the main price pane.
    Overlay,
    /// Dedicated pane below the main pane.
    Separate,
}

/// Fetch lifecycle of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStatus {
    Idle,
    Pending,
    Ready,
    Error,
}

/// User-submitted custom indicator. The code is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomIndicatorDefinition {
    pub name: String,
    pub source_code: String,
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IndicatorDefinition {
    BuiltIn {
        name: String,
        #[serde(default)]
        parameters: BTreeMap<String, f64>,
    },
    Custom(CustomIndicatorDefinition),
}

/// A definition plus the presentation choices made when adding it.
///
/// Anything left `None` falls back to the catalog/palette defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIndicator {
    pub definition: IndicatorDefinition,
    pub enabled: Option<bool>,
    pub plot_target: Option<PlotTarget>,
    pub color: Option<String>,
}

impl NewIndicator {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::from_definition(IndicatorDefinition::BuiltIn {
            name: name.into(),
            parameters: BTreeMap::new(),
        })
    }

    pub fn custom(name: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self::from_definition(IndicatorDefinition::Custom(CustomIndicatorDefinition {
            name: name.into(),
            source_code: source_code.into(),
        }))
    }

    pub fn from_definition(definition: IndicatorDefinition) -> Self {
        Self {
            definition,
            enabled: None,
            plot_target: None,
            color: None,
        }
    }

    /// Set one parameter. No-op for custom definitions.
    pub fn param(mut self, name: impl Into<String>, value: f64) -> Self {
        if let IndicatorDefinition::BuiltIn { parameters, .. } = &mut self.definition {
            parameters.insert(name.into(), value);
        }
        self
    }

    pub fn target(mut self, target: PlotTarget) -> Self {
        self.plot_target = Some(target);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// One active indicator.
///
/// `data`, `status`, `last_error` are written only through the store's
/// fetch-facing methods; the rest only through user-facing mutators.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorInstance {
    pub id: IndicatorId,
    pub kind: IndicatorKind,
    pub name: String,
    pub parameters: BTreeMap<String, f64>,
    /// Present for custom indicators only.
    pub source_code: Option<String>,
    pub plot_target: PlotTarget,
    pub enabled: bool,
    pub color: String,
    pub data: Option<Arc<SeriesPayload>>,
    pub fingerprint: Fingerprint,
    pub status: FetchStatus,
    pub last_error: Option<String>,
}

impl IndicatorInstance {
    /// Enabled and holding data (fresh, or last-known-good after an error).
    pub fn is_renderable(&self) -> bool {
        self.enabled && self.data.is_some()
    }

    pub fn wants_separate_pane(&self) -> bool {
        self.enabled && self.plot_target == PlotTarget::Separate
    }

    /// Label used for panes and series titles, e.g. `SMA(period=20)`.
    pub fn label(&self) -> String {
        if self.parameters.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// The definition this instance would be re-created from.
    pub fn definition(&self) -> IndicatorDefinition {
        match (self.kind, &self.source_code) {
            (IndicatorKind::Custom, Some(code)) => {
                IndicatorDefinition::Custom(CustomIndicatorDefinition {
                    name: self.name.clone(),
                    source_code: code.clone(),
                })
            }
            _ => IndicatorDefinition::BuiltIn {
                name: self.name.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_parameters() {
        let new = NewIndicator::builtin("SMA")
            .param("period", 50.0)
            .target(PlotTarget::Separate)
            .enabled(false);
        match &new.definition {
            IndicatorDefinition::BuiltIn { name, parameters } => {
                assert_eq!(name, "SMA");
                assert_eq!(parameters["period"], 50.0);
            }
            other => panic!("unexpected definition {other:?}"),
        }
        assert_eq!(new.plot_target, Some(PlotTarget::Separate));
        assert_eq!(new.enabled, Some(false));
    }

    #[test]
    fn custom_definition_ignores_params() {
        let new = NewIndicator::custom("Mine", "custom_indicator = df['Close']").param("x", 1.0);
        assert!(matches!(new.definition, IndicatorDefinition::Custom(_)));
    }

    #[test]
    fn definition_serializes_with_kind_tag() {
        let def = IndicatorDefinition::BuiltIn {
            name: "RSI".into(),
            parameters: [("period".to_string(), 14.0)].into(),
        };
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains(r#""kind":"built-in""#));
        let back: IndicatorDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }
}
