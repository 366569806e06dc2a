//! Indicator preferences: JSON save/load across restarts.
//!
//! Only the definition and presentation of each indicator is stored; computed
//! data never is. A missing or unreadable file loads as an empty list.

use crate::error::{EngineError, EngineResult};
use crate::indicators::{
    CustomIndicatorDefinition, IndicatorDefinition, IndicatorInstance, IndicatorKind, NewIndicator,
    PlotTarget,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One persisted indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedIndicator {
    pub kind: IndicatorKind,
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    pub enabled: bool,
    pub plot_target: PlotTarget,
    pub color: String,
}

impl SavedIndicator {
    pub fn from_instance(inst: &IndicatorInstance) -> Self {
        Self {
            kind: inst.kind,
            name: inst.name.clone(),
            parameters: inst.parameters.clone(),
            source_code: inst.source_code.clone(),
            enabled: inst.enabled,
            plot_target: inst.plot_target,
            color: inst.color.clone(),
        }
    }

    /// The add request that recreates this indicator.
    pub fn to_new_indicator(&self) -> NewIndicator {
        let definition = match self.kind {
            IndicatorKind::BuiltIn => IndicatorDefinition::BuiltIn {
                name: self.name.clone(),
                parameters: self.parameters.clone(),
            },
            IndicatorKind::Custom => IndicatorDefinition::Custom(CustomIndicatorDefinition {
                name: self.name.clone(),
                source_code: self.source_code.clone().unwrap_or_default(),
            }),
        };
        NewIndicator::from_definition(definition)
            .enabled(self.enabled)
            .target(self.plot_target)
            .color(self.color.clone())
    }
}

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    indicators: Vec<SavedIndicator>,
}

/// Where indicator preferences live.
pub trait PreferenceStore {
    fn load(&self) -> Vec<SavedIndicator>;

    fn save(&mut self, indicators: &[SavedIndicator]) -> EngineResult<()>;
}

/// Pretty-printed JSON file. Parent directories are created on save.
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
    path: PathBuf,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. A missing file is not an error.
    pub fn clear(&self) -> EngineResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Persistence(e.to_string())),
        }
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn load(&self) -> Vec<SavedIndicator> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<PreferencesFile>(&content) {
                Ok(file) => file.indicators,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "preferences unreadable; starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    fn save(&mut self, indicators: &[SavedIndicator]) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Persistence(e.to_string()))?;
        }
        let file = PreferencesFile {
            indicators: indicators.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| EngineError::Persistence(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| EngineError::Persistence(e.to_string()))
    }
}

/// In-memory store. Clones share the same contents, so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    indicators: Vec<SavedIndicator>,
    saves: usize,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indicators(indicators: Vec<SavedIndicator>) -> Self {
        let prefs = Self::default();
        if let Ok(mut inner) = prefs.inner.lock() {
            inner.indicators = indicators;
        }
        prefs
    }

    pub fn saved(&self) -> Vec<SavedIndicator> {
        self.inner.lock().map(|i| i.indicators.clone()).unwrap_or_default()
    }

    /// Number of saves performed so far.
    pub fn save_count(&self) -> usize {
        self.inner.lock().map(|i| i.saves).unwrap_or_default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Vec<SavedIndicator> {
        self.saved()
    }

    fn save(&mut self, indicators: &[SavedIndicator]) -> EngineResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EngineError::Persistence("preferences lock poisoned".into()))?;
        inner.indicators = indicators.to_vec();
        inner.saves += 1;
        Ok(())
    }
}
