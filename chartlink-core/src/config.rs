//! Engine configuration, stored as TOML.
//!
//! Every field has a default, so a partial file (or none at all) is fine:
//!
//! ```toml
//! symbol = "MSFT"
//! interval = "1h"
//! cache_capacity = 128
//!
//! [backend]
//! kind = "http"
//! base_url = "http://localhost:5000"
//! timeout_secs = 15
//! ```

use crate::domain::{Interval, MarketContext, Symbol};
use crate::error::{EngineError, EngineResult};
use crate::indicators::DEFAULT_PALETTE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Http,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Seed for the synthetic backend.
    pub seed: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Synthetic,
            base_url: "http://localhost:5000".into(),
            timeout_secs: 30,
            seed: 42,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Symbol shown at startup.
    pub symbol: String,
    /// Interval shown at startup.
    pub interval: String,
    /// Computed series kept by fingerprint; 0 disables the cache.
    pub cache_capacity: usize,
    /// Fallback colors for indicators without a catalog color.
    pub palette: Vec<String>,
    /// Indicator preferences file. `None` means the host picks a location.
    pub preferences_path: Option<PathBuf>,
    pub backend: BackendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".into(),
            interval: "1d".into(),
            cache_capacity: 64,
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            preferences_path: None,
            backend: BackendConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Load from a TOML file, or defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> EngineResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(format!("serialize config: {e}")))
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.context()?;
        if self.backend.timeout_secs == 0 {
            return Err(EngineError::Config("backend.timeout_secs must be positive".into()));
        }
        if self.palette.iter().any(|c| c.trim().is_empty()) {
            return Err(EngineError::Config("palette entries must not be empty".into()));
        }
        Ok(())
    }

    /// The startup market context.
    pub fn context(&self) -> EngineResult<MarketContext> {
        let symbol = Symbol::parse(&self.symbol)?;
        let interval: Interval = self.interval.parse()?;
        Ok(MarketContext::new(symbol, interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            symbol = "msft"
            [backend]
            kind = "http"
            "#,
        )
        .unwrap();
        assert_eq!(config.context().unwrap().to_string(), "MSFT@1d");
        assert_eq!(config.backend.kind, BackendKind::Http);
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.palette.len(), 6);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml(r#"interval = "2d""#),
            Err(EngineError::Market(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("[backend]\ntimeout_secs = 0"),
            Err(EngineError::Config(_))
        ));
        assert!(EngineConfig::from_toml("cache_capacity = \"lots\"").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = EngineConfig::default();
        config.preferences_path = Some(PathBuf::from("/tmp/prefs.json"));
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = EngineConfig::load_or_default(Path::new("/nonexistent/chartlink.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
