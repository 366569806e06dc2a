//! ChartLink Core: multi-pane chart synchronization and indicator overlay lifecycle.
//!
//! This crate holds the state and rules behind a multi-pane financial chart:
//! - Domain types (symbols, intervals, candles, series payloads, viewports)
//! - Sync coordinator keeping every pane on one shared viewport
//! - Indicator store with fingerprinted computation inputs
//! - Fetch controller deduplicating and caching indicator computations
//! - Pane allocator mapping indicators onto overlays and dedicated panes
//! - Chart engine processing one event at a time to completion
//!
//! Rendering, market data and indicator math live behind traits
//! (`ChartSurface`, `Backend`, `PreferenceStore`).

pub mod backend;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod indicators;
pub mod panes;
pub mod persistence;
pub mod sync;

pub use engine::{ChartEngine, EngineEvent, EventOutcome};
pub use error::{EngineError, EngineResult};
