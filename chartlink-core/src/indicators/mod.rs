//! Indicator definitions, the built-in catalog, and the indicator store.

pub mod catalog;
pub mod instance;
pub mod store;

pub use catalog::{lookup, BuiltinSpec, ParamSpec, BUILTINS, DEFAULT_PALETTE};
pub use instance::{
    CustomIndicatorDefinition, FetchStatus, IndicatorDefinition, IndicatorInstance, IndicatorKind,
    NewIndicator, PlotTarget,
};
pub use store::{IndicatorStore, StoreSnapshot};
