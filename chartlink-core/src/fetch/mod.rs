//! Indicator fetching: planning, deduplication, caching and dispatch.

pub mod cache;
pub mod controller;
pub mod dispatch;

pub use cache::ResultCache;
pub use controller::{CacheHit, FetchController, FetchPlan, FetchRequest, FetchTarget, Resolution};
pub use dispatch::{run_job, FetchDispatcher, FetchJob, QueueDispatcher, WorkerDispatcher};
