//! Viewport synchronization across panes.

pub mod coordinator;
pub mod handle;

pub use coordinator::{SyncCoordinator, SyncOutcome};
pub use handle::ViewportHandle;
