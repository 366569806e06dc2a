//! Panes: the registry of live surfaces, the rendering contract, and the
//! allocator that maps indicator instances onto panes and series.

pub mod allocator;
pub mod memory;
pub mod registry;
pub mod surface;

pub use allocator::{AllocationReport, PaneAllocator};
pub use memory::{MemorySeries, MemorySurface, MemorySurfaceFactory};
pub use registry::{Pane, PaneRegistry, PaneRole};
pub use surface::{ChartSurface, SeriesKind, SeriesStyle, SurfaceError, SurfaceFactory};
