//! Domain types for ChartLink

pub mod ids;
pub mod market;
pub mod series;
pub mod viewport;

pub use ids::{FetchTicket, IndicatorId, NoticeId, PaneId, SeriesHandle};
pub use market::{Interval, MarketContext, MarketError, Symbol};
pub use series::{validate_candles, Candle, PayloadError, SeriesPayload, SeriesPoint, SINGLE_LINE_KEY};
pub use viewport::{
    Crosshair, CrosshairUpdate, LogicalRange, TimeRange, Viewport, ViewportError, ViewportPatch,
};
