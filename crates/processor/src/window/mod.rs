//! Windowing module for stream processing
//!
//! Events are grouped by event time into tumbling windows: fixed-size,
//! non-overlapping, half-open intervals. Each event belongs to exactly one
//! window per aggregation.
//!
//! ```text
//! Time:     0----5----10---15---20---25---30
//! Windows:  [----)[---)[---)[---)[---)[---)
//! ```
//!
//! A window is closed once the watermark reaches its end; closing is decided
//! by the [`WatermarkTracker`](crate::watermark::WatermarkTracker), not here.
//!
//! # Example Usage
//!
//! ```rust
//! use processor::window::TumblingWindowAssigner;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let assigner = TumblingWindowAssigner::new(Duration::minutes(1)).unwrap();
//! let window = assigner
//!     .assign(Utc.with_ymd_and_hms(2020, 11, 20, 5, 37, 52).unwrap())
//!     .unwrap();
//! assert_eq!(window.start(), Utc.with_ymd_and_hms(2020, 11, 20, 5, 37, 0).unwrap());
//! ```

pub mod assigner;
pub mod types;

pub use assigner::TumblingWindowAssigner;
pub use types::{Window, WindowBounds};
