//! Watermark tracking for handling late events
//!
//! A watermark is the engine's notion of event-time progress: every window
//! whose end is at or before the watermark is closed, and events for closed
//! windows are dropped instead of merged.
//!
//! Each aggregation owns one [`WatermarkTracker`] using a bounded
//! out-of-orderness strategy: `watermark = max_seen - allowed_lateness`. The
//! watermark never moves backwards, so a late event cannot reopen a window.
//!
//! # Example
//!
//! ```rust
//! use processor::watermark::WatermarkTracker;
//! use std::time::Duration;
//!
//! let tracker = WatermarkTracker::new(Duration::from_secs(60));
//! tracker.observe(120_000);
//! assert_eq!(tracker.current().timestamp, 60_000);
//!
//! // An older event never lowers the watermark
//! tracker.observe(10_000);
//! assert_eq!(tracker.current().timestamp, 60_000);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use crate::window::Window;

/// Represents a watermark timestamp
///
/// Watermarks indicate that all events with timestamps less than or equal to the watermark
/// are no longer accepted for windows ending at or before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    /// The watermark timestamp in milliseconds since epoch
    pub timestamp: i64,
}

impl Watermark {
    /// Creates a new watermark with the given timestamp
    pub fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    /// Creates a watermark from a DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            timestamp: dt.timestamp_millis(),
        }
    }

    /// Converts the watermark to a DateTime, `None` for the open-ended sentinels
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Returns the minimum possible watermark (beginning of time)
    pub fn min() -> Self {
        Self { timestamp: i64::MIN }
    }

    /// Returns true if this is the minimum watermark
    pub fn is_min(&self) -> bool {
        self.timestamp == i64::MIN
    }

    /// Whether the window ending at `end_millis` is closed under this watermark
    pub fn closes(&self, end_millis: i64) -> bool {
        self.timestamp >= end_millis
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::min()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) if !self.is_min() => write!(f, "Watermark({})", dt),
            _ => write!(f, "Watermark(-inf)"),
        }
    }
}

/// Per-aggregation bounded out-of-orderness watermark
///
/// Tracks the maximum event timestamp observed (`max_seen`) and derives
/// `watermark = max_seen - allowed_lateness`. All state is atomic so the
/// tracker can be read from the trigger while events are being observed.
#[derive(Debug)]
pub struct WatermarkTracker {
    /// Maximum event timestamp seen, in milliseconds
    max_seen: AtomicI64,
    /// Current watermark, in milliseconds
    watermark: AtomicI64,
    /// Allowed lateness in milliseconds
    allowed_lateness_ms: i64,
}

impl WatermarkTracker {
    /// Creates a tracker with the given allowed lateness
    pub fn new(allowed_lateness: Duration) -> Self {
        Self {
            max_seen: AtomicI64::new(i64::MIN),
            watermark: AtomicI64::new(i64::MIN),
            allowed_lateness_ms: i64::try_from(allowed_lateness.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Allowed lateness
    pub fn allowed_lateness(&self) -> Duration {
        Duration::from_millis(self.allowed_lateness_ms.max(0) as u64)
    }

    /// Records an event timestamp, returning the watermark if it advanced
    pub fn observe(&self, timestamp: i64) -> Option<Watermark> {
        self.max_seen.fetch_max(timestamp, Ordering::SeqCst);

        let candidate = timestamp.saturating_sub(self.allowed_lateness_ms);
        let previous = self.watermark.fetch_max(candidate, Ordering::SeqCst);
        if candidate > previous {
            trace!(watermark = candidate, "Advanced watermark");
            Some(Watermark::new(candidate))
        } else {
            None
        }
    }

    /// Raises the watermark to at least `floor`
    ///
    /// Used on restart: windows that were already sealed before the
    /// checkpoint stay closed while the tracker is rebuilt by replay.
    pub fn restore_floor(&self, floor: Watermark) {
        let previous = self.watermark.fetch_max(floor.timestamp, Ordering::SeqCst);
        if floor.timestamp > previous {
            debug!(watermark = %floor, "Restored watermark floor");
        }
    }

    /// Current watermark
    pub fn current(&self) -> Watermark {
        Watermark::new(self.watermark.load(Ordering::SeqCst))
    }

    /// Maximum event timestamp observed, `None` before the first event
    pub fn max_seen(&self) -> Option<i64> {
        let max_seen = self.max_seen.load(Ordering::SeqCst);
        (max_seen != i64::MIN).then_some(max_seen)
    }

    /// Whether a window is closed under the current watermark
    pub fn is_closed(&self, window: &Window) -> bool {
        self.current().closes(window.bounds.end_millis())
    }

    /// How far behind the watermark a timestamp is, 0 if not behind
    pub fn lateness(&self, timestamp: i64) -> i64 {
        let current = self.current().timestamp;
        if timestamp < current {
            current.saturating_sub(timestamp)
        } else {
            0
        }
    }
}
