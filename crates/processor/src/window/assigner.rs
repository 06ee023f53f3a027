//! Tumbling window assigner
//!
//! Maps an event timestamp to the single fixed-size window containing it.

use super::types::{Window, WindowBounds};
use crate::error::{WindowError, WindowResult};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Tumbling window assigner
///
/// Creates fixed-size, non-overlapping windows. Each event is assigned to
/// exactly one window based on its timestamp.
///
/// # Example
/// ```text
/// Window size: 5 seconds
/// Event at timestamp 7 -> Window [5, 10)
/// Event at timestamp 12 -> Window [10, 15)
/// Event at timestamp -3 -> Window [-5, 0)
/// ```
#[derive(Debug, Clone)]
pub struct TumblingWindowAssigner {
    /// Size of each window
    size: Duration,
}

impl TumblingWindowAssigner {
    /// Create a new tumbling window assigner
    pub fn new(size: Duration) -> WindowResult<Self> {
        if size <= Duration::zero() {
            return Err(WindowError::InvalidWindowSize {
                size: size.num_milliseconds(),
            });
        }
        Ok(Self { size })
    }

    /// Create an assigner from a size in milliseconds
    pub fn from_millis(size_ms: u64) -> WindowResult<Self> {
        let size_ms = i64::try_from(size_ms).map_err(|_| WindowError::InvalidWindowSize {
            size: i64::MAX,
        })?;
        Self::new(Duration::milliseconds(size_ms))
    }

    /// Size of every window
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Calculate the window start for a given timestamp (floor alignment)
    fn window_start(&self, ts_millis: i64) -> i64 {
        let size_millis = self.size.num_milliseconds();
        ts_millis.div_euclid(size_millis) * size_millis
    }

    /// Assign a timestamp to its window
    pub fn assign(&self, timestamp: DateTime<Utc>) -> WindowResult<Window> {
        let ts_millis = timestamp.timestamp_millis();
        let start_millis = self.window_start(ts_millis);
        let invalid = |reason: &str| WindowError::InvalidTimestamp {
            timestamp: ts_millis,
            reason: reason.to_string(),
        };

        let start = Utc
            .timestamp_millis_opt(start_millis)
            .single()
            .ok_or_else(|| invalid("window start out of range"))?;
        let end = start
            .checked_add_signed(self.size)
            .ok_or_else(|| invalid("window end out of range"))?;
        let bounds = WindowBounds::new(start, end).ok_or_else(|| invalid("empty window"))?;

        Ok(Window::new(bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_tumbling_window_assignment() {
        let assigner = TumblingWindowAssigner::new(Duration::milliseconds(5000)).unwrap();

        let window = assigner.assign(ts(7000)).unwrap();
        assert_eq!(window.start(), ts(5000));
        assert_eq!(window.end(), ts(10000));

        let window = assigner.assign(ts(12000)).unwrap();
        assert_eq!(window.start(), ts(10000));
        assert_eq!(window.end(), ts(15000));
    }

    #[test]
    fn test_tumbling_window_boundaries() {
        let assigner = TumblingWindowAssigner::from_millis(60_000).unwrap();

        assert_eq!(assigner.assign(ts(60_000)).unwrap().start(), ts(60_000));
        assert_eq!(assigner.assign(ts(119_999)).unwrap().start(), ts(60_000));
        assert_eq!(assigner.assign(ts(120_000)).unwrap().start(), ts(120_000));
    }

    #[test]
    fn test_tumbling_window_before_epoch() {
        let assigner = TumblingWindowAssigner::from_millis(5000).unwrap();

        let window = assigner.assign(ts(-3000)).unwrap();
        assert_eq!(window.start(), ts(-5000));
        assert_eq!(window.end(), ts(0));
        assert!(window.contains(ts(-3000)));
    }

    #[test]
    fn test_every_timestamp_lands_in_its_window() {
        let assigner = TumblingWindowAssigner::from_millis(1000).unwrap();

        for millis in (-2500..2500).step_by(137) {
            let window = assigner.assign(ts(millis)).unwrap();
            assert!(window.contains(ts(millis)), "{} not in {}", millis, window);
            assert_eq!(window.duration(), Duration::milliseconds(1000));
        }
    }

    #[test]
    fn test_invalid_window_size() {
        assert_eq!(
            TumblingWindowAssigner::new(Duration::zero()).unwrap_err(),
            WindowError::InvalidWindowSize { size: 0 }
        );
        assert!(TumblingWindowAssigner::new(Duration::milliseconds(-5)).is_err());
    }
}
