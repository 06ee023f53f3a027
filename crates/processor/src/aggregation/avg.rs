use super::trait_::{check_finite, Aggregator};
use crate::error::{AggregationError, AggregationResult};
use serde::{Deserialize, Serialize};

/// Average aggregator - computes the mean of all values
///
/// Keeps a `(sum, count)` pair and divides only when finalized, so partial
/// results merge exactly. The mean of a 0/1 flag is a rate.
///
/// # Examples
///
/// ```
/// use processor::aggregation::{Aggregator, AverageAggregator};
///
/// let mut agg = AverageAggregator::default();
/// agg.update(100.0).unwrap();
/// agg.update(-30.0).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), 35.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageAggregator {
    sum: f64,
    count: u64,
}

impl AverageAggregator {
    /// Get the current mean value
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

impl Aggregator for AverageAggregator {
    type Output = f64;

    fn update(&mut self, value: f64) -> AggregationResult<()> {
        self.sum += check_finite(value)?;
        self.count += 1;
        Ok(())
    }

    fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    fn finalize(&self) -> AggregationResult<f64> {
        self.mean().ok_or_else(|| AggregationError::DivisionByZero {
            operation: "average".to_string(),
        })
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_basic() {
        let mut agg = AverageAggregator::default();
        assert!(agg.is_empty());

        agg.update_batch(&[10.0, 20.0, 30.0]).unwrap();

        assert_eq!(agg.count(), 3);
        assert_eq!(agg.finalize().unwrap(), 20.0);
        assert_eq!(agg.mean(), Some(20.0));
    }

    #[test]
    fn test_avg_merge() {
        let mut left = AverageAggregator::default();
        left.update_batch(&[10.0, 20.0]).unwrap();

        let mut right = AverageAggregator::default();
        right.update_batch(&[30.0, 40.0, 50.0]).unwrap();

        left.merge(&right);

        // (10 + 20 + 30 + 40 + 50) / 5, not the mean of the two means
        assert_eq!(left.finalize().unwrap(), 30.0);
        assert_eq!(left.count(), 5);
    }

    #[test]
    fn test_avg_of_flag_is_rate() {
        let mut agg = AverageAggregator::default();
        agg.update_batch(&[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(agg.finalize().unwrap(), 0.25);
    }

    #[test]
    fn test_avg_empty() {
        let agg = AverageAggregator::default();
        assert!(agg.mean().is_none());
        assert!(matches!(
            agg.finalize(),
            Err(AggregationError::DivisionByZero { .. })
        ));
    }
}
