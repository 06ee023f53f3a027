use super::trait_::{check_finite, Aggregator};
use crate::error::AggregationResult;

use serde::{Deserialize, Serialize};

/// Sum aggregator - computes the sum of all values
///
/// Used for sales volume, item totals and flag counts.
///
/// # Examples
///
/// ```
/// use processor::aggregation::{Aggregator, SumAggregator};
///
/// let mut agg = SumAggregator::default();
/// agg.update(100.0).unwrap();
/// agg.update(-30.0).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), 70.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SumAggregator {
    sum: f64,
    count: u64,
}

impl Aggregator for SumAggregator {
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
        Ok(self.sum)
    }

    fn count(&self) -> u64 {
        self.count
    }
}
