use super::trait_::Aggregator;
use crate::error::AggregationResult;

use serde::{Deserialize, Serialize};

/// Count aggregator - counts the number of values
///
/// The value itself is ignored; used for orders-per-minute style counts.
///
/// # Examples
///
/// ```
/// use processor::aggregation::{Aggregator, CountAggregator};
///
/// let mut agg = CountAggregator::default();
/// agg.update(1.0).unwrap();
/// agg.update(2.0).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAggregator {
    count: u64,
}

impl Aggregator for CountAggregator {
    type Output = u64;

    fn update(&mut self, _value: f64) -> AggregationResult<()> {
        self.count += 1;
        Ok(())
    }

    fn merge(&mut self, other: &Self) {
        self.count += other.count;
    }

    fn finalize(&self) -> AggregationResult<u64> {
        Ok(self.count)
    }

    fn count(&self) -> u64 {
        self.count
    }
}
