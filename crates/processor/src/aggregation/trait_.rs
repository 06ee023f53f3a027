use crate::error::{AggregationError, AggregationResult};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Core trait for incremental aggregators
///
/// Aggregators keep sufficient statistics only, never the raw values:
/// - Incremental updates (feed values one at a time)
/// - Merging (fold another partial result of the same kind)
/// - Serializable state
///
/// `update` and `merge` are commutative and associative for every
/// implementation, so the result does not depend on arrival order.
pub trait Aggregator:
    Clone + Debug + Default + PartialEq + Send + Sync + Serialize + DeserializeOwned
{
    /// The type of the final aggregation result
    type Output: Clone;

    /// Update the aggregator with a new value
    fn update(&mut self, value: f64) -> AggregationResult<()>;

    /// Update with multiple values at once
    fn update_batch(&mut self, values: &[f64]) -> AggregationResult<()> {
        for value in values {
            self.update(*value)?;
        }
        Ok(())
    }

    /// Merge another partial result into this one
    fn merge(&mut self, other: &Self);

    /// Compute the final aggregation result
    fn finalize(&self) -> AggregationResult<Self::Output>;

    /// Get the number of values processed so far
    fn count(&self) -> u64;

    /// Check if the aggregator has processed any values
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Reject values that would poison a running sum
pub(crate) fn check_finite(value: f64) -> AggregationResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AggregationError::InvalidValue {
            value,
            reason: "value must be finite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_finite() {
        assert_eq!(check_finite(4.5), Ok(4.5));
        assert!(check_finite(f64::NAN).is_err());
        assert!(check_finite(f64::INFINITY).is_err());
    }
}
