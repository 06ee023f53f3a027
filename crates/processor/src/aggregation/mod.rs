//! Incremental aggregation for KPI windows
//!
//! Every metric is computed from sufficient statistics only, so a window never
//! buffers its events. All aggregators support:
//!
//! - **Incremental updates**: Feed values one at a time
//! - **Merging**: Combine two partial results of the same kind
//! - **State serialization**: Persist and inspect aggregator state
//!
//! # Available Aggregators
//!
//! - [`CountAggregator`]: Count the number of values
//! - [`SumAggregator`]: Sum all values
//! - [`AverageAggregator`]: Compute the mean from a `(sum, count)` pair
//!
//! [`Metric`] names the KPI columns a pipeline can declare and maps each to
//! one of the aggregators above; [`PartialAggregate`] runs the declared set
//! for one window and group.
//!
//! # Examples
//!
//! ```rust
//! use processor::aggregation::{Aggregator, SumAggregator};
//!
//! let mut agg1 = SumAggregator::default();
//! agg1.update_batch(&[1.0, 2.0, 3.0]).unwrap();
//!
//! let mut agg2 = SumAggregator::default();
//! agg2.update_batch(&[4.0, 5.0, 6.0]).unwrap();
//!
//! agg1.merge(&agg2);
//! assert_eq!(agg1.finalize().unwrap(), 21.0);
//! ```

mod trait_;

pub mod avg;
pub mod count;
pub mod kpi;
pub mod sum;

pub use avg::AverageAggregator;
pub use count::CountAggregator;
pub use kpi::{Metric, MetricAccumulator, PartialAggregate};
pub use sum::SumAggregator;
pub use trait_::Aggregator;
