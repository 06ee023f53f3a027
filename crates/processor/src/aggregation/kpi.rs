//! KPI metrics and the per-window partial aggregate
//!
//! A pipeline declares an ordered list of [`Metric`]s. Each metric reads one
//! numeric input from an [`EnrichedEvent`] and folds it into an accumulator
//! of a fixed kind (sum, count or mean). [`PartialAggregate`] holds one
//! accumulator per declared metric for a single window and group.

use super::avg::AverageAggregator;
use super::count::CountAggregator;
use super::sum::SumAggregator;
use super::trait_::{check_finite, Aggregator};
use crate::error::{AggregationError, AggregationResult};
use crate::window::WindowBounds;

use sales_kpi_types::{AggregateRecord, EnrichedEvent, GroupValue, MetricColumn, MetricValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A KPI column a pipeline can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Sum of `total_cost`; returns contribute negatively
    #[serde(rename = "total_volume_of_sales")]
    TotalVolumeOfSales,
    /// Mean of `total_cost`
    #[serde(rename = "average_transaction_size")]
    AverageTransactionSize,
    /// Mean of the `is_return` flag
    #[serde(rename = "rate_of_return")]
    RateOfReturn,
    /// Number of events in the window
    #[serde(rename = "OPM", alias = "opm", alias = "orders_per_minute")]
    OrdersPerMinute,
    /// Sum of `total_items`
    #[serde(rename = "total_items")]
    TotalItems,
    /// Sum of `is_order`
    #[serde(rename = "order_count")]
    OrderCount,
    /// Sum of `is_return`
    #[serde(rename = "return_count")]
    ReturnCount,
}

impl Metric {
    /// Output column name
    pub fn name(&self) -> &'static str {
        match self {
            Metric::TotalVolumeOfSales => "total_volume_of_sales",
            Metric::AverageTransactionSize => "average_transaction_size",
            Metric::RateOfReturn => "rate_of_return",
            Metric::OrdersPerMinute => "OPM",
            Metric::TotalItems => "total_items",
            Metric::OrderCount => "order_count",
            Metric::ReturnCount => "return_count",
        }
    }

    /// The value this metric reads from an event
    pub fn input(&self, event: &EnrichedEvent) -> f64 {
        match self {
            Metric::TotalVolumeOfSales | Metric::AverageTransactionSize => event.total_cost,
            Metric::RateOfReturn | Metric::ReturnCount => f64::from(event.is_return),
            Metric::OrdersPerMinute => 1.0,
            Metric::TotalItems => event.total_items as f64,
            Metric::OrderCount => f64::from(event.is_order),
        }
    }

    /// Fresh accumulator of the kind this metric needs
    pub fn accumulator(&self) -> MetricAccumulator {
        match self {
            Metric::TotalVolumeOfSales
            | Metric::TotalItems
            | Metric::OrderCount
            | Metric::ReturnCount => MetricAccumulator::Sum(SumAggregator::default()),
            Metric::AverageTransactionSize | Metric::RateOfReturn => {
                MetricAccumulator::Mean(AverageAggregator::default())
            }
            Metric::OrdersPerMinute => MetricAccumulator::Count(CountAggregator::default()),
        }
    }

    /// Whether the finalized value is integral
    fn is_integral(&self) -> bool {
        matches!(
            self,
            Metric::OrdersPerMinute | Metric::TotalItems | Metric::OrderCount | Metric::ReturnCount
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulator for a single metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricAccumulator {
    Sum(SumAggregator),
    Count(CountAggregator),
    Mean(AverageAggregator),
}

impl MetricAccumulator {
    fn kind(&self) -> &'static str {
        match self {
            MetricAccumulator::Sum(_) => "sum",
            MetricAccumulator::Count(_) => "count",
            MetricAccumulator::Mean(_) => "mean",
        }
    }

    pub fn update(&mut self, value: f64) -> AggregationResult<()> {
        match self {
            MetricAccumulator::Sum(agg) => agg.update(value),
            MetricAccumulator::Count(agg) => agg.update(value),
            MetricAccumulator::Mean(agg) => agg.update(value),
        }
    }

    /// Merge an accumulator of the same kind
    pub fn merge(&mut self, other: &MetricAccumulator) -> AggregationResult<()> {
        match (self, other) {
            (MetricAccumulator::Sum(left), MetricAccumulator::Sum(right)) => left.merge(right),
            (MetricAccumulator::Count(left), MetricAccumulator::Count(right)) => left.merge(right),
            (MetricAccumulator::Mean(left), MetricAccumulator::Mean(right)) => left.merge(right),
            (left, right) => {
                return Err(AggregationError::TypeMismatch {
                    expected: left.kind().to_string(),
                    actual: right.kind().to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        match self {
            MetricAccumulator::Sum(agg) => agg.count(),
            MetricAccumulator::Count(agg) => agg.count(),
            MetricAccumulator::Mean(agg) => agg.count(),
        }
    }

    /// Final value rendered for `metric`
    pub fn finalize(&self, metric: Metric) -> AggregationResult<MetricValue> {
        let value = match self {
            MetricAccumulator::Sum(agg) => agg.finalize()?,
            MetricAccumulator::Count(agg) => return Ok(MetricValue::Integer(agg.finalize()? as i64)),
            MetricAccumulator::Mean(agg) => agg.finalize()?,
        };
        if metric.is_integral() {
            Ok(MetricValue::Integer(value.round() as i64))
        } else {
            Ok(MetricValue::Float(value))
        }
    }
}

/// Accumulated state of one window and group
///
/// Exists only once at least one event has been merged, so finalizing never
/// divides by zero in practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAggregate {
    accumulators: Vec<(Metric, MetricAccumulator)>,
    event_count: u64,
    min_event_time: i64,
    max_event_time: i64,
}

impl PartialAggregate {
    /// Empty aggregate for the declared metrics, in declaration order
    pub fn new(metrics: &[Metric]) -> Self {
        Self {
            accumulators: metrics
                .iter()
                .map(|metric| (*metric, metric.accumulator()))
                .collect(),
            event_count: 0,
            min_event_time: i64::MAX,
            max_event_time: i64::MIN,
        }
    }

    /// Fold one event into every accumulator
    ///
    /// Inputs are validated before any accumulator changes, so a rejected
    /// event leaves the aggregate untouched.
    pub fn update(&mut self, event: &EnrichedEvent) -> AggregationResult<()> {
        let inputs = self
            .accumulators
            .iter()
            .map(|(metric, _)| check_finite(metric.input(event)))
            .collect::<AggregationResult<Vec<f64>>>()?;

        for ((_, accumulator), value) in self.accumulators.iter_mut().zip(inputs) {
            accumulator.update(value)?;
        }

        let event_time = event.timestamp().timestamp_millis();
        self.event_count += 1;
        self.min_event_time = self.min_event_time.min(event_time);
        self.max_event_time = self.max_event_time.max(event_time);
        Ok(())
    }

    /// Merge another partial for the same key
    pub fn merge(&mut self, other: &PartialAggregate) -> AggregationResult<()> {
        let metrics = |partial: &PartialAggregate| {
            partial
                .accumulators
                .iter()
                .map(|(metric, _)| metric.name())
                .collect::<Vec<_>>()
                .join(",")
        };
        if self.accumulators.len() != other.accumulators.len()
            || self
                .accumulators
                .iter()
                .zip(&other.accumulators)
                .any(|((left, _), (right, _))| left != right)
        {
            return Err(AggregationError::TypeMismatch {
                expected: metrics(self),
                actual: metrics(other),
            });
        }

        for ((_, left), (_, right)) in self.accumulators.iter_mut().zip(&other.accumulators) {
            left.merge(right)?;
        }
        self.event_count += other.event_count;
        self.min_event_time = self.min_event_time.min(other.min_event_time);
        self.max_event_time = self.max_event_time.max(other.max_event_time);
        Ok(())
    }

    /// Number of events merged
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }

    /// Earliest and latest merged event time in milliseconds
    pub fn event_time_range(&self) -> Option<(i64, i64)> {
        (!self.is_empty()).then_some((self.min_event_time, self.max_event_time))
    }

    /// Produce the output row for this window and group
    pub fn finalize(
        &self,
        bounds: &WindowBounds,
        group: Option<GroupValue>,
    ) -> AggregationResult<AggregateRecord> {
        let metrics = self
            .accumulators
            .iter()
            .map(|(metric, accumulator)| {
                Ok(MetricColumn {
                    name: metric.name().to_string(),
                    value: accumulator.finalize(*metric)?,
                })
            })
            .collect::<AggregationResult<Vec<_>>>()?;

        Ok(AggregateRecord {
            start: bounds.start,
            end: bounds.end,
            group,
            metrics,
        })
    }
}
