//! Core types and data models for the sales KPI stream engine
//!
//! This crate provides the invoice events consumed from the source, their
//! enriched form, and the finalized KPI records written to sinks.

pub mod events;
pub mod records;

pub use events::{parse_timestamp, EnrichedEvent, EventType, LineItem, SalesEvent};
pub use records::{format_time, AggregateRecord, GroupValue, MetricColumn, MetricValue};
