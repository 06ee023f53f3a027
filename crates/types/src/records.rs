//! Finalized KPI rows
//!
//! An [`AggregateRecord`] is the externally visible output of one sealed
//! window (and group). Serialization keeps the column order
//! `start, end, [group], metrics...` so that every sink writes
//! self-describing rows in the declared order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a single metric column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Counts
    Integer(i64),
    /// Sums and means
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(v) => *v as f64,
            MetricValue::Float(v) => *v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A named metric column
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    pub name: String,
    pub value: MetricValue,
}

/// Group-by column of a record (e.g. `country = "Germany"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupValue {
    pub column: String,
    pub value: String,
}

/// Finalized aggregate for one window and optional group
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Group-by value, absent for time-only aggregations
    pub group: Option<GroupValue>,
    /// Metric columns in declaration order
    pub metrics: Vec<MetricColumn>,
}

impl AggregateRecord {
    /// Look up a metric by column name
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.metrics
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.value)
    }

    /// Group value, if the record is grouped
    pub fn group_value(&self) -> Option<&str> {
        self.group.as_ref().map(|group| group.value.as_str())
    }

    /// Column names in output order
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec!["start".to_string(), "end".to_string()];
        if let Some(group) = &self.group {
            names.push(group.column.clone());
        }
        names.extend(self.metrics.iter().map(|column| column.name.clone()));
        names
    }

    /// Rendered column values in output order
    pub fn column_values(&self) -> Vec<String> {
        let mut values = vec![format_time(&self.start), format_time(&self.end)];
        if let Some(group) = &self.group {
            values.push(group.value.clone());
        }
        values.extend(self.metrics.iter().map(|column| column.value.to_string()));
        values
    }
}

impl Serialize for AggregateRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = 2 + usize::from(self.group.is_some()) + self.metrics.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("start", &format_time(&self.start))?;
        map.serialize_entry("end", &format_time(&self.end))?;
        if let Some(group) = &self.group {
            map.serialize_entry(&group.column, &group.value)?;
        }
        for column in &self.metrics {
            map.serialize_entry(&column.name, &column.value)?;
        }
        map.end()
    }
}

/// Timestamp rendering shared by every sink
pub fn format_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
