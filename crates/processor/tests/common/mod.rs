//! Shared fixtures for the integration tests
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use processor::aggregation::Metric;
use processor::config::{AggregationSpec, SinkConfig};
use processor::core::{Enricher, EventParser, GroupBy, IngestedEvent};
use sales_kpi_types::{parse_timestamp, AggregateRecord};

/// Invoice payload with a single line item worth `cost`
pub fn payload(invoice: i64, country: &str, timestamp: &str, kind: &str, cost: f64) -> Vec<u8> {
    serde_json::json!({
        "invoice_no": invoice,
        "country": country,
        "timestamp": timestamp,
        "type": kind,
        "items": [
            {"SKU": "21485", "title": "HOT WATER BOTTLE", "unit_price": cost, "quantity": 1}
        ]
    })
    .to_string()
    .into_bytes()
}

/// Parse and enrich a payload the way the executor does
pub fn ingested(
    offset: i64,
    country: &str,
    timestamp: &str,
    kind: &str,
    cost: f64,
) -> IngestedEvent {
    let sales = EventParser::new()
        .parse(&payload(offset, country, timestamp, kind, cost))
        .unwrap();
    IngestedEvent::new(0, offset, Enricher::new().enrich(sales))
}

pub fn at(timestamp: &str) -> DateTime<Utc> {
    parse_timestamp(timestamp).unwrap()
}

/// One-minute windows over time only
pub fn time_spec(id: &str) -> AggregationSpec {
    AggregationSpec::new(
        id,
        vec![
            Metric::TotalVolumeOfSales,
            Metric::AverageTransactionSize,
            Metric::RateOfReturn,
        ],
        SinkConfig::Console { truncate: false },
    )
}

/// One-minute windows per country
pub fn country_spec(id: &str) -> AggregationSpec {
    AggregationSpec {
        group_by: GroupBy::Country,
        ..AggregationSpec::new(
            id,
            vec![
                Metric::TotalVolumeOfSales,
                Metric::OrdersPerMinute,
                Metric::RateOfReturn,
            ],
            SinkConfig::Console { truncate: false },
        )
    }
}

/// `(country, timestamp, type, cost)` rows spread over several minutes,
/// with two events arriving after their window closed
pub const SALES_LOG: [(&str, &str, &str, f64); 12] = [
    ("United Kingdom", "2020-11-20 05:00:10", "ORDER", 20.0),
    ("France", "2020-11-20 05:00:35", "ORDER", 12.0),
    ("United Kingdom", "2020-11-20 05:01:05", "RETURN", 4.0),
    ("Germany", "2020-11-20 05:00:50", "ORDER", 8.0),
    ("France", "2020-11-20 05:02:20", "ORDER", 16.0),
    ("United Kingdom", "2020-11-20 05:03:40", "ORDER", 30.0),
    ("Germany", "2020-11-20 05:00:15", "ORDER", 99.0),
    ("France", "2020-11-20 05:04:10", "RETURN", 6.0),
    ("United Kingdom", "2020-11-20 05:04:55", "ORDER", 10.0),
    ("Germany", "2020-11-20 05:05:30", "ORDER", 14.0),
    ("France", "2020-11-20 05:02:05", "ORDER", 77.0),
    ("United Kingdom", "2020-11-20 05:09:00", "ORDER", 1.0),
];

pub fn sales_log_events() -> Vec<IngestedEvent> {
    SALES_LOG
        .iter()
        .enumerate()
        .map(|(offset, (country, timestamp, kind, cost))| {
            ingested(offset as i64, country, timestamp, kind, *cost)
        })
        .collect()
}

pub fn sales_log_payloads() -> Vec<Vec<u8>> {
    SALES_LOG
        .iter()
        .enumerate()
        .map(|(offset, (country, timestamp, kind, cost))| {
            payload(offset as i64, country, timestamp, kind, *cost)
        })
        .collect()
}

/// Records in a stable order for comparison
pub fn sorted(mut records: Vec<AggregateRecord>) -> Vec<AggregateRecord> {
    records.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.group_value().cmp(&b.group_value()))
    });
    records
}
