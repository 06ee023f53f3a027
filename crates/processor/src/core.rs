//! Core event processing structures
//!
//! This module provides the fundamental types every pipeline shares:
//! - [`EventParser`]: raw payload to [`SalesEvent`]
//! - [`Enricher`]: derived columns for an event
//! - [`GroupBy`]: the optional dimension a pipeline groups windows by
//! - [`IngestedEvent`]: an enriched event with its source position

use crate::error::{ParseFailure, ParseFailureReason};
use sales_kpi_types::{EnrichedEvent, GroupValue, SalesEvent};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::fmt;
use std::sync::Arc;

/// Turns raw source payloads into typed events
///
/// Stateless; a single parser is shared by the ingestion loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventParser;

impl EventParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one JSON payload
    ///
    /// Unknown fields are ignored. Never panics; every failure carries the
    /// original payload.
    pub fn parse(&self, payload: &[u8]) -> Result<SalesEvent, ParseFailure> {
        let failure = |reason: ParseFailureReason, detail: String| ParseFailure {
            payload: payload.to_vec(),
            reason,
            detail,
        };

        let text = std::str::from_utf8(payload)
            .map_err(|e| failure(ParseFailureReason::Malformed, format!("invalid UTF-8: {}", e)))?;

        let event = serde_json::from_str::<SalesEvent>(text).map_err(|e| {
            let reason = classify(&e);
            failure(reason, e.to_string())
        })?;

        if event.checked_total_items().is_none() {
            return Err(failure(
                ParseFailureReason::TypeCoercion,
                "sum of item quantities overflows i64".to_string(),
            ));
        }
        if !event.gross_total().is_finite() {
            return Err(failure(
                ParseFailureReason::TypeCoercion,
                "invoice total is not a finite number".to_string(),
            ));
        }

        Ok(event)
    }
}

/// Map a serde_json error onto the parse failure taxonomy
fn classify(err: &serde_json::Error) -> ParseFailureReason {
    match err.classify() {
        Category::Syntax | Category::Eof | Category::Io => ParseFailureReason::Malformed,
        Category::Data => {
            let message = err.to_string();
            if message.starts_with("missing field")
                || message.starts_with("unknown variant")
                || message.contains("expected struct")
            {
                ParseFailureReason::SchemaMismatch
            } else {
                ParseFailureReason::TypeCoercion
            }
        }
    }
}

/// Computes the derived columns of each event
#[derive(Debug, Clone, Copy, Default)]
pub struct Enricher;

impl Enricher {
    pub fn new() -> Self {
        Self
    }

    pub fn enrich(&self, event: SalesEvent) -> EnrichedEvent {
        EnrichedEvent::enrich(event)
    }
}

/// Dimension a pipeline groups its windows by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Time-only windows
    #[default]
    None,
    /// One aggregate per window and country
    Country,
}

impl GroupBy {
    /// Output column name, `None` for time-only pipelines
    pub fn column(&self) -> Option<&'static str> {
        match self {
            GroupBy::None => None,
            GroupBy::Country => Some("country"),
        }
    }

    /// Group value of an event
    pub fn extract(&self, event: &EnrichedEvent) -> Option<String> {
        match self {
            GroupBy::None => None,
            GroupBy::Country => Some(event.country().to_string()),
        }
    }

    /// Output column for a group value
    pub fn group_value(&self, value: Option<&str>) -> Option<GroupValue> {
        match (self.column(), value) {
            (Some(column), Some(value)) => Some(GroupValue {
                column: column.to_string(),
                value: value.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::None => f.write_str("none"),
            GroupBy::Country => f.write_str("country"),
        }
    }
}

/// An enriched event together with where it was read from
///
/// The event is shared between every pipeline it is broadcast to.
#[derive(Debug, Clone)]
pub struct IngestedEvent {
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// The enriched event
    pub event: Arc<EnrichedEvent>,
}

impl IngestedEvent {
    pub fn new(partition: i32, offset: i64, event: EnrichedEvent) -> Self {
        Self {
            partition,
            offset,
            event: Arc::new(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sales_kpi_types::EventType;

    const ORDER: &str = r#"{
        "invoice_no": 154132541653705,
        "country": "United Kingdom",
        "timestamp": "2020-11-20 05:37:52",
        "type": "ORDER",
        "items": [
            {"SKU": "21485", "title": "RETROSPOT HEART HOT WATER BOTTLE", "unit_price": 4.95, "quantity": 6},
            {"SKU": "23499", "title": "SET 12 HEART DECORATIONS", "unit_price": 2.0, "quantity": 1}
        ],
        "total_items": 7
    }"#;

    fn parse(payload: &str) -> Result<SalesEvent, ParseFailure> {
        EventParser::new().parse(payload.as_bytes())
    }

    #[test]
    fn test_parse_valid_order() {
        let event = parse(ORDER).unwrap();

        assert_eq!(event.invoice_no, 154132541653705);
        assert_eq!(event.country, "United Kingdom");
        assert_eq!(event.event_type, EventType::Order);
        assert_eq!(event.items.len(), 2);
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2020, 11, 20, 5, 37, 52).unwrap()
        );
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let payload = ORDER.replace("2020-11-20 05:37:52", "2020-11-20T05:37:52.250Z");
        let event = parse(&payload).unwrap();
        assert_eq!(event.timestamp.timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse("{\"invoice_no\": ").unwrap_err();
        assert_eq!(err.reason, ParseFailureReason::Malformed);
        assert_eq!(err.payload, b"{\"invoice_no\": ".to_vec());

        let err = EventParser::new().parse(&[0x7b, 0xff, 0xfe]).unwrap_err();
        assert_eq!(err.reason, ParseFailureReason::Malformed);
    }

    #[test]
    fn test_parse_missing_field() {
        let err = parse(r#"{"invoice_no": 1, "country": "France", "type": "ORDER", "items": []}"#)
            .unwrap_err();
        assert_eq!(err.reason, ParseFailureReason::SchemaMismatch);
        assert!(err.detail.contains("timestamp"));
    }

    #[test]
    fn test_parse_unknown_event_type() {
        let payload = ORDER.replace("\"ORDER\"", "\"REFUND\"");
        assert_eq!(
            parse(&payload).unwrap_err().reason,
            ParseFailureReason::SchemaMismatch
        );
    }

    #[test]
    fn test_parse_type_coercion() {
        let payload = ORDER.replace("154132541653705", "\"not-a-number\"");
        assert_eq!(
            parse(&payload).unwrap_err().reason,
            ParseFailureReason::TypeCoercion
        );

        let payload = ORDER.replace("2020-11-20 05:37:52", "yesterday");
        assert_eq!(
            parse(&payload).unwrap_err().reason,
            ParseFailureReason::TypeCoercion
        );
    }

    #[test]
    fn test_parse_rejects_quantity_overflow() {
        let payload = r#"{
            "invoice_no": 1,
            "country": "France",
            "timestamp": "2020-11-20 05:37:52",
            "type": "ORDER",
            "items": [
                {"SKU": "1", "title": "A", "unit_price": 1.0, "quantity": 9223372036854775807},
                {"SKU": "2", "title": "B", "unit_price": 1.0, "quantity": 9223372036854775807}
            ]
        }"#;

        let err = parse(payload).unwrap_err();
        assert_eq!(err.reason, ParseFailureReason::TypeCoercion);
        assert!(err.detail.contains("overflows"));

        let single = payload.replacen("9223372036854775807", "0", 1);
        let event = parse(&single).unwrap();
        assert_eq!(Enricher::new().enrich(event).total_items, i64::MAX);
    }

    #[test]
    fn test_parse_rejects_infinite_total() {
        let payload = ORDER.replace("\"unit_price\": 4.95", "\"unit_price\": 1e308");
        let err = parse(&payload).unwrap_err();
        assert_eq!(err.reason, ParseFailureReason::TypeCoercion);
        assert!(err.detail.contains("finite"));
    }

    #[test]
    fn test_enricher_and_group_by() {
        let enriched = Enricher::new().enrich(parse(ORDER).unwrap());
        assert_eq!(enriched.total_items, 7);
        assert!((enriched.total_cost - 31.7).abs() < 1e-9);

        assert_eq!(GroupBy::None.extract(&enriched), None);
        assert_eq!(
            GroupBy::Country.extract(&enriched).as_deref(),
            Some("United Kingdom")
        );
        assert_eq!(
            GroupBy::Country.group_value(Some("France")),
            Some(GroupValue {
                column: "country".to_string(),
                value: "France".to_string(),
            })
        );
        assert_eq!(GroupBy::None.group_value(Some("France")), None);
    }
}
