//! Sales event types
//!
//! A [`SalesEvent`] is one invoice as published by the point-of-sale feed.
//! [`EnrichedEvent`] adds the derived columns every KPI is computed from.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of invoice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// A purchase
    Order,
    /// A refund of previously purchased items
    Return,
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Order => "ORDER",
            EventType::Return => "RETURN",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an invoice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    /// Stock keeping unit
    #[serde(rename = "SKU")]
    pub sku: String,
    /// Product title
    pub title: String,
    /// Price of a single unit
    pub unit_price: f64,
    /// Number of units
    pub quantity: i64,
}

impl LineItem {
    /// Price of the whole line (`unit_price * quantity`)
    pub fn line_total(&self) -> f64 {
        self.unit_price * self.quantity as f64
    }
}

/// Invoice event as received from the source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesEvent {
    /// Invoice identifier
    pub invoice_no: i64,
    /// Country the invoice was issued in
    pub country: String,
    /// Event time
    #[serde(with = "event_time")]
    pub timestamp: DateTime<Utc>,
    /// Order or return
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Ordered line items
    pub items: Vec<LineItem>,
}

impl SalesEvent {
    /// Sum of line item quantities, `None` if it does not fit in an `i64`
    pub fn checked_total_items(&self) -> Option<i64> {
        self.items
            .iter()
            .try_fold(0i64, |total, item| total.checked_add(item.quantity))
    }

    /// Sum of line totals before the return sign is applied
    pub fn gross_total(&self) -> f64 {
        self.items.iter().map(LineItem::line_total).sum()
    }
}

/// Sales event with derived columns
///
/// Built once by [`EnrichedEvent::enrich`] and never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: SalesEvent,
    /// Sum of line item quantities
    pub total_items: i64,
    /// Sum of line totals, negative for returns
    pub total_cost: f64,
    /// 1 for orders, 0 otherwise
    pub is_order: u8,
    /// 1 for returns, 0 otherwise
    pub is_return: u8,
}

impl EnrichedEvent {
    /// Compute the derived columns of an event
    ///
    /// `total_items` saturates at the `i64` bounds; the parser rejects such
    /// events before they are enriched.
    pub fn enrich(event: SalesEvent) -> Self {
        let total_items = event
            .items
            .iter()
            .fold(0i64, |total, item| total.saturating_add(item.quantity));
        let gross = event.gross_total();
        let total_cost = match event.event_type {
            EventType::Order => gross,
            EventType::Return => -gross,
        };
        let is_order = u8::from(event.event_type == EventType::Order);
        let is_return = u8::from(event.event_type == EventType::Return);

        Self {
            event,
            total_items,
            total_cost,
            is_order,
            is_return,
        }
    }

    /// Event time of the underlying invoice
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.event.timestamp
    }

    pub fn country(&self) -> &str {
        &self.event.country
    }

    pub fn invoice_no(&self) -> i64 {
        self.event.invoice_no
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type
    }
}

/// Serde adapter for invoice timestamps
///
/// Accepts RFC 3339 strings as well as the feed's `YYYY-MM-DD HH:MM:SS[.fff]`
/// form, which is taken to be UTC. Always writes the feed form.
pub mod event_time {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FEED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FEED_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

/// Parse an invoice timestamp in any accepted form
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(unit_price: f64, quantity: i64) -> LineItem {
        LineItem {
            sku: "SKU-1".to_string(),
            title: "Mug".to_string(),
            unit_price,
            quantity,
        }
    }

    fn event(event_type: EventType, items: Vec<LineItem>) -> SalesEvent {
        SalesEvent {
            invoice_no: 154132541653705,
            country: "United Kingdom".to_string(),
            timestamp: Utc.with_ymd_and_hms(2020, 11, 20, 5, 37, 52).unwrap(),
            event_type,
            items,
        }
    }

    #[test]
    fn test_enrich_order() {
        let enriched = EnrichedEvent::enrich(event(
            EventType::Order,
            vec![item(2.5, 4), item(10.0, 1)],
        ));

        assert_eq!(enriched.total_items, 5);
        assert_eq!(enriched.total_cost, 20.0);
        assert_eq!(enriched.is_order, 1);
        assert_eq!(enriched.is_return, 0);
    }

    #[test]
    fn test_enrich_return_negates_cost() {
        let enriched = EnrichedEvent::enrich(event(EventType::Return, vec![item(7.5, 2)]));

        assert_eq!(enriched.total_items, 2);
        assert_eq!(enriched.total_cost, -15.0);
        assert_eq!(enriched.is_order, 0);
        assert_eq!(enriched.is_return, 1);
    }

    #[test]
    fn test_enrich_without_items() {
        let enriched = EnrichedEvent::enrich(event(EventType::Order, vec![]));
        assert_eq!(enriched.total_items, 0);
        assert_eq!(enriched.total_cost, 0.0);
    }

    #[test]
    fn test_total_items_overflow() {
        let huge = event(EventType::Order, vec![item(1.0, i64::MAX), item(1.0, i64::MAX)]);
        assert_eq!(huge.checked_total_items(), None);

        let enriched = EnrichedEvent::enrich(huge);
        assert_eq!(enriched.total_items, i64::MAX);

        let small = event(EventType::Order, vec![item(1.0, 3), item(1.0, -1)]);
        assert_eq!(small.checked_total_items(), Some(2));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2020, 11, 20, 5, 37, 52).unwrap();

        assert_eq!(parse_timestamp("2020-11-20 05:37:52"), Some(expected));
        assert_eq!(parse_timestamp("2020-11-20T05:37:52Z"), Some(expected));
        assert_eq!(parse_timestamp("2020-11-20T07:37:52+02:00"), Some(expected));
        assert_eq!(parse_timestamp("20/11/2020"), None);
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{
            "invoice_no": 154132541653705,
            "country": "United Kingdom",
            "timestamp": "2020-11-20 05:37:52",
            "type": "RETURN",
            "items": [{"SKU": "21485", "title": "RETROSPOT HEART HOT WATER BOTTLE", "unit_price": 4.95, "quantity": 6}]
        }"#;

        let parsed: SalesEvent = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.event_type, EventType::Return);
        assert_eq!(parsed.items[0].sku, "21485");

        let written = serde_json::to_value(&parsed).unwrap();
        assert_eq!(written["timestamp"], "2020-11-20 05:37:52");
        assert_eq!(written["type"], "RETURN");
    }
}
