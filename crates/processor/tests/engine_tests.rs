//! Window aggregation engine tests
//!
//! Covers the retail scenarios end to end through parsing, enrichment,
//! windowing and sealing, plus the ordering and lateness properties the
//! engine guarantees.

mod common;

use common::*;
use processor::pipeline::{IngestOutcome, WindowAggregationEngine};
use processor::state::AggregateKey;
use sales_kpi_types::{AggregateRecord, MetricValue};

fn seal_all(engine: &mut WindowAggregationEngine) -> Vec<AggregateRecord> {
    let batch = engine.prepare_seal().unwrap();
    engine.complete_seal(&batch);
    batch.records
}

// ============================================================================
// Retail scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[test]
    fn test_time_wise_window_seals_after_lateness() {
        let mut engine = WindowAggregationEngine::new(&time_spec("time_wise_kpi")).unwrap();

        engine
            .ingest(&ingested(0, "US", "2020-11-20 00:00:10", "ORDER", 100.0))
            .unwrap();
        engine
            .ingest(&ingested(1, "US", "2020-11-20 00:00:40", "RETURN", 30.0))
            .unwrap();
        assert!(engine.prepare_seal().unwrap().is_empty());

        engine
            .ingest(&ingested(2, "UK", "2020-11-20 01:00:05", "ORDER", 50.0))
            .unwrap();
        let records = seal_all(&mut engine);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.start, at("2020-11-20 00:00:00"));
        assert_eq!(record.end, at("2020-11-20 00:01:00"));
        assert_eq!(record.group, None);
        assert_eq!(
            record.metric("total_volume_of_sales"),
            Some(MetricValue::Float(70.0))
        );
        assert_eq!(
            record.metric("average_transaction_size"),
            Some(MetricValue::Float(35.0))
        );
        assert_eq!(record.metric("rate_of_return"), Some(MetricValue::Float(0.5)));

        // The 01:00 window is still open
        assert_eq!(engine.open_windows(), 1);
    }

    #[test]
    fn test_country_groups_seal_independently() {
        let mut engine =
            WindowAggregationEngine::new(&country_spec("time_country_wise_kpi")).unwrap();

        engine
            .ingest(&ingested(0, "US", "2020-11-20 00:00:10", "ORDER", 100.0))
            .unwrap();
        engine
            .ingest(&ingested(1, "US", "2020-11-20 00:00:40", "RETURN", 30.0))
            .unwrap();
        engine
            .ingest(&ingested(2, "UK", "2020-11-20 01:00:05", "ORDER", 50.0))
            .unwrap();

        let first = seal_all(&mut engine);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].group_value(), Some("US"));
        assert_eq!(
            first[0].metric("total_volume_of_sales"),
            Some(MetricValue::Float(70.0))
        );
        assert_eq!(first[0].metric("OPM"), Some(MetricValue::Integer(2)));
        assert_eq!(first[0].metric("rate_of_return"), Some(MetricValue::Float(0.5)));

        engine
            .ingest(&ingested(3, "US", "2020-11-20 01:02:30", "ORDER", 1.0))
            .unwrap();
        let second = seal_all(&mut engine);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].group_value(), Some("UK"));
        assert_eq!(second[0].start, at("2020-11-20 01:00:00"));
        assert_eq!(
            second[0].metric("total_volume_of_sales"),
            Some(MetricValue::Float(50.0))
        );
        assert_eq!(second[0].metric("OPM"), Some(MetricValue::Integer(1)));
        assert_eq!(second[0].metric("rate_of_return"), Some(MetricValue::Float(0.0)));
    }

    #[test]
    fn test_late_event_is_not_amended() {
        let mut engine = WindowAggregationEngine::new(&time_spec("time_wise_kpi")).unwrap();

        engine
            .ingest(&ingested(0, "US", "2020-11-20 00:00:20", "ORDER", 10.0))
            .unwrap();
        engine
            .ingest(&ingested(1, "US", "2020-11-20 00:02:30", "ORDER", 10.0))
            .unwrap();
        assert_eq!(engine.watermark().timestamp, at("2020-11-20 00:01:30").timestamp_millis());

        let sealed = seal_all(&mut engine);
        assert_eq!(sealed.len(), 1);

        let outcome = engine
            .ingest(&ingested(2, "US", "2020-11-20 00:00:05", "ORDER", 500.0))
            .unwrap();
        assert_eq!(outcome, IngestOutcome::LateDropped);
        assert_eq!(engine.stats().late_dropped, 1);
        assert!(engine.prepare_seal().unwrap().is_empty());
        assert_eq!(engine.open_windows(), 1);
    }
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;

    #[test]
    fn test_merge_order_does_not_matter() {
        let window_events = [
            ("France", "2020-11-20 05:00:05", "ORDER", 3.0),
            ("France", "2020-11-20 05:00:20", "RETURN", 7.0),
            ("Spain", "2020-11-20 05:00:31", "ORDER", 11.0),
            ("France", "2020-11-20 05:00:47", "ORDER", 2.0),
            ("Spain", "2020-11-20 05:00:59", "RETURN", 5.0),
        ];

        let run = |order: &[usize]| {
            let mut engine = WindowAggregationEngine::new(&country_spec("kpi")).unwrap();
            for (offset, index) in order.iter().enumerate() {
                let (country, timestamp, kind, cost) = window_events[*index];
                let outcome = engine
                    .ingest(&ingested(offset as i64, country, timestamp, kind, cost))
                    .unwrap();
                assert_eq!(outcome, IngestOutcome::Merged);
            }
            engine
                .ingest(&ingested(9, "France", "2020-11-20 05:03:00", "ORDER", 1.0))
                .unwrap();
            sorted(seal_all(&mut engine))
        };

        let forward = run(&[0, 1, 2, 3, 4]);
        let backward = run(&[4, 3, 2, 1, 0]);
        let shuffled = run(&[2, 0, 4, 1, 3]);

        assert_eq!(forward.len(), 2);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_every_event_counted_in_its_own_window() {
        let mut engine = WindowAggregationEngine::new(&country_spec("kpi")).unwrap();
        let seconds = [0, 59, 5, 60, 61, 65, 119, 120, 125, 179];

        for (offset, second) in seconds.iter().enumerate() {
            let timestamp = format!("2020-11-20 06:{:02}:{:02}", second / 60, second % 60);
            engine
                .ingest(&ingested(offset as i64, "France", &timestamp, "ORDER", 1.0))
                .unwrap();
        }
        engine
            .ingest(&ingested(99, "France", "2020-11-20 06:10:00", "ORDER", 1.0))
            .unwrap();

        let records = sorted(seal_all(&mut engine));
        let counts: Vec<(i64, MetricValue)> = records
            .iter()
            .map(|record| {
                let minute = (record.start - at("2020-11-20 06:00:00")).num_minutes();
                (minute, record.metric("OPM").unwrap())
            })
            .collect();

        assert_eq!(
            counts,
            vec![
                (0, MetricValue::Integer(3)),
                (1, MetricValue::Integer(4)),
                (2, MetricValue::Integer(3)),
            ]
        );
        for record in &records {
            assert_eq!((record.end - record.start).num_seconds(), 60);
        }
    }

    #[test]
    fn test_no_record_before_watermark_passes_end() {
        let mut engine = WindowAggregationEngine::new(&time_spec("kpi")).unwrap();

        for event in sales_log_events() {
            engine.ingest(&event).unwrap();
            for record in seal_all(&mut engine) {
                assert!(
                    engine.watermark().timestamp >= record.end.timestamp_millis(),
                    "record for {} emitted at {}",
                    record.end,
                    engine.watermark()
                );
            }
        }
    }

    #[test]
    fn test_late_drop_is_idempotent() {
        let mut engine = WindowAggregationEngine::new(&time_spec("kpi")).unwrap();
        engine
            .ingest(&ingested(0, "US", "2020-11-20 00:00:50", "ORDER", 10.0))
            .unwrap();
        engine
            .ingest(&ingested(1, "US", "2020-11-20 00:01:10", "ORDER", 10.0))
            .unwrap();
        engine
            .ingest(&ingested(2, "US", "2020-11-20 00:02:00", "ORDER", 10.0))
            .unwrap();

        // [00:00, 00:01) is closed but not yet sealed
        let key = AggregateKey::new(at("2020-11-20 00:00:00").timestamp_millis(), None);
        let before = engine.store().snapshot(&key).unwrap();

        let late = ingested(3, "US", "2020-11-20 00:00:30", "ORDER", 1000.0);
        assert_eq!(engine.ingest(&late).unwrap(), IngestOutcome::LateDropped);
        assert_eq!(engine.ingest(&late).unwrap(), IngestOutcome::LateDropped);
        assert_eq!(engine.stats().late_dropped, 2);
        assert_eq!(engine.store().snapshot(&key).unwrap(), before);

        let records = seal_all(&mut engine);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].metric("total_volume_of_sales"),
            Some(MetricValue::Float(10.0))
        );
    }

    #[test]
    fn test_sales_log_windows() {
        let mut engine = WindowAggregationEngine::new(&time_spec("kpi")).unwrap();
        let outcomes: Vec<IngestOutcome> = sales_log_events()
            .iter()
            .map(|event| engine.ingest(event).unwrap())
            .collect();

        assert_eq!(outcomes[6], IngestOutcome::LateDropped);
        assert_eq!(outcomes[10], IngestOutcome::LateDropped);
        assert_eq!(engine.stats().merged, 10);

        let volumes: Vec<f64> = sorted(seal_all(&mut engine))
            .iter()
            .map(|record| record.metric("total_volume_of_sales").unwrap().as_f64())
            .collect();
        assert_eq!(volumes, vec![40.0, -4.0, 16.0, 30.0, 4.0, 14.0]);
        assert_eq!(engine.open_windows(), 1);
    }
}
