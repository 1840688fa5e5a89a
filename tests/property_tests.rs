//! Property-based tests for invariants using proptest
//!
//! These tests verify that certain properties hold true for all inputs:
//! - Raising a greater-than threshold never flags more rows
//! - Lowering a lower-than threshold never flags more rows
//! - Column selection and dropping are idempotent

use event_detection_engine::config::PipelineConfig;
use event_detection_engine::frame::{MetricFrame, TIME_INDEX};
use event_detection_engine::pipeline::{self, RunMode};
use event_detection_engine::point::evaluate;
use proptest::prelude::*;

const COLUMNS: [&str; 4] = ["cached_n1", "cached_n2", "free_n1", "used_n1"];

fn frame(values: &[Vec<Option<f64>>]) -> MetricFrame {
    let rows = values.first().map_or(0, Vec::len);
    let mut frame = MetricFrame::with_index(TIME_INDEX, (0..rows as i64).map(|i| i * 1_000).collect());
    for (name, column) in COLUMNS.iter().zip(values) {
        frame.push_numeric(*name, column.clone()).unwrap();
    }
    frame
}

fn columns_strategy() -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
    (1usize..20).prop_flat_map(|rows| {
        prop::collection::vec(
            prop::collection::vec(prop::option::weighted(0.9, -1e6f64..1e6), rows),
            COLUMNS.len(),
        )
    })
}

// Property: a higher "gd" threshold flags a subset of the rows
proptest! {
    #[test]
    fn prop_gd_threshold_monotonicity(
        values in columns_strategy(),
        low in -1e6f64..1e6,
        delta in 0.0f64..1e6,
    ) {
        let frame = frame(&values);
        let high = low + delta;

        let at_low = evaluate(&frame, "cached", low, false);
        let at_high = evaluate(&frame, "cached", high, false);

        prop_assert!(at_high.len() <= at_low.len());
        for record in &at_high {
            prop_assert!(at_low.contains(record));
        }
    }
}

// Property: a lower "ld" threshold flags a subset of the rows
proptest! {
    #[test]
    fn prop_ld_threshold_monotonicity(
        values in columns_strategy(),
        high in -1e6f64..1e6,
        delta in 0.0f64..1e6,
    ) {
        let frame = frame(&values);
        let low = high - delta;

        let at_high = evaluate(&frame, "free", high, true);
        let at_low = evaluate(&frame, "free", low, true);

        prop_assert!(at_low.len() <= at_high.len());
    }
}

// Property: only columns named after the metric are flagged
proptest! {
    #[test]
    fn prop_flagged_kind_matches_metric(values in columns_strategy(), threshold in -1e6f64..1e6) {
        let frame = frame(&values);
        for record in evaluate(&frame, "cached", threshold, false) {
            let kind = record.kind.unwrap_or_default();
            prop_assert!(kind.starts_with("cached_"));
        }
    }
}

// Property: running the selection and drop stages twice changes nothing
proptest! {
    #[test]
    fn prop_pipeline_idempotence(
        values in columns_strategy(),
        keep in prop::sample::subsequence(COLUMNS.to_vec(), 0..=COLUMNS.len()),
        drop in prop::sample::subsequence(COLUMNS.to_vec(), 0..=COLUMNS.len()),
    ) {
        let config = PipelineConfig {
            columns: Some(keep.iter().map(|c| c.to_string()).collect()),
            drop: Some(drop.iter().map(|c| c.to_string()).collect()),
            ..Default::default()
        };

        let once = pipeline::apply(frame(&values), &config, None, RunMode::Train, None, None).unwrap();
        let twice = pipeline::apply(once.frame.clone(), &config, None, RunMode::Train, None, None).unwrap();

        prop_assert_eq!(once.frame, twice.frame);
    }
}
