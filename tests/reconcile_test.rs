//! Series reconciliation tests using REST-shaped candle payloads.

use rust_decimal_macros::dec;
use serde_json::json;

use coinscope::models::{Candle, decode_series};
use coinscope::reconcile::{ChartMode, SeriesReconciler, reconcile};

fn history() -> Vec<Candle> {
    decode_series(&json!([[100, 10, 11, 9, 10], [200, 11, 12, 10, 11]]))
        .expect("Failed to decode historical series")
}

fn live(raw: serde_json::Value) -> Candle {
    Candle::from_tuple(&raw).expect("Failed to decode live candle")
}

#[test]
fn test_live_candle_replaces_last_bucket() {
    let live = live(json!([200, 11, 13, 10, 12]));
    let series = reconcile(&history(), Some(&live));

    assert_eq!(series.len(), 2);
    assert_eq!(series[1], Candle::new(200, dec!(11), dec!(13), dec!(10), dec!(12)));
    assert_eq!(series[0].close, dec!(10));
}

#[test]
fn test_live_candle_appends_new_bucket() {
    let live = live(json!([300, 12, 12, 12, 12]));
    let series = reconcile(&history(), Some(&live));

    let times: Vec<i64> = series.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![100, 200, 300]);
}

#[test]
fn test_output_is_sorted_and_unique() {
    let unordered = decode_series(&json!([
        [300, 3, 3, 3, 3],
        [100, 1, 1, 1, 1],
        [200, 2, 2, 2, 2],
        [100, 9, 9, 9, 9],
    ]))
    .expect("Failed to decode series");
    let live = live(json!([150, 5, 5, 5, 5]));

    let series = reconcile(&unordered, Some(&live));

    let times: Vec<i64> = series.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![100, 150, 200, 300]);
    // the later duplicate wins
    assert_eq!(series[0].close, dec!(9));
}

#[test]
fn test_millisecond_timestamps_are_normalized() {
    let historical = decode_series(&json!([[1_700_000_000_000_i64, 1, 1, 1, 1]]))
        .expect("Failed to decode series");
    let live = live(json!([1_700_000_000, 1, 2, 1, 2]));

    let series = reconcile(&historical, Some(&live));

    assert_eq!(series.len(), 1);
    assert_eq!(series[0].time, 1_700_000_000);
    assert_eq!(series[0].close, dec!(2));
}

#[test]
fn test_empty_history_yields_live_candle() {
    let live = live(json!([100, 1, 2, 0.5, 1.5]));
    assert_eq!(reconcile(&[], Some(&live)), vec![live]);
    assert!(reconcile(&[], None).is_empty());
}

#[test]
fn test_nested_payload_is_unwrapped_once() {
    let nested = decode_series(&json!([[[100, 10, 11, 9, 10], [200, 11, 12, 10, 11]]]))
        .expect("One extra level is tolerated");
    assert_eq!(nested, history());

    let err = decode_series(&json!([[[[100, 10, 11, 9, 10]]]])).unwrap_err();
    assert!(err.to_string().contains("too deep"), "unexpected error: {err}");
}

#[test]
fn test_live_chart_refits_when_bucket_count_changes() {
    let mut chart = SeriesReconciler::new(ChartMode::Live);
    assert!(chart.set_historical(history(), ChartMode::Live).refit);

    let same_bucket = chart.apply_live(live(json!([200, 11, 13, 10, 12])));
    assert!(!same_bucket.refit);
    assert_eq!(same_bucket.candles.len(), 2);

    let new_bucket = chart.apply_live(live(json!([300, 12, 12, 12, 12])));
    assert!(new_bucket.refit);
    assert_eq!(new_bucket.candles.len(), 3);
}
