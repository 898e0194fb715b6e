//! A serialized histogram must answer the same queries after a round trip.

use hdrange::Histogram;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[test]
fn json_round_trip_preserves_equality() {
    let mut h = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3).unwrap();
    let mut rng = SmallRng::seed_from_u64(0x1dea);
    for _ in 0..10_000 {
        h.record(rng.gen_range(1..3_000_000)).unwrap();
    }

    let encoded = serde_json::to_string(&h).unwrap();
    let decoded: Histogram<u64> = serde_json::from_str(&encoded).unwrap();

    assert!(decoded == h);
    assert_eq!(decoded.len(), h.len());
    assert_eq!(decoded.min(), h.min());
    assert_eq!(decoded.max(), h.max());
    for q in &[0.1, 0.5, 0.9, 0.99, 1.0] {
        assert_eq!(decoded.value_at_quantile(*q), h.value_at_quantile(*q));
    }
}

#[test]
fn json_round_trip_preserves_geometry() {
    let mut h = Histogram::<u32>::new_with_bounds(1000, 1_000_000, 2).unwrap();
    h.auto(true);
    h.record(5_000_000).unwrap(); // forces a resize first

    let encoded = serde_json::to_string(&h).unwrap();
    let decoded: Histogram<u32> = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded.low(), h.low());
    assert_eq!(decoded.high(), h.high());
    assert_eq!(decoded.sigfig(), h.sigfig());
    assert!(decoded.is_auto_resize());
    assert_eq!(decoded.distinct_values(), h.distinct_values());
    assert_eq!(decoded.count_at(5_000_000), 1);
}

#[test]
fn deserialize_rejects_forged_total_count() {
    let mut h = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
    h.record_n(500, 10).unwrap();

    let mut payload = serde_json::to_value(&h).unwrap();
    payload["total_count"] = serde_json::json!(11);

    assert!(serde_json::from_value::<Histogram<u64>>(payload).is_err());
}

#[test]
fn deserialize_rejects_truncated_counts() {
    let mut h = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
    h.record(500).unwrap();

    let mut payload = serde_json::to_value(&h).unwrap();
    payload["counts"].as_array_mut().unwrap().pop();

    assert!(serde_json::from_value::<Histogram<u64>>(payload).is_err());
}

#[test]
fn deserialize_rejects_invalid_configuration() {
    let h = Histogram::<u64>::new_with_max(100_000, 3).unwrap();

    let mut payload = serde_json::to_value(&h).unwrap();
    payload["significant_value_digits"] = serde_json::json!(9);

    assert!(serde_json::from_value::<Histogram<u64>>(payload).is_err());
}

#[test]
fn round_tripped_histogram_keeps_recording() {
    let mut h = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
    h.record_n(500, 10).unwrap();

    let encoded = serde_json::to_string(&h).unwrap();
    let mut decoded: Histogram<u64> = serde_json::from_str(&encoded).unwrap();

    decoded.record_n(500, 5).unwrap();
    assert_eq!(decoded.count_at(500), 15);
    assert_eq!(decoded.len(), 15);
}
