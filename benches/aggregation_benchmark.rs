use chrono::{DateTime, Duration, Utc};
use commute_tracker::models::commute::{CommuteEntry, TransportType};
use commute_tracker::models::stats::{aggregate, Period};
use commute_tracker::time_utils::{format_utc_rfc3339, offset_from_minutes};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Synthetic commute log spread over ~45 days, so the week window filters
/// most entries and the month window keeps most of them.
fn synthetic_entries(count: usize, now: DateTime<Utc>) -> Vec<CommuteEntry> {
    (0..count)
        .map(|i| {
            let minutes_back = (i * 13) as i64 % (60 * 24 * 45);
            let ts = now - Duration::minutes(minutes_back);
            let distance = 0.5 + (i % 20) as f64 * 0.7;
            CommuteEntry {
                id: format!("bench_{}", i),
                user_id: "bench".to_string(),
                date: format_utc_rfc3339(ts),
                transport_type: TransportType::ALL[i % 5],
                distance_km: distance,
                co2_saved_kg: distance * 0.18,
                duration_minutes: Some(15.0),
            }
        })
        .collect()
}

fn benchmark_aggregate(c: &mut Criterion) {
    let now = DateTime::parse_from_rfc3339("2024-06-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let entries = synthetic_entries(10_000, now);
    let offset = offset_from_minutes(-480);

    let mut group = c.benchmark_group("period_aggregation");

    group.bench_function("week_10k_entries", |b| {
        b.iter(|| aggregate(black_box(&entries), Period::Week, now, offset))
    });

    group.bench_function("month_10k_entries", |b| {
        b.iter(|| aggregate(black_box(&entries), Period::Month, now, offset))
    });

    group.finish();
}

criterion_group!(benches, benchmark_aggregate);
criterion_main!(benches);
