// SPDX-License-Identifier: MIT

//! Invariants of the emissions model and period aggregation, checked over
//! the public library API.

use chrono::{DateTime, Duration, Utc};
use commute_tracker::models::commute::{CommuteEntry, TransportType};
use commute_tracker::models::stats::{aggregate, compute_streak, Period};
use commute_tracker::services::EmissionsModel;
use commute_tracker::time_utils::{format_utc_rfc3339, offset_from_minutes};

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn logged_entry(
    model: &EmissionsModel,
    date: DateTime<Utc>,
    mode: TransportType,
    distance_km: f64,
) -> CommuteEntry {
    CommuteEntry {
        id: format!("u1_{}", date.timestamp_millis()),
        user_id: "u1".to_string(),
        date: format_utc_rfc3339(date),
        transport_type: mode,
        distance_km,
        co2_saved_kg: model.co2_savings_kg(mode, distance_km),
        duration_minutes: None,
    }
}

#[test]
fn test_electric_vehicle_end_to_end_example() {
    let model = EmissionsModel::default();
    let now = utc("2024-06-15T12:00:00Z");
    let entry = logged_entry(&model, now, TransportType::ElectricVehicle, 10.0);

    assert!((entry.co2_saved_kg - 1.8).abs() < 1e-9);
    assert!((model.equivalent_trees(entry.co2_saved_kg) - 0.0818).abs() < 1e-4);
    assert!((model.equivalent_miles(entry.co2_saved_kg) - 9.0).abs() < 1e-9);

    let stats = aggregate(&[entry], Period::Week, now, offset_from_minutes(0));
    assert!((stats.total_co2_saved_kg - 1.8).abs() < 1e-9);
    assert_eq!(stats.daily.len(), 1);
}

#[test]
fn test_daily_partition_is_exhaustive_and_non_overlapping() {
    let model = EmissionsModel::default();
    let now = utc("2024-06-15T12:00:00Z");

    // Mixed modes and hours across the whole window, plus some entries
    // outside it.
    let entries: Vec<CommuteEntry> = (0..120)
        .map(|i| {
            logged_entry(
                &model,
                now - Duration::hours(i * 9),
                TransportType::ALL[(i % 5) as usize],
                0.5 + (i % 11) as f64,
            )
        })
        .collect();

    for period in [Period::Week, Period::Month] {
        let stats = aggregate(&entries, period, now, offset_from_minutes(0));

        let cutoff = period.cutoff(now);
        let in_period: Vec<&CommuteEntry> = entries
            .iter()
            .filter(|e| e.parsed_date().unwrap() >= cutoff)
            .collect();

        let expected_co2: f64 = in_period.iter().map(|e| e.co2_saved_kg).sum();
        let daily_co2: f64 = stats.daily.iter().map(|d| d.co2_saved_kg).sum();
        assert!((daily_co2 - stats.total_co2_saved_kg).abs() < 1e-9);
        assert!((stats.total_co2_saved_kg - expected_co2).abs() < 1e-9);

        // Feeding the transport breakdown counts back into a sum equals
        // the number of entries in the period.
        let transport_trips: u32 = stats.by_transport.iter().map(|t| t.trips).sum();
        assert_eq!(transport_trips as usize, in_period.len());
        assert_eq!(stats.hourly_trips.iter().sum::<u32>() as usize, in_period.len());
    }
}

#[test]
fn test_peak_hour_resolves_ties_to_lowest_hour() {
    let model = EmissionsModel::default();
    let now = utc("2024-06-15T23:00:00Z");

    let mut entries = Vec::new();
    for d in 12..=14 {
        for hour in [9, 14] {
            entries.push(logged_entry(
                &model,
                utc(&format!("2024-06-{d}T{hour:02}:10:00Z")),
                TransportType::Walking,
                1.0,
            ));
        }
    }

    let stats = aggregate(&entries, Period::Week, now, offset_from_minutes(0));
    let peak = stats.peak_hour.unwrap();
    assert_eq!((peak.hour, peak.trips), (9, 3));
}

#[test]
fn test_empty_input_has_no_divide_by_zero() {
    for period in [Period::Week, Period::Month] {
        let stats = aggregate(&[], period, utc("2024-06-15T12:00:00Z"), offset_from_minutes(0));
        assert_eq!(stats.average_co2_per_day_kg, 0.0);
        assert!(stats.daily.is_empty());
        assert!(stats.by_transport.is_empty());
        assert!(stats.peak_hour.is_none());
    }
}

#[test]
fn test_streak_gap_scenario() {
    let today = "2024-06-15".parse().unwrap();
    // Entries today, yesterday and three days ago; the gap two days ago
    // stops the count at 2.
    let dates = vec![
        "2024-06-15".parse().unwrap(),
        "2024-06-14".parse().unwrap(),
        "2024-06-12".parse().unwrap(),
    ];
    assert_eq!(compute_streak(&dates, today), 2);
}

#[test]
fn test_savings_never_negative_across_grid() {
    let model = EmissionsModel::default();
    for mode in TransportType::ALL {
        for step in 0..50 {
            let distance = step as f64 * 1.37;
            assert!(model.co2_savings_kg(mode, distance) >= 0.0);
        }
    }
}
