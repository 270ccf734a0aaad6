//! Derived commute analytics.
//!
//! Everything in this module is a pure function over an in-memory entry
//! list: the rolling-window aggregation behind the dashboard and analytics
//! views, and the consecutive-green-day streak. Nothing here is persisted;
//! callers recompute from the canonical commute log on every request.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::commute::{CommuteEntry, TransportType};
use crate::time_utils::{local_day, local_hour};

/// Rolling time window used to scope aggregation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    Month,
}

impl Period {
    /// Window length in days.
    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
        }
    }

    /// Oldest instant still inside the window ending at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }
}

/// One calendar day's worth of commutes within the period.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub entries: Vec<CommuteEntry>,
    pub co2_saved_kg: f64,
    pub distance_km: f64,
}

/// Per-transport-mode rollup.
#[derive(Debug, Clone, Serialize)]
pub struct TransportStat {
    pub transport_type: TransportType,
    pub trips: u32,
    pub co2_saved_kg: f64,
    pub distance_km: f64,
}

/// Busiest commute hour within the period.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeakHour {
    pub hour: u32,
    pub trips: u32,
}

/// Aggregated view of a period's commutes. Derived, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodStats {
    pub period: Period,
    pub total_co2_saved_kg: f64,
    pub total_distance_km: f64,
    /// Mean CO₂ saved per active day (days with at least one entry);
    /// 0 when the period is empty.
    pub average_co2_per_day_kg: f64,
    /// Daily groups, ascending by date.
    pub daily: Vec<DailyStat>,
    /// Trip count per hour of day, dense 0-23.
    pub hourly_trips: [u32; 24],
    /// `None` when the period has no entries.
    pub peak_hour: Option<PeakHour>,
    /// Per-mode rollups in [`TransportType::ALL`] order; silent modes omitted.
    pub by_transport: Vec<TransportStat>,
}

/// Aggregate `entries` over the trailing window ending at `now`.
///
/// An entry timestamped exactly at the cutoff instant is included; anything
/// strictly older is filtered out. Calendar bucketing (days and hours) uses
/// the caller-supplied local offset. Entries whose stored timestamp fails to
/// parse are skipped, mirroring how the time-series keys degrade elsewhere.
pub fn aggregate(
    entries: &[CommuteEntry],
    period: Period,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> PeriodStats {
    let cutoff = period.cutoff(now);

    let mut daily: BTreeMap<NaiveDate, DailyStat> = BTreeMap::new();
    let mut hourly_trips = [0u32; 24];
    let mut by_mode: HashMap<TransportType, TransportStat> = HashMap::new();
    let mut total_co2 = 0.0;
    let mut total_distance = 0.0;

    for entry in entries {
        let Some(ts) = entry.parsed_date() else {
            continue;
        };
        if ts < cutoff {
            continue;
        }

        total_co2 += entry.co2_saved_kg;
        total_distance += entry.distance_km;

        let day = daily.entry(local_day(ts, offset)).or_insert_with(|| DailyStat {
            date: local_day(ts, offset),
            entries: Vec::new(),
            co2_saved_kg: 0.0,
            distance_km: 0.0,
        });
        day.entries.push(entry.clone());
        day.co2_saved_kg += entry.co2_saved_kg;
        day.distance_km += entry.distance_km;

        hourly_trips[local_hour(ts, offset) as usize] += 1;

        let mode = by_mode
            .entry(entry.transport_type)
            .or_insert_with(|| TransportStat {
                transport_type: entry.transport_type,
                trips: 0,
                co2_saved_kg: 0.0,
                distance_km: 0.0,
            });
        mode.trips += 1;
        mode.co2_saved_kg += entry.co2_saved_kg;
        mode.distance_km += entry.distance_km;
    }

    let average_co2_per_day_kg = if daily.is_empty() {
        0.0
    } else {
        total_co2 / daily.len() as f64
    };

    // Peak hour: maximum trip count, ties resolved to the lowest hour by
    // the ascending scan with a strict comparison.
    let mut peak_hour: Option<PeakHour> = None;
    for (hour, &trips) in hourly_trips.iter().enumerate() {
        if trips > 0 && peak_hour.map_or(true, |p| trips > p.trips) {
            peak_hour = Some(PeakHour {
                hour: hour as u32,
                trips,
            });
        }
    }

    let by_transport = TransportType::ALL
        .iter()
        .filter_map(|mode| by_mode.remove(mode))
        .collect();

    PeriodStats {
        period,
        total_co2_saved_kg: total_co2,
        total_distance_km: total_distance,
        average_co2_per_day_kg,
        daily: daily.into_values().collect(),
        hourly_trips,
        peak_hour,
        by_transport,
    }
}

/// Count consecutive green calendar days ending at `today`.
///
/// A day with at least one commute is green; duplicates within a day count
/// once. The walk is anchored at `today` when it is green, otherwise at
/// yesterday — a day only breaks the streak once it has fully passed, so a
/// user who logged yesterday but not yet today still holds their streak.
/// Returns 0 when the most recent green day is older than yesterday.
pub fn compute_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let green: HashSet<NaiveDate> = dates.iter().copied().collect();

    let Some(yesterday) = today.pred_opt() else {
        return u32::from(green.contains(&today));
    };

    let mut day = if green.contains(&today) {
        today
    } else if green.contains(&yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0u32;
    while green.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Incremental form of [`compute_streak`], applied when a commute is written.
///
/// `day` is the commute's local calendar date: the same day leaves the
/// streak unchanged, the day after the last green day extends it, and
/// anything else restarts at 1.
pub fn advance_streak(streak: u32, last_green_day: Option<NaiveDate>, day: NaiveDate) -> u32 {
    match last_green_day {
        Some(last) if last == day => streak.max(1),
        Some(last) if last.succ_opt() == Some(day) => streak + 1,
        _ => 1,
    }
}
