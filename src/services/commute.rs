// SPDX-License-Identifier: MIT

//! Commute logging service.
//!
//! The write path of the tracker:
//! 1. Re-check the numeric contract on the caller's input
//! 2. Price the trip against the emissions model
//! 3. Persist the entry and the profile projection update in one
//!    Firestore transaction

use chrono::Utc;

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::commute::{CommuteEntry, TransportType};
use crate::models::user::{Badge, UserProfile};
use crate::services::emissions::EmissionsModel;
use crate::time_utils::{format_utc_rfc3339, local_day, offset_from_minutes};

/// Log a commute and keep the owner's profile projection in step.
pub struct CommuteService {
    db: FirestoreDb,
    emissions: EmissionsModel,
}

/// Result of logging a commute.
#[derive(Debug)]
pub struct LoggedCommute {
    pub entry: CommuteEntry,
    pub profile: UserProfile,
    pub new_badges: Vec<Badge>,
}

impl CommuteService {
    pub fn new(db: FirestoreDb, emissions: EmissionsModel) -> Self {
        Self { db, emissions }
    }

    pub fn emissions(&self) -> &EmissionsModel {
        &self.emissions
    }

    /// Log a commute for `user_id`.
    ///
    /// `tz_offset_minutes` is the client's UTC offset, used to place the
    /// entry on its local calendar day for streak accounting. Out-of-range
    /// numeric input is a contract violation and is rejected outright
    /// rather than clamped; only the CO₂ floor at zero is tolerated, and
    /// that lives in the emissions model.
    pub async fn log_commute(
        &self,
        user_id: &str,
        transport_type: TransportType,
        distance_km: f64,
        duration_minutes: Option<f64>,
        tz_offset_minutes: i32,
    ) -> Result<LoggedCommute> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(AppError::BadRequest(
                "distance_km must be a non-negative number".to_string(),
            ));
        }
        if let Some(duration) = duration_minutes {
            if !duration.is_finite() || duration < 0.0 {
                return Err(AppError::BadRequest(
                    "duration_minutes must be a non-negative number".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let co2_saved_kg = self.emissions.co2_savings_kg(transport_type, distance_km);

        let entry = CommuteEntry {
            id: format!("{}_{}", user_id, now.timestamp_millis()),
            user_id: user_id.to_string(),
            date: format_utc_rfc3339(now),
            transport_type,
            distance_km,
            co2_saved_kg,
            duration_minutes,
        };

        let day = local_day(now, offset_from_minutes(tz_offset_minutes));
        let (profile, new_badges) = self.db.add_commute_atomic(&entry, day).await?;

        tracing::info!(
            user_id,
            commute_id = %entry.id,
            transport_type = transport_type.label(),
            distance_km,
            co2_saved_kg,
            streak = profile.streak,
            "Commute logged"
        );

        Ok(LoggedCommute {
            entry,
            profile,
            new_badges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_service() -> CommuteService {
        CommuteService::new(FirestoreDb::new_mock(), EmissionsModel::default())
    }

    #[tokio::test]
    async fn test_negative_distance_rejected_before_db() {
        let service = offline_service();
        // The mock db fails every operation, so a BadRequest here proves
        // validation ran first.
        let result = service
            .log_commute("uid-1", TransportType::Biking, -1.0, None, 0)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_nan_distance_rejected() {
        let service = offline_service();
        let result = service
            .log_commute("uid-1", TransportType::Walking, f64::NAN, None, 0)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_negative_duration_rejected() {
        let service = offline_service();
        let result = service
            .log_commute("uid-1", TransportType::Carpool, 5.0, Some(-10.0), 0)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_valid_input_reaches_the_database() {
        let service = offline_service();
        let result = service
            .log_commute("uid-1", TransportType::Biking, 5.0, Some(20.0), 0)
            .await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
