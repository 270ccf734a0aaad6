// SPDX-License-Identifier: MIT

//! Commute entry model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport modes a green commute can use.
///
/// The enumeration is closed: an unknown value is a deserialization error,
/// never a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Walking,
    Biking,
    PublicTransit,
    Carpool,
    ElectricVehicle,
}

impl TransportType {
    /// All modes, in the order breakdowns are reported.
    pub const ALL: [TransportType; 5] = [
        TransportType::Walking,
        TransportType::Biking,
        TransportType::PublicTransit,
        TransportType::Carpool,
        TransportType::ElectricVehicle,
    ];

    /// Display label. Presentation only; aggregation keys on the enum itself.
    pub fn label(&self) -> &'static str {
        match self {
            TransportType::Walking => "Walking",
            TransportType::Biking => "Biking",
            TransportType::PublicTransit => "Public Transit",
            TransportType::Carpool => "Carpool",
            TransportType::ElectricVehicle => "Electric Vehicle",
        }
    }
}

/// A logged trip stored in Firestore. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommuteEntry {
    /// Document id: `{user_id}_{unix_millis}`, assigned at creation
    pub id: String,
    /// Owner (Firebase uid)
    pub user_id: String,
    /// Creation timestamp (RFC3339 UTC, millisecond precision)
    pub date: String,
    /// Transport mode
    pub transport_type: TransportType,
    /// Trip distance in kilometers
    pub distance_km: f64,
    /// CO₂ saved vs. the solo-car baseline, kilograms
    pub co2_saved_kg: f64,
    /// Optional trip duration in minutes
    #[serde(default)]
    pub duration_minutes: Option<f64>,
}

impl CommuteEntry {
    /// Parse the stored timestamp. `None` only if the document was written
    /// by something other than this service.
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.date)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_snake_case_round_trip() {
        let json = serde_json::to_string(&TransportType::PublicTransit).unwrap();
        assert_eq!(json, "\"public_transit\"");
        let back: TransportType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TransportType::PublicTransit);
    }

    #[test]
    fn test_unknown_transport_type_is_rejected() {
        let result = serde_json::from_str::<TransportType>("\"teleporter\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_parsed_date() {
        let entry = CommuteEntry {
            id: "u1_1704103200000".to_string(),
            user_id: "u1".to_string(),
            date: "2024-01-01T10:00:00.000Z".to_string(),
            transport_type: TransportType::Biking,
            distance_km: 5.0,
            co2_saved_kg: 1.0,
            duration_minutes: None,
        };
        assert_eq!(entry.parsed_date().unwrap().timestamp(), 1_704_103_200);
    }
}
