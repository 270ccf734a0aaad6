//! User profile model and the commute-write projection.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::commute::CommuteEntry;
use crate::models::stats::advance_streak;

/// Earned achievement, stored inline on the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    /// When the badge was earned (RFC3339 UTC)
    pub earned_at: String,
}

/// A badge definition: stable id plus the threshold over profile state.
struct BadgeRule {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    earned: fn(&UserProfile) -> bool,
}

const BADGE_RULES: &[BadgeRule] = &[
    BadgeRule {
        id: "first_commute",
        name: "First Steps",
        description: "Log your first green commute",
        icon: "🌱",
        earned: |p| p.total_commutes >= 1,
    },
    BadgeRule {
        id: "week_warrior",
        name: "Week Warrior",
        description: "Keep a 7-day green streak",
        icon: "🔥",
        earned: |p| p.streak >= 7,
    },
    BadgeRule {
        id: "green_month",
        name: "Green Month",
        description: "Keep a 30-day green streak",
        icon: "📅",
        earned: |p| p.streak >= 30,
    },
    BadgeRule {
        id: "carbon_saver",
        name: "Carbon Saver",
        description: "Save 10 kg of CO₂",
        icon: "🌍",
        earned: |p| p.total_co2_saved_kg >= 10.0,
    },
    BadgeRule {
        id: "eco_champion",
        name: "Eco Champion",
        description: "Save 100 kg of CO₂",
        icon: "🏆",
        earned: |p| p.total_co2_saved_kg >= 100.0,
    },
];

/// User profile stored in Firestore, keyed by Firebase uid.
///
/// The running totals, streak fields and badges are projections of the
/// commute log, updated in the same transaction that writes each commute
/// (see `FirestoreDb::add_commute_atomic`). The log stays canonical; these
/// fields exist so dashboard reads cost one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Firebase uid (also the document id)
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub bio: String,
    /// When the profile was created (RFC3339 UTC)
    pub join_date: String,
    #[serde(default)]
    pub total_co2_saved_kg: f64,
    #[serde(default)]
    pub total_distance_km: f64,
    #[serde(default)]
    pub total_commutes: u32,
    /// Consecutive green days, maintained by the commute write path
    #[serde(default)]
    pub streak: u32,
    /// Local calendar date (ISO) of the most recent commute
    #[serde(default)]
    pub last_green_day: Option<String>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub referral_code: String,
}

impl UserProfile {
    /// Fresh profile for a first sign-in.
    pub fn new(id: &str, name: &str, email: &str, referral_code: &str, now: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            department: String::new(),
            college: String::new(),
            bio: String::new(),
            join_date: now.to_string(),
            total_co2_saved_kg: 0.0,
            total_distance_km: 0.0,
            total_commutes: 0,
            streak: 0,
            last_green_day: None,
            badges: Vec::new(),
            followers: Vec::new(),
            following: Vec::new(),
            referral_code: referral_code.to_string(),
        }
    }

    pub fn has_badge(&self, id: &str) -> bool {
        self.badges.iter().any(|b| b.id == id)
    }

    /// Parsed `last_green_day`, if present and well-formed.
    pub fn last_green_date(&self) -> Option<NaiveDate> {
        self.last_green_day.as_deref().and_then(|d| d.parse().ok())
    }

    /// Apply a new commute to the profile projection.
    ///
    /// Updates the running totals, advances the streak for `day` (the
    /// commute's local calendar date) and awards any badges whose
    /// thresholds the updated state crosses. Returns the newly earned
    /// badges so the caller can surface them.
    pub fn record_commute(&mut self, entry: &CommuteEntry, day: NaiveDate, now: &str) -> Vec<Badge> {
        self.total_commutes += 1;
        self.total_co2_saved_kg += entry.co2_saved_kg;
        self.total_distance_km += entry.distance_km;

        self.streak = advance_streak(self.streak, self.last_green_date(), day);
        self.last_green_day = Some(day.to_string());

        self.award_badges(now)
    }

    fn award_badges(&mut self, now: &str) -> Vec<Badge> {
        let mut earned = Vec::new();
        for rule in BADGE_RULES {
            if !self.has_badge(rule.id) && (rule.earned)(self) {
                let badge = Badge {
                    id: rule.id.to_string(),
                    name: rule.name.to_string(),
                    description: rule.description.to_string(),
                    icon: rule.icon.to_string(),
                    earned_at: now.to_string(),
                };
                self.badges.push(badge.clone());
                earned.push(badge);
            }
        }
        earned
    }
}
