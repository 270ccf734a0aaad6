// SPDX-License-Identifier: MIT

//! Business logic services.

pub mod commute;
pub mod emissions;
pub mod identity;
pub mod referral;

pub use commute::{CommuteService, LoggedCommute};
pub use emissions::EmissionsModel;
pub use identity::{FirebaseTokenVerifier, VerifiedIdentity};
pub use referral::referral_code;
