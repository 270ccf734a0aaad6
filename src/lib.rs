// SPDX-License-Identifier: MIT

//! Commute-Tracker: log green commutes, track CO₂ savings
//!
//! This crate provides the backend API for the commute tracking app:
//! it records trips, prices them against a solo-car baseline, and serves
//! the dashboard, analytics, leaderboard and social feed on top of
//! Firestore, with identity delegated to Firebase Authentication.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{CommuteService, FirebaseTokenVerifier};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub identity: FirebaseTokenVerifier,
    pub commutes: CommuteService,
}
