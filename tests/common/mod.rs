// SPDX-License-Identifier: MIT

use commute_tracker::config::Config;
use commute_tracker::db::FirestoreDb;
use commute_tracker::routes::create_router;
use commute_tracker::services::{CommuteService, EmissionsModel, FirebaseTokenVerifier};
use commute_tracker::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db_offline();

    // The static-key verifier never fetches JWKS; session-exchange tests
    // only exercise rejection paths.
    let identity = FirebaseTokenVerifier::new_with_static_key(
        &config.gcp_project_id,
        "test-kid",
        jsonwebtoken::DecodingKey::from_secret(b"not-an-rsa-key"),
    );
    let commutes = CommuteService::new(db.clone(), EmissionsModel::default());

    let state = Arc::new(AppState {
        config,
        db,
        identity,
        commutes,
    });

    (create_router(state.clone()), state)
}

/// Create a session JWT signed with the test config's key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    commute_tracker::middleware::auth::create_jwt(user_id, signing_key)
        .expect("JWT creation should succeed")
}
