// SPDX-License-Identifier: MIT

//! Commute-Tracker API Server
//!
//! Records green commutes, prices them against a car baseline, and serves
//! dashboard, analytics and social endpoints backed by Firestore.

use commute_tracker::{
    config::Config,
    db::FirestoreDb,
    services::{CommuteService, EmissionsModel, FirebaseTokenVerifier},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Commute-Tracker API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Firebase ID token verifier (securetoken JWKS, cached)
    let identity = FirebaseTokenVerifier::new(&config.gcp_project_id)
        .expect("Failed to initialize Firebase token verifier");
    tracing::info!(
        project = %config.gcp_project_id,
        "Firebase token verifier initialized"
    );

    // Commute logging service with the default emissions table
    let commutes = CommuteService::new(db.clone(), EmissionsModel::default());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        identity,
        commutes,
    });

    // Build router
    let app = commute_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("commute_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
