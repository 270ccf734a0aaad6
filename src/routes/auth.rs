// SPDX-License-Identifier: MIT

//! Session establishment against Firebase Authentication.
//!
//! Sign-up, sign-in, password changes and verification emails all happen
//! between the front end and Firebase. This module only performs the
//! hand-off: it verifies the Firebase ID token, creates a profile on
//! first sign-in, and mints the first-party session cookie the rest of
//! the API authenticates with.

use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::Result;
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::models::UserProfile;
use crate::services::referral::referral_code;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/session", post(create_session))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize, Validate)]
pub struct SessionRequest {
    /// Firebase ID token obtained by the front end after sign-in
    #[validate(length(min = 1, message = "id_token must not be empty"))]
    pub id_token: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub user_id: String,
    /// Whether this sign-in created the profile
    pub created: bool,
}

/// Exchange a Firebase ID token for a session cookie.
async fn create_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<SessionRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    req.validate()?;

    let identity = state.identity.verify_id_token(&req.id_token).await?;

    // First sign-in creates the profile; later sessions leave it alone so
    // profile edits survive.
    let created = match state.db.get_user(&identity.uid).await? {
        Some(_) => false,
        None => {
            let name = identity
                .name
                .clone()
                .or_else(|| {
                    identity
                        .email
                        .as_deref()
                        .and_then(|e| e.split('@').next())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "Commuter".to_string());
            let code = referral_code(&identity.uid, &state.config.jwt_signing_key)?;
            let profile = UserProfile::new(
                &identity.uid,
                &name,
                identity.email.as_deref().unwrap_or(""),
                &code,
                &format_utc_rfc3339(Utc::now()),
            );
            state.db.upsert_user(&profile).await?;
            tracing::info!(user_id = %identity.uid, "Created profile on first sign-in");
            true
        }
    };

    let token = create_jwt(&identity.uid, &state.config.jwt_signing_key)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    tracing::info!(user_id = %identity.uid, created, "Session established");

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            user_id: identity.uid,
            created,
        }),
    ))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Clear the session cookie.
async fn logout(jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    let removal = Cookie::build(SESSION_COOKIE).path("/").build();
    (jar.remove(removal), Json(LogoutResponse { success: true }))
}
