// SPDX-License-Identifier: MIT

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::stats::aggregate;
use crate::models::{Badge, Period, Post, PostKind, TransportType, UserProfile};
use crate::services::referral::referral_code;
use crate::time_utils::{format_utc_rfc3339, offset_from_minutes};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const MAX_PER_PAGE: u32 = 100;
const MAX_FEED_LIMIT: u32 = 50;
const MAX_LEADERBOARD_LIMIT: u32 = 50;
/// Upper bound on entries fed to the aggregator for one stats request.
const STATS_FETCH_CAP: u32 = 1000;

/// API routes (require authentication via the session JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/commutes", get(get_commutes).post(log_commute))
        .route("/api/stats", get(get_stats))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/feed", get(get_feed).post(create_post))
        .route(
            "/api/users/{user_id}/follow",
            post(follow_user).delete(unfollow_user),
        )
        .route("/api/referral", get(get_referral))
}

// ─── User Profile ────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BadgeView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub earned_at: String,
}

impl From<&Badge> for BadgeView {
    fn from(badge: &Badge) -> Self {
        Self {
            id: badge.id.clone(),
            name: badge.name.clone(),
            description: badge.description.clone(),
            icon: badge.icon.clone(),
            earned_at: badge.earned_at.clone(),
        }
    }
}

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub college: String,
    pub bio: String,
    pub join_date: String,
    pub total_co2_saved_kg: f64,
    pub total_distance_km: f64,
    pub total_commutes: u32,
    pub streak: u32,
    pub badges: Vec<BadgeView>,
    pub followers: u32,
    pub following: u32,
    pub referral_code: String,
}

impl From<UserProfile> for UserResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.id,
            name: profile.name,
            email: profile.email,
            department: profile.department,
            college: profile.college,
            bio: profile.bio,
            join_date: profile.join_date,
            total_co2_saved_kg: profile.total_co2_saved_kg,
            total_distance_km: profile.total_distance_km,
            total_commutes: profile.total_commutes,
            streak: profile.streak,
            badges: profile.badges.iter().map(BadgeView::from).collect(),
            followers: profile.followers.len() as u32,
            following: profile.following.len() as u32,
            referral_code: profile.referral_code,
        }
    }
}

async fn load_profile(state: &AppState, user_id: &str) -> Result<UserProfile> {
    state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = load_profile(&state, &user.user_id).await?;
    Ok(Json(profile.into()))
}

#[derive(Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: Option<String>,
    #[validate(length(max = 80))]
    pub department: Option<String>,
    #[validate(length(max = 120))]
    pub college: Option<String>,
    #[validate(length(max = 280))]
    pub bio: Option<String>,
}

/// Update editable profile fields. Email and the derived aggregates are
/// not editable through this endpoint.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    req.validate()?;

    let mut profile = load_profile(&state, &user.user_id).await?;

    if let Some(name) = req.name {
        profile.name = name;
    }
    if let Some(department) = req.department {
        profile.department = department;
    }
    if let Some(college) = req.college {
        profile.college = college;
    }
    if let Some(bio) = req.bio {
        profile.bio = bio;
    }

    state.db.upsert_user(&profile).await?;
    tracing::debug!(user_id = %user.user_id, "Profile updated");

    Ok(Json(profile.into()))
}

// ─── Commutes ────────────────────────────────────────────────

#[derive(Deserialize)]
struct CommutesQuery {
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_per_page() -> u32 {
    50
}

/// Decode an opaque cursor back to the stored RFC3339 date it wraps.
fn parse_cursor(cursor: Option<&str>) -> Result<Option<String>> {
    cursor
        .map(|raw| {
            let invalid_cursor =
                || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let date = String::from_utf8(decoded).map_err(|_| invalid_cursor())?;
            chrono::DateTime::parse_from_rfc3339(&date).map_err(|_| invalid_cursor())?;
            Ok(date)
        })
        .transpose()
}

fn encode_cursor(date: &str) -> String {
    URL_SAFE_NO_PAD.encode(date)
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CommuteSummary {
    pub id: String,
    pub date: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub transport_type: TransportType,
    pub distance_km: f64,
    pub co2_saved_kg: f64,
    pub duration_minutes: Option<f64>,
}

impl From<crate::models::CommuteEntry> for CommuteSummary {
    fn from(entry: crate::models::CommuteEntry) -> Self {
        Self {
            id: entry.id,
            date: entry.date,
            transport_type: entry.transport_type,
            distance_km: entry.distance_km,
            co2_saved_kg: entry.co2_saved_kg,
            duration_minutes: entry.duration_minutes,
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CommutesResponse {
    pub commutes: Vec<CommuteSummary>,
    pub per_page: u32,
    pub next_cursor: Option<String>,
}

/// Get the caller's commutes, newest first, cursor-paginated.
///
/// The cursor wraps the last entry's stored date. Dates carry millisecond
/// precision, so one user cannot produce colliding timestamps and the
/// strict `<` resume point never skips entries.
async fn get_commutes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<CommutesQuery>,
) -> Result<Json<CommutesResponse>> {
    let limit = params.per_page.clamp(1, MAX_PER_PAGE);
    let before = parse_cursor(params.cursor.as_deref())?;

    tracing::debug!(
        user_id = %user.user_id,
        cursor = ?params.cursor,
        per_page = limit,
        "Fetching commutes"
    );

    // Fetch one extra item to determine if another page is available.
    let fetch_limit = limit.saturating_add(1);
    let mut entries = state
        .db
        .get_commutes_for_user(&user.user_id, before.as_deref(), fetch_limit)
        .await?;

    let has_more = entries.len() > limit as usize;
    if has_more {
        entries.truncate(limit as usize);
    }

    let next_cursor = if has_more {
        entries.last().map(|e| encode_cursor(&e.date))
    } else {
        None
    };

    Ok(Json(CommutesResponse {
        commutes: entries.into_iter().map(CommuteSummary::from).collect(),
        per_page: limit,
        next_cursor,
    }))
}

#[derive(Deserialize, Validate)]
pub struct LogCommuteRequest {
    pub transport_type: TransportType,
    #[validate(range(min = 0.0, message = "distance_km must be non-negative"))]
    pub distance_km: f64,
    #[validate(range(min = 0.0, message = "duration_minutes must be non-negative"))]
    pub duration_minutes: Option<f64>,
    /// Client UTC offset in minutes east, for local-day streak accounting
    #[serde(default)]
    #[validate(range(min = -840, max = 840))]
    pub tz_offset: i32,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogCommuteResponse {
    pub commute: CommuteSummary,
    pub total_co2_saved_kg: f64,
    pub total_commutes: u32,
    pub streak: u32,
    /// Badges earned by this commute
    pub new_badges: Vec<BadgeView>,
}

/// Log a new commute.
async fn log_commute(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<LogCommuteRequest>,
) -> Result<Json<LogCommuteResponse>> {
    req.validate()?;

    let logged = state
        .commutes
        .log_commute(
            &user.user_id,
            req.transport_type,
            req.distance_km,
            req.duration_minutes,
            req.tz_offset,
        )
        .await?;

    Ok(Json(LogCommuteResponse {
        commute: logged.entry.into(),
        total_co2_saved_kg: logged.profile.total_co2_saved_kg,
        total_commutes: logged.profile.total_commutes,
        streak: logged.profile.streak,
        new_badges: logged.new_badges.iter().map(BadgeView::from).collect(),
    }))
}

// ─── Period Stats ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct StatsQuery {
    period: Period,
    /// Client UTC offset in minutes east (default UTC)
    #[serde(default)]
    #[validate(range(min = -840, max = 840))]
    tz_offset: i32,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DailySummary {
    pub date: String,
    pub trips: u32,
    pub co2_saved_kg: f64,
    pub distance_km: f64,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TransportSummary {
    /// Display label, e.g. "Public Transit"
    pub transport_type: String,
    pub trips: u32,
    pub co2_saved_kg: f64,
    pub distance_km: f64,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PeakHourView {
    pub hour: u32,
    pub trips: u32,
}

/// Stats response for one rolling period.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StatsResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub period: Period,
    pub total_co2_saved_kg: f64,
    pub total_distance_km: f64,
    pub average_co2_per_day_kg: f64,
    pub daily: Vec<DailySummary>,
    pub hourly_trips: Vec<u32>,
    pub peak_hour: Option<PeakHourView>,
    pub by_transport: Vec<TransportSummary>,
    /// Stored streak projection (maintained by the commute write path)
    pub streak: u32,
    /// Tree-years equivalent of the period total
    pub equivalent_trees: f64,
    /// Car miles not driven equivalent of the period total
    pub equivalent_miles: f64,
}

/// Aggregate the caller's commutes over a rolling week or month.
///
/// The breakdowns are recomputed from the entry log on every request; only
/// the streak is read from the stored profile projection.
async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    params.validate()?;

    let now = Utc::now();
    let cutoff = format_utc_rfc3339(params.period.cutoff(now));
    let entries = state
        .db
        .get_commutes_since(&user.user_id, &cutoff, STATS_FETCH_CAP)
        .await?;
    let profile = load_profile(&state, &user.user_id).await?;

    let stats = aggregate(
        &entries,
        params.period,
        now,
        offset_from_minutes(params.tz_offset),
    );

    let emissions = state.commutes.emissions();
    let response = StatsResponse {
        period: stats.period,
        total_co2_saved_kg: stats.total_co2_saved_kg,
        total_distance_km: stats.total_distance_km,
        average_co2_per_day_kg: stats.average_co2_per_day_kg,
        daily: stats
            .daily
            .iter()
            .map(|d| DailySummary {
                date: d.date.to_string(),
                trips: d.entries.len() as u32,
                co2_saved_kg: d.co2_saved_kg,
                distance_km: d.distance_km,
            })
            .collect(),
        hourly_trips: stats.hourly_trips.to_vec(),
        peak_hour: stats.peak_hour.map(|p| PeakHourView {
            hour: p.hour,
            trips: p.trips,
        }),
        by_transport: stats
            .by_transport
            .iter()
            .map(|t| TransportSummary {
                transport_type: t.transport_type.label().to_string(),
                trips: t.trips,
                co2_saved_kg: t.co2_saved_kg,
                distance_km: t.distance_km,
            })
            .collect(),
        streak: profile.streak,
        equivalent_trees: emissions.equivalent_trees(stats.total_co2_saved_kg),
        equivalent_miles: emissions.equivalent_miles(stats.total_co2_saved_kg),
    };

    Ok(Json(response))
}

// ─── Leaderboard ─────────────────────────────────────────────

#[derive(Deserialize)]
struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    limit: u32,
}

fn default_leaderboard_limit() -> u32 {
    10
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub name: String,
    pub department: String,
    pub total_co2_saved_kg: f64,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

/// Top savers across all users.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>> {
    let limit = params.limit.clamp(1, MAX_LEADERBOARD_LIMIT);
    let profiles = state.db.get_leaderboard(limit).await?;

    let entries = profiles
        .into_iter()
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i as u32 + 1,
            user_id: p.id,
            name: p.name,
            department: p.department,
            total_co2_saved_kg: p.total_co2_saved_kg,
        })
        .collect();

    Ok(Json(LeaderboardResponse { entries }))
}

// ─── Social Feed ─────────────────────────────────────────────

#[derive(Deserialize)]
struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    limit: u32,
}

fn default_feed_limit() -> u32 {
    20
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PostView {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub department: String,
    pub content: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub kind: PostKind,
    pub likes: u32,
    pub timestamp: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FeedResponse {
    pub posts: Vec<PostView>,
}

/// Recent feed posts with author info hydrated from the profiles.
async fn get_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<FeedResponse>> {
    let limit = params.limit.clamp(1, MAX_FEED_LIMIT);
    let posts = state.db.get_posts(limit).await?;

    let author_ids: Vec<String> = posts
        .iter()
        .map(|p| p.user_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let authors = state.db.get_profiles_for_users(&author_ids).await?;

    let views = posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.user_id);
            PostView {
                id: post.id,
                user_name: author
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| "Former member".to_string()),
                department: author.map(|a| a.department.clone()).unwrap_or_default(),
                user_id: post.user_id,
                content: post.content,
                kind: post.kind,
                likes: post.likes,
                timestamp: post.timestamp,
            }
        })
        .collect();

    Ok(Json(FeedResponse { posts: views }))
}

#[derive(Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,
    #[serde(default = "default_post_kind")]
    pub kind: PostKind,
}

fn default_post_kind() -> PostKind {
    PostKind::General
}

/// Share a post to the feed.
async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<PostView>> {
    req.validate()?;

    let profile = load_profile(&state, &user.user_id).await?;

    let now = Utc::now();
    let post = Post {
        id: format!("{}_{}", user.user_id, now.timestamp_millis()),
        user_id: user.user_id.clone(),
        content: req.content,
        kind: req.kind,
        likes: 0,
        timestamp: format_utc_rfc3339(now),
    };
    state.db.add_post(&post).await?;

    tracing::debug!(user_id = %user.user_id, post_id = %post.id, "Post created");

    Ok(Json(PostView {
        id: post.id,
        user_id: post.user_id,
        user_name: profile.name,
        department: profile.department,
        content: post.content,
        kind: post.kind,
        likes: post.likes,
        timestamp: post.timestamp,
    }))
}

// ─── Follow Graph ────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FollowResponse {
    pub following: bool,
}

async fn follow_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target_id): Path<String>,
) -> Result<Json<FollowResponse>> {
    if target_id == user.user_id {
        return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
    }

    state.db.set_follow(&user.user_id, &target_id, true).await?;
    Ok(Json(FollowResponse { following: true }))
}

async fn unfollow_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target_id): Path<String>,
) -> Result<Json<FollowResponse>> {
    if target_id == user.user_id {
        return Err(AppError::BadRequest("Cannot unfollow yourself".to_string()));
    }

    state.db.set_follow(&user.user_id, &target_id, false).await?;
    Ok(Json(FollowResponse { following: false }))
}

// ─── Referral ────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReferralResponse {
    pub code: String,
    pub share_url: String,
}

/// The caller's referral code and a ready-to-share invite link.
async fn get_referral(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ReferralResponse>> {
    let mut profile = load_profile(&state, &user.user_id).await?;

    // Profiles created before referral codes existed get one on demand.
    if profile.referral_code.is_empty() {
        profile.referral_code = referral_code(&user.user_id, &state.config.jwt_signing_key)?;
        state.db.upsert_user(&profile).await?;
    }

    let share_url = format!(
        "{}/join?ref={}",
        state.config.frontend_url, profile.referral_code
    );

    Ok(Json(ReferralResponse {
        code: profile.referral_code,
        share_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let date = "2024-06-15T08:30:00.123Z";
        let encoded = encode_cursor(date);
        let decoded = parse_cursor(Some(&encoded)).unwrap().unwrap();
        assert_eq!(decoded, date);
    }

    #[test]
    fn test_cursor_rejects_invalid_base64() {
        let err = parse_cursor(Some("not~base64!")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_cursor_rejects_non_date_payload() {
        let encoded = URL_SAFE_NO_PAD.encode("definitely not a date");
        let err = parse_cursor(Some(&encoded)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_no_cursor_is_fine() {
        assert!(parse_cursor(None).unwrap().is_none());
    }
}
