// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage, leaderboard, follow graph)
//! - Commutes (immutable trip log, transactional writes)
//! - Posts (social feed)

use chrono::NaiveDate;
use futures_util::{stream, StreamExt};
use std::collections::HashMap;

use crate::db::collections;
use crate::error::AppError;
use crate::models::stats::compute_streak;
use crate::models::user::Badge;
use crate::models::{CommuteEntry, Post, UserProfile};

const MAX_CONCURRENT_DB_OPS: usize = 50;
/// How many recent commutes to scan when rebuilding a profile's streak
/// projection from the log.
const STREAK_REBUILD_SCAN: u32 = 90;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator accepts any bearer token; supply a dummy one so no
        // local credentials are read or leaked.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user profile by Firebase uid.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user profile.
    pub async fn upsert_user(&self, user: &UserProfile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch profiles for a set of users, concurrently with a bounded
    /// fan-out. Missing profiles are simply absent from the result.
    pub async fn get_profiles_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, UserProfile>, AppError> {
        let results: Vec<Result<Option<UserProfile>, AppError>> =
            stream::iter(user_ids.to_vec())
                .map(|user_id| {
                    let db = self.clone();
                    async move { db.get_user(&user_id).await }
                })
                .buffer_unordered(MAX_CONCURRENT_DB_OPS)
                .collect()
                .await;

        let mut profiles = HashMap::new();
        for result in results {
            if let Some(profile) = result? {
                profiles.insert(profile.id.clone(), profile);
            }
        }
        Ok(profiles)
    }

    /// Top profiles by lifetime CO₂ saved, descending.
    pub async fn get_leaderboard(&self, limit: u32) -> Result<Vec<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .order_by([(
                "total_co2_saved_kg",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update the follow edge between two users transactionally.
    ///
    /// Both profiles are rewritten together so `followers`/`following`
    /// stay symmetric under concurrent updates.
    pub async fn set_follow(
        &self,
        follower_id: &str,
        followee_id: &str,
        follow: bool,
    ) -> Result<(), AppError> {
        let mut follower = self
            .get_user(follower_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", follower_id)))?;
        let mut followee = self
            .get_user(followee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", followee_id)))?;

        if follow {
            if !follower.following.contains(&followee.id) {
                follower.following.push(followee.id.clone());
            }
            if !followee.followers.contains(&follower.id) {
                followee.followers.push(follower.id.clone());
            }
        } else {
            follower.following.retain(|id| id != &followee.id);
            followee.followers.retain(|id| id != &follower.id);
        }

        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        for profile in [&follower, &followee] {
            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::USERS)
                .document_id(&profile.id)
                .object(profile)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add profile to transaction: {}", e))
                })?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(())
    }

    // ─── Commute Operations ──────────────────────────────────────

    /// Get a user's commutes, newest first.
    ///
    /// `before` is an exclusive upper bound on the stored RFC3339 date
    /// (the pagination cursor).
    pub async fn get_commutes_for_user(
        &self,
        user_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CommuteEntry>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::COMMUTES);

        let user_id = user_id.to_string();
        let query = if let Some(before) = before {
            let before = before.to_string();
            query.filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("date").less_than(before.clone()),
                ])
            })
        } else {
            query.filter(move |q| q.field("user_id").eq(user_id.clone()))
        };

        query
            .order_by([("date", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a user's commutes at or after `cutoff` (RFC3339), newest first.
    ///
    /// Feeds the period aggregator; `cap` bounds the read for pathological
    /// logs.
    pub async fn get_commutes_since(
        &self,
        user_id: &str,
        cutoff: &str,
        cap: u32,
    ) -> Result<Vec<CommuteEntry>, AppError> {
        let user_id = user_id.to_string();
        let cutoff = cutoff.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::COMMUTES)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("date").greater_than_or_equal(cutoff.clone()),
                ])
            })
            .order_by([("date", firestore::FirestoreQueryDirection::Descending)])
            .limit(cap)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic Commute Logging ──────────────────────────────────

    /// Atomically store a commute and update the owner's profile
    /// projection (totals, streak, badges).
    ///
    /// A Firestore transaction ensures the entry and the projection land
    /// together; concurrent writers retry with fresh data instead of
    /// losing updates. `day` is the commute's local calendar date.
    ///
    /// Returns the updated profile and any newly earned badges.
    pub async fn add_commute_atomic(
        &self,
        entry: &CommuteEntry,
        day: NaiveDate,
    ) -> Result<(UserProfile, Vec<Badge>), AppError> {
        let now = entry.date.clone();

        let mut profile = self
            .get_user(&entry.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", entry.user_id)))?;

        // Profiles written before streak tracking carry commutes but no
        // projection; rebuild it from the log once. The rebuild keys on
        // UTC days since per-entry offsets are not recorded.
        if profile.last_green_day.is_none() && profile.total_commutes > 0 {
            let recent = self
                .get_commutes_for_user(&entry.user_id, None, STREAK_REBUILD_SCAN)
                .await?;
            let dates: Vec<NaiveDate> = recent
                .iter()
                .filter_map(|c| c.parsed_date())
                .map(|ts| ts.date_naive())
                .collect();
            profile.streak = compute_streak(&dates, day);
            profile.last_green_day = dates.iter().max().map(|d| d.to_string());
            tracing::info!(
                user_id = %entry.user_id,
                rebuilt_streak = profile.streak,
                "Rebuilt streak projection from commute log"
            );
        }

        let new_badges = profile.record_commute(entry, day, &now);

        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::COMMUTES)
            .document_id(&entry.id)
            .object(entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add commute to transaction: {}", e))
            })?;

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&profile.id)
            .object(&profile)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add profile to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(
            user_id = %entry.user_id,
            commute_id = %entry.id,
            new_badges = new_badges.len(),
            "Commute stored atomically"
        );

        Ok((profile, new_badges))
    }

    // ─── Post Operations ─────────────────────────────────────────

    /// Store a feed post.
    pub async fn add_post(&self, post: &Post) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::POSTS)
            .document_id(&post.id)
            .object(post)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Recent feed posts, newest first.
    pub async fn get_posts(&self, limit: u32) -> Result<Vec<Post>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::POSTS)
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
