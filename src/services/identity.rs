// SPDX-License-Identifier: MIT

//! Firebase ID token verification.
//!
//! The front end signs in against Firebase Authentication (email/password,
//! verification emails, password changes all live there) and exchanges the
//! resulting ID token for a first-party session here. ID tokens are RS256
//! JWTs issued by `securetoken.google.com`; Google publishes the signing
//! keys as a JWK set and rotates them regularly, so verified keys are
//! cached per `kid` and refreshed under a lock when an unknown kid shows
//! up.

use crate::error::AppError;
use dashmap::DashMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Identity established from a verified Firebase ID token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
}

#[derive(Clone)]
enum VerifierMode {
    Firebase,
    /// Fixed key for deterministic local/integration tests.
    StaticKey {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

struct CachedKey {
    key: Arc<DecodingKey>,
    expires_at: Instant,
}

/// Verifier for Firebase-issued ID tokens.
pub struct FirebaseTokenVerifier {
    http_client: reqwest::Client,
    /// Firebase project id: token audience, and suffix of the issuer.
    project_id: String,
    mode: VerifierMode,
    keys_by_kid: DashMap<String, CachedKey>,
    refresh_lock: Mutex<()>,
}

impl FirebaseTokenVerifier {
    /// Create a production verifier that fetches and caches Google's
    /// securetoken JWK set.
    pub fn new(project_id: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building identity HTTP client")?;

        Ok(Self {
            http_client,
            project_id: project_id.to_string(),
            mode: VerifierMode::Firebase,
            keys_by_kid: DashMap::new(),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Create a verifier with a fixed decoding key; no network access.
    pub fn new_with_static_key(
        project_id: &str,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            project_id: project_id.to_string(),
            mode: VerifierMode::StaticKey {
                kid: kid.into(),
                decoding_key: Arc::new(decoding_key),
            },
            keys_by_kid: DashMap::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Verify a Firebase ID token and extract the caller's identity.
    ///
    /// Malformed or mis-signed tokens map to `InvalidToken`; JWKS fetch
    /// failures map to `Identity` so the client can distinguish "bad
    /// credential" from "provider unavailable".
    pub async fn verify_id_token(&self, token: &str) -> Result<VerifiedIdentity, AppError> {
        let header = decode_header(token).map_err(|_| AppError::InvalidToken)?;

        if header.alg != Algorithm::RS256 {
            return Err(AppError::InvalidToken);
        }

        let kid = header.kid.ok_or(AppError::InvalidToken)?;
        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let issuer = format!("https://securetoken.google.com/{}", self.project_id);
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let token_data = decode::<IdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "ID token validation failed");
                AppError::InvalidToken
            })?;

        let claims = token_data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AppError::InvalidToken);
        }

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified.unwrap_or(false),
            name: claims.name,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, AppError> {
        if let VerifierMode::StaticKey {
            kid: static_kid,
            decoding_key,
        } = &self.mode
        {
            if kid == static_kid {
                return Ok(decoding_key.clone());
            }
            return Err(AppError::InvalidToken);
        }

        if let Some(key) = self.lookup_cached_key(kid) {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_keys(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid) {
                return Ok(key);
            }
        }

        // The kid is absent from a freshly fetched key set: the token was
        // not signed by securetoken.
        Err(AppError::InvalidToken)
    }

    fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let now = Instant::now();
        self.keys_by_kid
            .get(kid)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.key.clone())
    }

    fn has_fresh_keys(&self) -> bool {
        let now = Instant::now();
        self.keys_by_kid.iter().any(|entry| entry.expires_at > now)
    }

    async fn refresh_keys(&self, force_refresh: bool) -> Result<(), AppError> {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited on the lock.
        if !force_refresh && self.has_fresh_keys() {
            return Ok(());
        }

        tracing::debug!(url = SECURETOKEN_JWKS_URL, "Refreshing securetoken JWKS cache");

        let response = self
            .http_client
            .get(SECURETOKEN_JWKS_URL)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Identity(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("invalid JWKS JSON: {e}")))?;

        let expires_at = Instant::now() + ttl;
        let mut usable = 0usize;

        self.keys_by_kid.clear();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
                continue;
            }
            if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
                continue;
            }
            if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }

            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    self.keys_by_kid.insert(
                        jwk.kid,
                        CachedKey {
                            key: Arc::new(key),
                            expires_at,
                        },
                    );
                    usable += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
                }
            }
        }

        if usable == 0 {
            return Err(AppError::Identity(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        tracing::debug!(
            keys = usable,
            ttl_secs = ttl.as_secs(),
            "securetoken JWKS cache refreshed"
        );
        Ok(())
    }
}

/// Claims we read from a Firebase ID token; the rest are ignored.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

/// TTL from a `Cache-Control: max-age=N` response header.
fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, default: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(',').find_map(|directive| {
                directive
                    .trim()
                    .strip_prefix("max-age=")
                    .and_then(|secs| secs.parse::<u64>().ok())
            })
        })
        .map(Duration::from_secs)
        .unwrap_or(default)
}
