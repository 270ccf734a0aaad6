//! Social feed models.

use serde::{Deserialize, Serialize};

/// Feed post categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Achievement,
    Milestone,
    General,
}

/// A social feed post stored in Firestore.
///
/// Author display fields are hydrated from the `users` collection at read
/// time, so the feed follows profile renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Document id: `{user_id}_{unix_millis}`
    pub id: String,
    /// Author (Firebase uid)
    pub user_id: String,
    /// Post body
    pub content: String,
    pub kind: PostKind,
    #[serde(default)]
    pub likes: u32,
    /// Creation timestamp (RFC3339 UTC, millisecond precision)
    pub timestamp: String,
}
