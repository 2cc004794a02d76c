//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Local accounts
// =============================================================================

/// A local actor and its key pair
///
/// The private key is exclusively owned by this record. It is skipped on
/// serialization and redacted from `Debug` output.
#[derive(Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocalAccount {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub note: Option<String>,
    /// RSA private key (PKCS#8 PEM)
    #[serde(skip_serializing)]
    pub private_key_pem: String,
    /// RSA public key (SPKI PEM)
    pub public_key_pem: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccount")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("private_key_pem", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

// =============================================================================
// Relationships
// =============================================================================

/// A remote actor following a local actor
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follower {
    pub id: String,
    /// Local actor being followed
    pub username: String,
    /// Remote follower's actor URI
    pub follower_uri: String,
    /// Inbox to deliver to
    pub inbox_uri: String,
    /// Follow activity URI that created the relationship
    pub follow_activity_uri: String,
    pub created_at: DateTime<Utc>,
}

/// A remote actor a local actor follows (or has asked to follow)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub id: String,
    /// Local follower
    pub username: String,
    pub target_uri: String,
    pub target_inbox_uri: String,
    pub follow_activity_uri: String,
    /// Set once the remote side answers with Accept
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Posts
// =============================================================================

/// A local post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Status {
    pub id: String,
    /// ActivityPub URI (globally unique)
    pub uri: String,
    /// Author (local username)
    pub username: String,
    /// HTML content
    pub content: String,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A Like received on a local post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Like {
    pub id: String,
    pub activity_uri: String,
    pub actor_uri: String,
    pub object_uri: String,
    pub created_at: DateTime<Utc>,
}

/// Reference to a remote post delivered to a local inbox
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RemotePost {
    pub id: String,
    pub uri: String,
    pub activity_uri: String,
    /// Sending actor
    pub attributed_to: String,
    pub recipient_username: String,
    /// Sanitized HTML content
    pub content: String,
    pub in_reply_to_uri: Option<String>,
    pub published_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// A boost delivered to a local inbox
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Announce {
    pub id: String,
    pub activity_uri: String,
    pub actor_uri: String,
    pub object_uri: String,
    pub recipient_username: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Notification kinds emitted by federation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    Follow,
    Favourite,
    Reblog,
    Mention,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Favourite => "favourite",
            Self::Reblog => "reblog",
            Self::Mention => "mention",
        }
    }
}

/// Stored notification
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    /// Local recipient
    pub username: String,
    pub notification_type: String,
    pub origin_actor_uri: String,
    pub status_uri: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Idempotency ledger
// =============================================================================

/// Record of an inbound activity that has already been handled
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessedActivity {
    pub activity_id: String,
    pub target_username: String,
    pub processed_at: DateTime<Utc>,
}
