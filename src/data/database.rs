//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Local accounts
    // =========================================================================

    /// Get a local account by username
    pub async fn get_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalAccount>, AppError> {
        let account =
            sqlx::query_as::<_, LocalAccount>("SELECT * FROM accounts WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(account)
    }

    /// Insert a new local account
    ///
    /// # Returns
    /// `false` if the username is already taken
    pub async fn insert_account(&self, account: &LocalAccount) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO accounts (
                id, username, display_name, note, private_key_pem, public_key_pem,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.username)
        .bind(&account.display_name)
        .bind(&account.note)
        .bind(&account.private_key_pem)
        .bind(&account.public_key_pem)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count local accounts
    pub async fn count_accounts(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Followers (remote -> local)
    // =========================================================================

    /// Insert follower unless the relationship already exists
    ///
    /// # Returns
    /// `true` if a new relationship was stored
    pub async fn insert_follower(&self, follower: &Follower) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO followers (
                id, username, follower_uri, inbox_uri, follow_activity_uri, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&follower.id)
        .bind(&follower.username)
        .bind(&follower.follower_uri)
        .bind(&follower.inbox_uri)
        .bind(&follower.follow_activity_uri)
        .bind(follower.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a follower of a local actor
    pub async fn delete_follower(
        &self,
        username: &str,
        follower_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM followers WHERE username = ? AND follower_uri = ?")
            .bind(username)
            .bind(follower_uri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a follower by the URI of the Follow activity that created it
    pub async fn delete_follower_by_activity(
        &self,
        follower_uri: &str,
        follow_activity_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM followers WHERE follower_uri = ? AND follow_activity_uri = ?",
        )
        .bind(follower_uri)
        .bind(follow_activity_uri)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get followers of a local actor
    pub async fn get_followers(&self, username: &str) -> Result<Vec<Follower>, AppError> {
        let followers = sqlx::query_as::<_, Follower>(
            "SELECT * FROM followers WHERE username = ? ORDER BY created_at DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(followers)
    }

    /// Get follower inbox URIs for activity delivery
    pub async fn get_follower_inboxes(&self, username: &str) -> Result<Vec<String>, AppError> {
        let inboxes = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT inbox_uri FROM followers WHERE username = ?",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(inboxes)
    }

    // =========================================================================
    // Follows (local -> remote)
    // =========================================================================

    /// Insert outbound follow unless one already exists for the target
    pub async fn insert_follow(&self, follow: &Follow) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO follows (
                id, username, target_uri, target_inbox_uri, follow_activity_uri, accepted,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&follow.id)
        .bind(&follow.username)
        .bind(&follow.target_uri)
        .bind(&follow.target_inbox_uri)
        .bind(&follow.follow_activity_uri)
        .bind(follow.accepted)
        .bind(follow.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get outbound follow of a target
    pub async fn get_follow(
        &self,
        username: &str,
        target_uri: &str,
    ) -> Result<Option<Follow>, AppError> {
        let follow = sqlx::query_as::<_, Follow>(
            "SELECT * FROM follows WHERE username = ? AND target_uri = ?",
        )
        .bind(username)
        .bind(target_uri)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }

    /// Mark an outbound follow as accepted by its target
    pub async fn accept_follow(
        &self,
        follow_activity_uri: &str,
        target_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE follows SET accepted = 1 WHERE follow_activity_uri = ? AND target_uri = ?",
        )
        .bind(follow_activity_uri)
        .bind(target_uri)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an outbound follow rejected by its target
    pub async fn delete_follow_by_activity(
        &self,
        follow_activity_uri: &str,
        target_uri: &str,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follow_activity_uri = ? AND target_uri = ?")
                .bind(follow_activity_uri)
                .bind(target_uri)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an outbound follow
    pub async fn delete_follow(&self, username: &str, target_uri: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE username = ? AND target_uri = ?")
            .bind(username)
            .bind(target_uri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Actor URIs a local actor follows (accepted follows only)
    pub async fn get_following_uris(&self, username: &str) -> Result<Vec<String>, AppError> {
        let uris = sqlx::query_scalar::<_, String>(
            "SELECT target_uri FROM follows WHERE username = ? AND accepted = 1 ORDER BY created_at DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(uris)
    }

    // =========================================================================
    // Local posts and likes
    // =========================================================================

    /// Insert a local post
    pub async fn insert_status(&self, status: &Status) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO statuses (id, uri, username, content, like_count, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&status.id)
        .bind(&status.uri)
        .bind(&status.username)
        .bind(&status.content)
        .bind(status.like_count)
        .bind(status.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a local post by URI
    pub async fn get_status_by_uri(&self, uri: &str) -> Result<Option<Status>, AppError> {
        let status = sqlx::query_as::<_, Status>("SELECT * FROM statuses WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(status)
    }

    /// Latest posts of a local actor
    pub async fn get_statuses_by_username(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<Status>, AppError> {
        let statuses = sqlx::query_as::<_, Status>(
            "SELECT * FROM statuses WHERE username = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(username)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(statuses)
    }

    /// Store a Like and bump the post's counter
    ///
    /// Both happen in one transaction; an actor liking the same post twice
    /// leaves the counter unchanged.
    ///
    /// # Returns
    /// `true` if the like was new
    pub async fn record_like(&self, like: &Like) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO likes (id, activity_uri, actor_uri, object_uri, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&like.id)
        .bind(&like.activity_uri)
        .bind(&like.actor_uri)
        .bind(&like.object_uri)
        .bind(like.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            sqlx::query("UPDATE statuses SET like_count = like_count + 1 WHERE uri = ?")
                .bind(&like.object_uri)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Remove a Like and decrement the post's counter
    ///
    /// # Returns
    /// `true` if a like existed
    pub async fn remove_like(&self, actor_uri: &str, object_uri: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM likes WHERE actor_uri = ? AND object_uri = ?")
            .bind(actor_uri)
            .bind(object_uri)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            sqlx::query(
                "UPDATE statuses SET like_count = like_count - 1 WHERE uri = ? AND like_count > 0",
            )
            .bind(object_uri)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Look up a Like by its activity URI
    pub async fn get_like_by_activity(
        &self,
        activity_uri: &str,
    ) -> Result<Option<Like>, AppError> {
        let like = sqlx::query_as::<_, Like>("SELECT * FROM likes WHERE activity_uri = ?")
            .bind(activity_uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(like)
    }

    // =========================================================================
    // Remote posts and boosts
    // =========================================================================

    /// Store a remote post reference
    pub async fn insert_remote_post(&self, post: &RemotePost) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO remote_posts (
                id, uri, activity_uri, attributed_to, recipient_username, content,
                in_reply_to_uri, published_at, received_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.uri)
        .bind(&post.activity_uri)
        .bind(&post.attributed_to)
        .bind(&post.recipient_username)
        .bind(&post.content)
        .bind(&post.in_reply_to_uri)
        .bind(post.published_at)
        .bind(post.received_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remote posts delivered to a local actor
    pub async fn get_remote_posts(&self, username: &str) -> Result<Vec<RemotePost>, AppError> {
        let posts = sqlx::query_as::<_, RemotePost>(
            "SELECT * FROM remote_posts WHERE recipient_username = ? ORDER BY published_at DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Store a boost reference
    pub async fn insert_announce(&self, announce: &Announce) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO announces (
                id, activity_uri, actor_uri, object_uri, recipient_username, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&announce.id)
        .bind(&announce.activity_uri)
        .bind(&announce.actor_uri)
        .bind(&announce.object_uri)
        .bind(&announce.recipient_username)
        .bind(announce.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a boost by its Announce activity URI
    pub async fn delete_announce(
        &self,
        actor_uri: &str,
        activity_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM announces WHERE actor_uri = ? AND activity_uri = ?")
            .bind(actor_uri)
            .bind(activity_uri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Boosts delivered to a local actor
    pub async fn get_announces(&self, username: &str) -> Result<Vec<Announce>, AppError> {
        let announces = sqlx::query_as::<_, Announce>(
            "SELECT * FROM announces WHERE recipient_username = ? ORDER BY created_at DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(announces)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Insert notification
    pub async fn insert_notification(&self, notification: &Notification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, username, notification_type, origin_actor_uri, status_uri, read, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.username)
        .bind(&notification.notification_type)
        .bind(&notification.origin_actor_uri)
        .bind(&notification.status_uri)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest notifications for a local actor
    pub async fn get_notifications(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE username = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(username)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    // =========================================================================
    // Processed activity ledger
    // =========================================================================

    /// Record an inbound activity id
    ///
    /// The ledger holds one row per activity id. Concurrent deliveries of the
    /// same activity race on the primary key and exactly one of them wins.
    ///
    /// # Returns
    /// `true` if this call created the record, `false` if it already existed
    pub async fn record_processed_activity(
        &self,
        activity_id: &str,
        target_username: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_activities (activity_id, target_username, processed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(activity_id) DO NOTHING
            "#,
        )
        .bind(activity_id)
        .bind(target_username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Look up a ledger entry
    pub async fn get_processed_activity(
        &self,
        activity_id: &str,
    ) -> Result<Option<ProcessedActivity>, AppError> {
        let record = sqlx::query_as::<_, ProcessedActivity>(
            "SELECT * FROM processed_activities WHERE activity_id = ?",
        )
        .bind(activity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
