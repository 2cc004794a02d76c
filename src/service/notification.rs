//! Notification service
//!
//! Federation emits notifications through the narrow `NotificationSink`
//! capability; the database-backed implementation lives here.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::data::{Database, EntityId, Notification, NotificationType};
use crate::error::AppError;

/// A notification to deliver to a local actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Local recipient username
    pub recipient: String,
    pub kind: NotificationType,
    /// Remote actor that caused the notification
    pub origin_actor: String,
    pub status_uri: Option<String>,
}

/// Notification emission capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> Result<(), AppError>;
}

/// Stores notifications in the database
pub struct NotificationService {
    db: Arc<Database>,
}

impl NotificationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Latest notifications for a local actor
    pub async fn list(&self, username: &str, limit: usize) -> Result<Vec<Notification>, AppError> {
        self.db.get_notifications(username, limit).await
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    async fn notify(&self, event: NotificationEvent) -> Result<(), AppError> {
        let notification = Notification {
            id: EntityId::new().0,
            username: event.recipient,
            notification_type: event.kind.as_str().to_string(),
            origin_actor_uri: event.origin_actor,
            status_uri: event.status_uri,
            read: false,
            created_at: Utc::now(),
        };

        self.db.insert_notification(&notification).await?;
        tracing::debug!(
            recipient = %notification.username,
            kind = %notification.notification_type,
            origin = %notification.origin_actor_uri,
            "Notification created"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn notify_persists_notification() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&temp_dir.path().join("test.db")).await.unwrap());
        let service = NotificationService::new(db);

        service
            .notify(NotificationEvent {
                recipient: "bob".to_string(),
                kind: NotificationType::Favourite,
                origin_actor: "https://a.example/users/alice".to_string(),
                status_uri: Some("https://b.example/users/bob/statuses/1".to_string()),
            })
            .await
            .unwrap();

        let stored = service.list("bob", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].notification_type, "favourite");
        assert_eq!(stored[0].origin_actor_uri, "https://a.example/users/alice");
    }
}
