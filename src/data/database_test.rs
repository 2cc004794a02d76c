//! Database tests

use super::*;
use chrono::Utc;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn test_account(username: &str) -> LocalAccount {
    LocalAccount {
        id: EntityId::new().0,
        username: username.to_string(),
        display_name: Some("Test User".to_string()),
        note: None,
        private_key_pem: "test_private_key".to_string(),
        public_key_pem: "test_public_key".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_status(uri: &str) -> Status {
    Status {
        id: EntityId::new().0,
        uri: uri.to_string(),
        username: "bob".to_string(),
        content: "<p>Hello, world!</p>".to_string(),
        like_count: 0,
        created_at: Utc::now(),
    }
}

fn test_like(activity_uri: &str, actor_uri: &str, object_uri: &str) -> Like {
    Like {
        id: EntityId::new().0,
        activity_uri: activity_uri.to_string(),
        actor_uri: actor_uri.to_string(),
        object_uri: object_uri.to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (db, _temp_dir) = create_test_db().await;
    assert_eq!(db.count_accounts().await.unwrap(), 0);
}

#[tokio::test]
async fn test_account_insert_and_get() {
    let (db, _temp_dir) = create_test_db().await;

    assert!(db.insert_account(&test_account("bob")).await.unwrap());

    let retrieved = db.get_account_by_username("bob").await.unwrap().unwrap();
    assert_eq!(retrieved.username, "bob");
    assert_eq!(retrieved.private_key_pem, "test_private_key");
    assert!(db.get_account_by_username("carol").await.unwrap().is_none());
}

#[tokio::test]
async fn test_account_username_is_unique() {
    let (db, _temp_dir) = create_test_db().await;

    assert!(db.insert_account(&test_account("bob")).await.unwrap());
    assert!(!db.insert_account(&test_account("bob")).await.unwrap());
    assert_eq!(db.count_accounts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_follower_insert_is_idempotent() {
    let (db, _temp_dir) = create_test_db().await;

    let follower = Follower {
        id: EntityId::new().0,
        username: "bob".to_string(),
        follower_uri: "https://a.example/users/alice".to_string(),
        inbox_uri: "https://a.example/users/alice/inbox".to_string(),
        follow_activity_uri: "https://a.example/act/1".to_string(),
        created_at: Utc::now(),
    };

    assert!(db.insert_follower(&follower).await.unwrap());
    let duplicate = Follower {
        id: EntityId::new().0,
        follow_activity_uri: "https://a.example/act/2".to_string(),
        ..follower.clone()
    };
    assert!(!db.insert_follower(&duplicate).await.unwrap());
    assert_eq!(db.get_followers("bob").await.unwrap().len(), 1);

    assert!(
        db.delete_follower_by_activity("https://a.example/users/alice", "https://a.example/act/1")
            .await
            .unwrap()
    );
    assert!(
        !db.delete_follower("bob", "https://a.example/users/alice")
            .await
            .unwrap()
    );
    assert!(db.get_followers("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_follower_inboxes_are_distinct() {
    let (db, _temp_dir) = create_test_db().await;

    for (actor, activity) in [("alice", "1"), ("carol", "2")] {
        let follower = Follower {
            id: EntityId::new().0,
            username: "bob".to_string(),
            follower_uri: format!("https://a.example/users/{actor}"),
            inbox_uri: "https://a.example/inbox".to_string(),
            follow_activity_uri: format!("https://a.example/act/{activity}"),
            created_at: Utc::now(),
        };
        db.insert_follower(&follower).await.unwrap();
    }

    let inboxes = db.get_follower_inboxes("bob").await.unwrap();
    assert_eq!(inboxes, vec!["https://a.example/inbox".to_string()]);
}

#[tokio::test]
async fn test_follow_accept_and_reject() {
    let (db, _temp_dir) = create_test_db().await;

    let follow = Follow {
        id: EntityId::new().0,
        username: "alice".to_string(),
        target_uri: "https://b.example/users/bob".to_string(),
        target_inbox_uri: "https://b.example/users/bob/inbox".to_string(),
        follow_activity_uri: "https://a.example/act/1".to_string(),
        accepted: false,
        created_at: Utc::now(),
    };
    assert!(db.insert_follow(&follow).await.unwrap());
    assert!(db.get_following_uris("alice").await.unwrap().is_empty());

    // Accept from a different actor must not apply
    assert!(
        !db.accept_follow("https://a.example/act/1", "https://evil.example/users/mallory")
            .await
            .unwrap()
    );
    assert!(
        db.accept_follow("https://a.example/act/1", "https://b.example/users/bob")
            .await
            .unwrap()
    );
    assert_eq!(
        db.get_following_uris("alice").await.unwrap(),
        vec!["https://b.example/users/bob".to_string()]
    );

    assert!(
        db.delete_follow_by_activity("https://a.example/act/1", "https://b.example/users/bob")
            .await
            .unwrap()
    );
    assert!(
        db.get_follow("alice", "https://b.example/users/bob")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_like_counter_follows_like_records() {
    let (db, _temp_dir) = create_test_db().await;
    let post_uri = "https://b.example/users/bob/statuses/1";
    db.insert_status(&test_status(post_uri)).await.unwrap();

    let like = test_like(
        "https://a.example/act/like1",
        "https://a.example/users/alice",
        post_uri,
    );
    assert!(db.record_like(&like).await.unwrap());

    // Same actor, same post, new activity id
    let again = test_like(
        "https://a.example/act/like2",
        "https://a.example/users/alice",
        post_uri,
    );
    assert!(!db.record_like(&again).await.unwrap());

    let status = db.get_status_by_uri(post_uri).await.unwrap().unwrap();
    assert_eq!(status.like_count, 1);

    let stored = db
        .get_like_by_activity("https://a.example/act/like1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.object_uri, post_uri);

    assert!(
        db.remove_like("https://a.example/users/alice", post_uri)
            .await
            .unwrap()
    );
    assert!(
        !db.remove_like("https://a.example/users/alice", post_uri)
            .await
            .unwrap()
    );

    let status = db.get_status_by_uri(post_uri).await.unwrap().unwrap();
    assert_eq!(status.like_count, 0);
}

#[tokio::test]
async fn test_remote_post_and_announce() {
    let (db, _temp_dir) = create_test_db().await;

    let post = RemotePost {
        id: EntityId::new().0,
        uri: "https://a.example/notes/1".to_string(),
        activity_uri: "https://a.example/act/create1".to_string(),
        attributed_to: "https://a.example/users/alice".to_string(),
        recipient_username: "bob".to_string(),
        content: "<p>hi</p>".to_string(),
        in_reply_to_uri: None,
        published_at: Utc::now(),
        received_at: Utc::now(),
    };
    assert!(db.insert_remote_post(&post).await.unwrap());
    assert!(!db.insert_remote_post(&post).await.unwrap());
    assert_eq!(db.get_remote_posts("bob").await.unwrap().len(), 1);

    let announce = Announce {
        id: EntityId::new().0,
        activity_uri: "https://a.example/act/boost1".to_string(),
        actor_uri: "https://a.example/users/alice".to_string(),
        object_uri: "https://c.example/notes/9".to_string(),
        recipient_username: "bob".to_string(),
        created_at: Utc::now(),
    };
    assert!(db.insert_announce(&announce).await.unwrap());
    assert_eq!(db.get_announces("bob").await.unwrap().len(), 1);

    // Only the announcing actor can remove it
    assert!(
        !db.delete_announce("https://evil.example/users/mallory", "https://a.example/act/boost1")
            .await
            .unwrap()
    );
    assert!(
        db.delete_announce("https://a.example/users/alice", "https://a.example/act/boost1")
            .await
            .unwrap()
    );
    assert!(db.get_announces("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_notifications() {
    let (db, _temp_dir) = create_test_db().await;

    let notification = Notification {
        id: EntityId::new().0,
        username: "bob".to_string(),
        notification_type: NotificationType::Follow.as_str().to_string(),
        origin_actor_uri: "https://a.example/users/alice".to_string(),
        status_uri: None,
        read: false,
        created_at: Utc::now(),
    };
    db.insert_notification(&notification).await.unwrap();

    let stored = db.get_notifications("bob", 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].notification_type, "follow");
    assert!(db.get_notifications("alice", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_processed_activity_ledger() {
    let (db, _temp_dir) = create_test_db().await;

    assert!(
        db.record_processed_activity("https://a.example/act/1", "bob")
            .await
            .unwrap()
    );
    assert!(
        !db.record_processed_activity("https://a.example/act/1", "bob")
            .await
            .unwrap()
    );

    let record = db
        .get_processed_activity("https://a.example/act/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.target_username, "bob");
    assert!(
        db.get_processed_activity("https://a.example/act/2")
            .await
            .unwrap()
            .is_none()
    );
}
