//! Account service
//!
//! Handles the lifecycle of local actors.

use std::sync::Arc;

use crate::data::{Database, EntityId, LocalAccount};
use crate::error::AppError;
use crate::federation::KeyPairProvider;

const MAX_USERNAME_LEN: usize = 30;

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Usernames are `[a-z0-9_]{1,30}`
fn validate_username(username: &str) -> Result<(), AppError> {
    if username.is_empty() {
        return Err(AppError::Validation("username cannot be empty".to_string()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(AppError::Validation(
            "username may only contain a-z, 0-9 and _".to_string(),
        ));
    }
    Ok(())
}

/// Account service
pub struct AccountService {
    db: Arc<Database>,
    keys: Arc<dyn KeyPairProvider>,
}

impl AccountService {
    /// Create new account service
    pub fn new(db: Arc<Database>, keys: Arc<dyn KeyPairProvider>) -> Self {
        Self { db, keys }
    }

    /// Get a local account by username
    pub async fn get_account(&self, username: &str) -> Result<LocalAccount, AppError> {
        self.db
            .get_account_by_username(username)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Create a local actor
    ///
    /// The key pair is generated before anything is written, so a key
    /// generation failure leaves no account behind.
    ///
    /// # Arguments
    /// * `username` - Local username (no @domain)
    /// * `display_name` - Optional display name
    /// * `note` - Optional bio
    ///
    /// # Errors
    /// - `Validation` for an invalid username
    /// - `Conflict` if the username is taken
    pub async fn create_local_actor(
        &self,
        username: &str,
        display_name: Option<&str>,
        note: Option<&str>,
    ) -> Result<LocalAccount, AppError> {
        let username = username.trim();
        validate_username(username)?;

        // Fast-path guard before expensive key generation.
        if self.db.get_account_by_username(username).await?.is_some() {
            return Err(AppError::Conflict(format!("username {} is taken", username)));
        }

        let keys = self.keys.clone();
        let pair = tokio::task::spawn_blocking(move || keys.generate())
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let now = chrono::Utc::now();
        let account = LocalAccount {
            id: EntityId::new().0,
            username: username.to_string(),
            display_name: normalize_optional_text(display_name),
            note: normalize_optional_text(note),
            private_key_pem: pair.private_key_pem,
            public_key_pem: pair.public_key_pem,
            created_at: now,
            updated_at: now,
        };

        if !self.db.insert_account(&account).await? {
            return Err(AppError::Conflict(format!("username {} is taken", username)));
        }

        tracing::info!(username = %account.username, "Local actor created");
        Ok(account)
    }

    /// Create the bootstrap actor if it does not exist yet
    ///
    /// # Returns
    /// The existing or newly created account
    pub async fn ensure_account(
        &self,
        username: &str,
        display_name: &str,
        note: Option<&str>,
    ) -> Result<LocalAccount, AppError> {
        if let Some(account) = self.db.get_account_by_username(username).await? {
            tracing::info!(username = %account.username, "Admin account exists");
            return Ok(account);
        }

        match self
            .create_local_actor(username, Some(display_name), note)
            .await
        {
            // Lost a creation race with another instance of ourselves
            Err(AppError::Conflict(_)) => self.get_account(username).await,
            other => other,
        }
    }

    /// Follower inbox URIs for outbound fan-out
    pub async fn get_follower_inboxes(&self, username: &str) -> Result<Vec<String>, AppError> {
        self.db.get_follower_inboxes(username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::federation::{KeyPair, MockKeyPairProvider, RsaKeyPairProvider};
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (Arc::new(db), temp_dir)
    }

    fn fixed_keys() -> MockKeyPairProvider {
        let mut keys = MockKeyPairProvider::new();
        keys.expect_generate().returning(|| {
            Ok(KeyPair {
                public_key_pem: "public".to_string(),
                private_key_pem: "private".to_string(),
            })
        });
        keys
    }

    #[tokio::test]
    async fn create_local_actor_creates_and_rejects_duplicate() {
        let (db, _temp_dir) = create_test_db().await;
        let service = AccountService::new(db, Arc::new(RsaKeyPairProvider::with_bits(1024)));

        let account = service
            .create_local_actor("bob", Some(" Bob "), None)
            .await
            .unwrap();
        assert_eq!(account.username, "bob");
        assert_eq!(account.display_name.as_deref(), Some("Bob"));
        assert!(account.private_key_pem.contains("PRIVATE KEY"));

        let err = service.create_local_actor("bob", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_local_actor_rejects_invalid_usernames() {
        let (db, _temp_dir) = create_test_db().await;
        let mut keys = MockKeyPairProvider::new();
        keys.expect_generate().never();
        let service = AccountService::new(db, Arc::new(keys));

        for username in ["", "Bob", "bo b", "bob@b.example", &"a".repeat(31)] {
            let err = service
                .create_local_actor(username, None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{username}");
        }
    }

    #[tokio::test]
    async fn key_generation_failure_leaves_no_account() {
        let (db, _temp_dir) = create_test_db().await;
        let mut keys = MockKeyPairProvider::new();
        keys.expect_generate()
            .returning(|| Err(FederationError::Key("entropy unavailable".to_string())));
        let service = AccountService::new(db.clone(), Arc::new(keys));

        assert!(service.create_local_actor("bob", None, None).await.is_err());
        assert!(db.get_account_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_account_is_idempotent() {
        let (db, _temp_dir) = create_test_db().await;
        let service = AccountService::new(db.clone(), Arc::new(fixed_keys()));

        let first = service.ensure_account("admin", "Admin", Some("hi")).await.unwrap();
        let second = service.ensure_account("admin", "Admin", None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.note.as_deref(), Some("hi"));
        assert_eq!(db.count_accounts().await.unwrap(), 1);
    }
}
