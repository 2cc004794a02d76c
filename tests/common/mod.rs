//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;

use fedipost::data::LocalAccount;
use fedipost::federation::{RsaKeyPairProvider, SignatureSigner, local_actor_uri};
use fedipost::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
///
/// Serves on a random loopback port. The public domain is that address, so
/// two instances can federate with each other over plain HTTP.
pub struct TestServer {
    pub addr: String,
    pub domain: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server whose admin actor is `admin`
    pub async fn new() -> Self {
        Self::with_admin("admin").await
    }

    /// Create a new test server with the given admin actor
    pub async fn with_admin(username: &str) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind to random port first; the domain includes it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let domain = local_addr.to_string();

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: local_addr.port(),
                domain: domain.clone(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            admin: config::AdminConfig {
                username: username.to_string(),
                display_name: format!("Test {}", username),
                note: Some("Test account".to_string()),
            },
            federation: config::FederationConfig {
                fetch_timeout_seconds: 5,
                allow_private_hosts: true,
                remote_scheme: "http".to_string(),
                ..config::FederationConfig::default()
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        config.validate().unwrap();

        // Initialize app state with small keys to keep tests fast
        let state = AppState::with_key_provider(
            config,
            Arc::new(RsaKeyPairProvider::with_bits(1024)),
        )
        .await
        .unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Spawn server in background
        let app = fedipost::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", domain),
            domain,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get URL for a path on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// A local account, including key material
    pub async fn account(&self, username: &str) -> LocalAccount {
        self.state
            .db
            .get_account_by_username(username)
            .await
            .unwrap()
            .unwrap()
    }

    /// Canonical actor URI of a local user
    pub fn actor_uri(&self, username: &str) -> String {
        local_actor_uri(&self.addr, username)
    }

    /// `user@domain` handle of a local user
    pub fn handle(&self, username: &str) -> String {
        format!("{}@{}", username, self.domain)
    }

    /// Create an additional local actor
    pub async fn create_account(&self, username: &str) -> LocalAccount {
        self.state
            .accounts
            .create_local_actor(username, None, None)
            .await
            .unwrap()
    }
}

/// POST a signed activity to `inbox_url`
///
/// The request is signed with `signer`'s key under `key_id`, covering the
/// headers `covered` in that order.
pub async fn post_signed(
    client: &reqwest::Client,
    inbox_url: &str,
    activity: &Value,
    signer: &LocalAccount,
    key_id: &str,
    covered: &[&str],
) -> reqwest::Response {
    let body = serde_json::to_vec(activity).unwrap();
    post_signed_body(client, inbox_url, body.clone(), body, signer, key_id, covered).await
}

/// Like `post_signed`, but the signed body and the sent body may differ
pub async fn post_signed_body(
    client: &reqwest::Client,
    inbox_url: &str,
    signed_body: Vec<u8>,
    sent_body: Vec<u8>,
    signer: &LocalAccount,
    key_id: &str,
    covered: &[&str],
) -> reqwest::Response {
    let headers = SignatureSigner::with_covered_headers(covered)
        .sign("POST", inbox_url, &signed_body, &signer.private_key_pem, key_id)
        .unwrap();

    client
        .post(inbox_url)
        .header("Content-Type", "application/activity+json")
        .header("Host", headers.host)
        .header("Date", headers.date)
        .header("Digest", headers.digest)
        .header("Signature", headers.signature)
        .body(sent_body)
        .send()
        .await
        .unwrap()
}

/// Default covered headers
pub const DEFAULT_COVERED: [&str; 4] = ["(request-target)", "host", "date", "digest"];
