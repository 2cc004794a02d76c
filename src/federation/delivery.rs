//! Activity delivery
//!
//! Handles delivering activities to remote servers.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::actor::{ACTIVITY_JSON, Actor};
use super::resolver::RemoteHostPolicy;
use super::signature::SignatureSigner;
use crate::data::LocalAccount;
use crate::error::FederationError;
use crate::metrics::{ACTIVITIES_SENT, FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL};

/// Outcome of one delivery in a fan-out
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Target inbox URI
    pub inbox_uri: String,
    /// Whether delivery succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// HTTP status code if a response was received
    pub status_code: Option<u16>,
}

/// Deduplicate identical inbox URIs while keeping distinct personal inboxes.
///
/// This preserves recipients on the same domain that use different inbox paths.
fn unique_inbox_targets(inbox_uris: Vec<String>) -> Vec<String> {
    use std::collections::HashSet;

    let mut seen = HashSet::new();
    inbox_uris
        .into_iter()
        .filter(|inbox_uri| seen.insert(inbox_uri.clone()))
        .collect()
}

/// Delivers locally-originated activities to remote inboxes
///
/// Every request is signed with the sending actor's key. Failures are
/// reported to the caller; nothing is retried.
#[derive(Clone)]
pub struct OutboxDispatcher {
    http_client: reqwest::Client,
    signer: SignatureSigner,
    policy: RemoteHostPolicy,
    /// Instance base URL, used to derive key ids
    base_url: String,
    /// Maximum in-flight deliveries during fan-out
    concurrency: usize,
}

impl OutboxDispatcher {
    pub fn new(
        http_client: reqwest::Client,
        policy: RemoteHostPolicy,
        base_url: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            http_client,
            signer: SignatureSigner::new(),
            policy,
            base_url: base_url.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Deliver activity to a single inbox
    ///
    /// # Arguments
    /// * `activity` - Activity JSON
    /// * `inbox_uri` - Target inbox URL
    /// * `sender` - Local actor whose key signs the request
    ///
    /// # Errors
    /// `Transport` if the inbox is unreachable or answers non-2xx
    pub async fn deliver(
        &self,
        activity: &serde_json::Value,
        inbox_uri: &str,
        sender: &LocalAccount,
    ) -> Result<(), FederationError> {
        let activity_type = activity
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let transport = |status: Option<u16>, reason: String| FederationError::Transport {
            inbox: inbox_uri.to_string(),
            status,
            reason,
        };

        let url = self
            .policy
            .check(inbox_uri)
            .await
            .map_err(|reason| transport(None, reason))?;

        // 1. Serialize activity
        let body = serde_json::to_vec(activity)
            .map_err(|e| transport(None, format!("failed to serialize activity: {}", e)))?;

        // 2. Sign request
        let key_id = Actor::local(&self.base_url, sender).public_key.id;
        let headers = self.signer.sign(
            "POST",
            url.as_str(),
            &body,
            &sender.private_key_pem,
            &key_id,
        )?;

        // 3. POST to inbox with signed headers
        let timer = FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["deliver"])
            .start_timer();
        let result = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, ACTIVITY_JSON)
            .header(reqwest::header::HOST, headers.host)
            .header(reqwest::header::DATE, headers.date)
            .header("Digest", headers.digest)
            .header("Signature", headers.signature)
            .body(body)
            .send()
            .await;
        timer.observe_duration();

        // 4. Handle response
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&["deliver", "error"])
                    .inc();
                ACTIVITIES_SENT
                    .with_label_values(&[activity_type.as_str(), "error"])
                    .inc();
                return Err(transport(None, e.to_string()));
            }
        };

        let status = response.status();
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["deliver", status.as_str()])
            .inc();

        if !status.is_success() {
            ACTIVITIES_SENT
                .with_label_values(&[activity_type.as_str(), "rejected"])
                .inc();
            return Err(transport(
                Some(status.as_u16()),
                format!("inbox answered HTTP {}", status),
            ));
        }

        ACTIVITIES_SENT
            .with_label_values(&[activity_type.as_str(), "delivered"])
            .inc();
        tracing::info!(inbox = %inbox_uri, activity_type = %activity_type, "Delivered activity");
        Ok(())
    }

    /// Deliver an activity to many inboxes
    ///
    /// Each delivery is independent. In-flight deliveries are bounded by the
    /// configured concurrency; completion order is unspecified.
    ///
    /// # Note
    /// Deduplicates identical inbox URIs while preserving distinct inbox paths.
    pub async fn deliver_many(
        &self,
        activity: serde_json::Value,
        inbox_uris: Vec<String>,
        sender: &LocalAccount,
    ) -> Vec<DeliveryResult> {
        let total_targets = inbox_uris.len();
        let delivery_targets = unique_inbox_targets(inbox_uris);

        tracing::info!(
            "Delivering to {} unique inboxes (deduplicated from {} total)",
            delivery_targets.len(),
            total_targets
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let activity = Arc::new(activity);
        let sender = Arc::new(sender.clone());

        let mut tasks = Vec::new();
        for inbox_uri in delivery_targets {
            let semaphore = semaphore.clone();
            let activity = activity.clone();
            let sender = sender.clone();
            let dispatcher = self.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = dispatcher.deliver(&activity, &inbox_uri, &sender).await;

                match result {
                    Ok(()) => DeliveryResult {
                        inbox_uri,
                        success: true,
                        error: None,
                        status_code: None,
                    },
                    Err(e) => {
                        tracing::warn!(inbox = %inbox_uri, error = %e, "Delivery failed");
                        let status_code = match &e {
                            FederationError::Transport { status, .. } => *status,
                            _ => None,
                        };
                        DeliveryResult {
                            inbox_uri,
                            success: false,
                            error: Some(e.to_string()),
                            status_code,
                        }
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Delivery task panicked: {}", e),
            }
        }

        let success_count = results.iter().filter(|r| r.success).count();
        tracing::info!(
            "Batch delivery complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }
}

/// ActivityPub activity builders
pub mod builder {
    use serde_json::{Value, json};

    use crate::federation::actor::{ACTIVITYSTREAMS_CONTEXT, PUBLIC_COLLECTION};

    /// Build a Follow activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (follower)
    /// * `object` - Object URI (followee)
    pub fn follow(id: &str, actor: &str, object: &str) -> Value {
        json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Follow",
            "id": id,
            "actor": actor,
            "object": object
        })
    }

    /// Build an Accept activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (accepter)
    /// * `object` - Original activity being accepted (usually a Follow)
    pub fn accept(id: &str, actor: &str, object: Value) -> Value {
        json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Accept",
            "id": id,
            "actor": actor,
            "object": object
        })
    }

    /// Build a Like activity
    pub fn like(id: &str, actor: &str, object: &str) -> Value {
        json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Like",
            "id": id,
            "actor": actor,
            "object": object
        })
    }

    /// Build an Undo activity
    ///
    /// # Arguments
    /// * `id` - Activity ID (unique URI)
    /// * `actor` - Actor URI (undoer)
    /// * `object` - Original activity being undone
    pub fn undo(id: &str, actor: &str, object: Value) -> Value {
        json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Undo",
            "id": id,
            "actor": actor,
            "object": object
        })
    }

    /// Build a public Note
    pub fn note(id: &str, attributed_to: &str, content: &str, published: &str) -> Value {
        json!({
            "id": id,
            "type": "Note",
            "attributedTo": attributed_to,
            "content": content,
            "published": published,
            "to": [PUBLIC_COLLECTION],
            "cc": [format!("{}/followers", attributed_to)]
        })
    }

    /// Build a Create activity wrapping `object`, addressed like the object
    pub fn create(id: &str, actor: &str, object: Value) -> Value {
        json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Create",
            "id": id,
            "actor": actor,
            "published": object.get("published").cloned().unwrap_or(Value::Null),
            "to": object.get("to").cloned().unwrap_or_else(|| json!([])),
            "cc": object.get("cc").cloned().unwrap_or_else(|| json!([])),
            "object": object
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_inbox_targets_keeps_first_occurrence_order() {
        let targets = unique_inbox_targets(vec![
            "https://a.example/inbox".to_string(),
            "https://b.example/users/bob/inbox".to_string(),
            "https://a.example/inbox".to_string(),
            "https://b.example/users/carol/inbox".to_string(),
        ]);
        assert_eq!(
            targets,
            vec![
                "https://a.example/inbox",
                "https://b.example/users/bob/inbox",
                "https://b.example/users/carol/inbox",
            ]
        );
    }

    #[test]
    fn accept_wraps_follow() {
        let follow = builder::follow(
            "https://a.example/act/1",
            "https://a.example/users/alice",
            "https://b.example/users/bob",
        );
        let accept = builder::accept(
            "https://b.example/act/2",
            "https://b.example/users/bob",
            follow.clone(),
        );

        assert_eq!(accept["type"], "Accept");
        assert_eq!(accept["object"]["id"], "https://a.example/act/1");
        assert_eq!(accept["object"]["type"], "Follow");
    }

    #[test]
    fn create_copies_note_addressing() {
        let note = builder::note(
            "https://b.example/users/bob/statuses/1",
            "https://b.example/users/bob",
            "<p>hi</p>",
            "2026-01-01T00:00:00Z",
        );
        let create = builder::create(
            "https://b.example/users/bob/statuses/1/activity",
            "https://b.example/users/bob",
            note,
        );

        assert_eq!(create["to"][0], "https://www.w3.org/ns/activitystreams#Public");
        assert_eq!(create["cc"][0], "https://b.example/users/bob/followers");
        assert_eq!(create["published"], "2026-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn delivery_to_disallowed_host_fails_without_network() {
        let dispatcher = OutboxDispatcher::new(
            reqwest::Client::new(),
            RemoteHostPolicy::new(false),
            "https://b.example",
            4,
        );
        let sender = LocalAccount {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            username: "bob".to_string(),
            display_name: None,
            note: None,
            private_key_pem: "unused".to_string(),
            public_key_pem: "unused".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let results = dispatcher
            .deliver_many(
                serde_json::json!({ "type": "Create" }),
                vec![
                    "http://127.0.0.1:9/inbox".to_string(),
                    "http://127.0.0.1:9/inbox".to_string(),
                    "http://localhost/inbox".to_string(),
                ],
                &sender,
            )
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success && r.status_code.is_none()));
    }
}
