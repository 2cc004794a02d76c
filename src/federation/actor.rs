//! ActivityPub actor documents
//!
//! `Actor` is the protocol view of an identity, local or remote. Remote
//! actors are parsed from fetched documents; local actors are derived from a
//! stored account and never carry private key material.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::signature::strip_fragment;
use crate::data::LocalAccount;
use crate::error::FederationError;

pub const ACTIVITY_JSON: &str = "application/activity+json";
pub const LD_JSON: &str = "application/ld+json";
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Whether a Content-Type or Accept value names an ActivityPub document type
pub fn is_activity_json(value: &str) -> bool {
    value.split(',').any(|part| {
        let media_type = part
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        media_type == ACTIVITY_JSON || media_type == LD_JSON
    })
}

/// Actor public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// Always `{actor id}#main-key` for local actors
    pub id: String,
    pub owner: String,
    pub public_key_pem: String,
}

/// ActivityPub actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Canonical URI
    pub id: String,
    pub kind: String,
    pub preferred_username: Option<String>,
    pub name: Option<String>,
    pub inbox: String,
    pub outbox: Option<String>,
    pub followers: Option<String>,
    pub following: Option<String>,
    pub shared_inbox: Option<String>,
    pub public_key: PublicKey,
}

impl Actor {
    /// Actor view of a local account
    pub fn local(base_url: &str, account: &LocalAccount) -> Self {
        let id = local_actor_uri(base_url, &account.username);
        Self {
            kind: "Person".to_string(),
            preferred_username: Some(account.username.clone()),
            name: account.display_name.clone(),
            inbox: format!("{}/inbox", id),
            outbox: Some(format!("{}/outbox", id)),
            followers: Some(format!("{}/followers", id)),
            following: Some(format!("{}/following", id)),
            shared_inbox: None,
            public_key: PublicKey {
                id: format!("{}#main-key", id),
                owner: id.clone(),
                public_key_pem: account.public_key_pem.clone(),
            },
            id,
        }
    }

    /// Parse a fetched actor document
    ///
    /// # Errors
    /// - `ActorUnreachable` if the document lacks an id or inbox
    /// - `NoPublicKey` if `publicKey` is absent, incomplete, or owned by another actor
    pub fn from_document(document: &Value) -> Result<Self, FederationError> {
        let str_field = |value: &Value, name: &str| -> Option<String> {
            value.get(name).and_then(Value::as_str).map(str::to_string)
        };

        let id = str_field(document, "id").ok_or_else(|| {
            FederationError::ActorUnreachable("actor document has no id".to_string())
        })?;
        let inbox = str_field(document, "inbox").ok_or_else(|| {
            FederationError::ActorUnreachable(format!("actor {} has no inbox", id))
        })?;

        let key = document
            .get("publicKey")
            .ok_or_else(|| FederationError::NoPublicKey(id.clone()))?;
        let public_key = PublicKey {
            id: str_field(key, "id").ok_or_else(|| FederationError::NoPublicKey(id.clone()))?,
            owner: str_field(key, "owner")
                .ok_or_else(|| FederationError::NoPublicKey(id.clone()))?,
            public_key_pem: str_field(key, "publicKeyPem")
                .ok_or_else(|| FederationError::NoPublicKey(id.clone()))?,
        };

        if public_key.owner != id || strip_fragment(&public_key.id) != id {
            return Err(FederationError::NoPublicKey(format!(
                "{} advertises a key owned by {}",
                id, public_key.owner
            )));
        }

        let shared_inbox = document
            .get("endpoints")
            .and_then(|endpoints| str_field(endpoints, "sharedInbox"));

        Ok(Self {
            kind: str_field(document, "type").unwrap_or_else(|| "Person".to_string()),
            preferred_username: str_field(document, "preferredUsername"),
            name: str_field(document, "name"),
            inbox,
            outbox: str_field(document, "outbox"),
            followers: str_field(document, "followers"),
            following: str_field(document, "following"),
            shared_inbox,
            public_key,
            id,
        })
    }

    /// Serialize as an ActivityPub document
    pub fn to_document(&self) -> Value {
        let mut document = json!({
            "@context": [ACTIVITYSTREAMS_CONTEXT, SECURITY_CONTEXT],
            "id": self.id,
            "type": self.kind,
            "preferredUsername": self.preferred_username,
            "inbox": self.inbox,
            "outbox": self.outbox,
            "followers": self.followers,
            "following": self.following,
            "publicKey": self.public_key,
        });

        if let Some(name) = &self.name {
            document["name"] = json!(name);
        }
        if let Some(shared_inbox) = &self.shared_inbox {
            document["endpoints"] = json!({ "sharedInbox": shared_inbox });
        }

        document
    }

    /// Inbox to deliver to, preferring the shared inbox
    pub fn delivery_inbox(&self) -> &str {
        self.shared_inbox.as_deref().unwrap_or(&self.inbox)
    }
}

/// Canonical URI of a local actor
pub fn local_actor_uri(base_url: &str, username: &str) -> String {
    format!("{}/users/{}", base_url.trim_end_matches('/'), username)
}
