//! WebFinger protocol implementation
//!
//! Used to discover ActivityPub actor URIs from `user@domain` handles, and to
//! answer discovery queries for local actors.

use serde::{Deserialize, Serialize};

use super::actor::{ACTIVITY_JSON, is_activity_json};

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl WebFingerResponse {
    /// Domain part of `acct:user@domain`, lowercased
    pub fn subject_domain(&self) -> Option<String> {
        let account = self.subject.strip_prefix("acct:").unwrap_or(&self.subject);
        let (_, domain) = account.rsplit_once('@')?;
        Some(domain.to_ascii_lowercase())
    }

    /// The `rel="self"` ActivityPub link
    pub fn actor_uri(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| {
                link.rel == "self"
                    && link.link_type.as_deref().is_some_and(is_activity_json)
            })
            .and_then(|link| link.href.as_deref())
    }
}

/// A `user@domain` handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub username: String,
    /// Lowercased host, with port when present
    pub domain: String,
}

impl Handle {
    /// Parse `user@domain`, `@user@domain` or `acct:user@domain`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("acct:").unwrap_or(trimmed);
        let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
        let (username, domain) = trimmed.split_once('@')?;

        if username.is_empty() || domain.is_empty() || domain.contains(['@', '/', '?', '#']) {
            return None;
        }

        Some(Self {
            username: username.to_string(),
            domain: domain.to_ascii_lowercase(),
        })
    }

    /// `acct:` resource for a WebFinger query
    pub fn resource(&self) -> String {
        format!("acct:{}@{}", self.username, self.domain)
    }
}

/// Generate WebFinger response for a local account.
///
/// # Arguments
/// * `username` - Local username
/// * `domain` - Instance domain
/// * `base_url` - Instance base URL (includes protocol)
pub fn generate_webfinger_response(
    username: &str,
    domain: &str,
    base_url: &str,
) -> WebFingerResponse {
    let subject = format!("acct:{}@{}", username, domain);
    let actor_url = super::actor::local_actor_uri(base_url, username);

    WebFingerResponse {
        subject,
        aliases: Some(vec![actor_url.clone()]),
        links: vec![
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some(ACTIVITY_JSON.to_string()),
                href: Some(actor_url.clone()),
                template: None,
            },
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(format!("{}/@{}", base_url.trim_end_matches('/'), username)),
                template: None,
            },
        ],
    }
}
