//! Inbound activity model
//!
//! Activities arrive as loosely-shaped JSON-LD. They are parsed once into
//! `Activity`, which the inbox state machine dispatches on.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::FederationError;

/// ActivityPub Activity types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityKind {
    Follow,
    Undo,
    Like,
    Create,
    Announce,
    Accept,
    Reject,
    /// Any type the inbox does not handle
    Other(String),
}

impl ActivityKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "Follow" => Self::Follow,
            "Undo" => Self::Undo,
            "Like" => Self::Like,
            "Create" => Self::Create,
            "Announce" => Self::Announce,
            "Accept" => Self::Accept,
            "Reject" => Self::Reject,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Follow => "Follow",
            Self::Undo => "Undo",
            Self::Like => "Like",
            Self::Create => "Create",
            Self::Announce => "Announce",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Other(other) => other,
        }
    }

    fn is_activity(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// An activity nested as the object of another (e.g. the Follow inside an Undo)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedActivity {
    pub id: Option<String>,
    pub kind: ActivityKind,
    pub actor: Option<String>,
    /// Object URI of the nested activity
    pub object: Option<String>,
}

/// Object of an activity
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityObject {
    /// Bare URI reference
    Uri(String),
    /// Nested activity of a known type
    Activity(Box<EmbeddedActivity>),
    /// Any other embedded object (Note, Person, ...); `Null` when absent
    Object(Box<Value>),
}

impl ActivityObject {
    fn from_value(value: &Value) -> Self {
        if let Some(uri) = value.as_str() {
            return Self::Uri(uri.to_string());
        }

        let kind = value.get("type").and_then(Value::as_str).map(ActivityKind::parse);
        match kind {
            Some(kind) if kind.is_activity() => Self::Activity(Box::new(EmbeddedActivity {
                id: value.get("id").and_then(Value::as_str).map(str::to_string),
                kind,
                actor: value.get("actor").and_then(id_of),
                object: value.get("object").and_then(id_of),
            })),
            _ => Self::Object(Box::new(value.clone())),
        }
    }

    /// URI of the object, when it has one
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) => Some(uri),
            Self::Activity(embedded) => embedded.id.as_deref(),
            Self::Object(value) => value.get("id").and_then(Value::as_str),
        }
    }
}

/// A parsed inbound activity
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    /// Globally unique URI; the idempotency key
    pub id: String,
    pub kind: ActivityKind,
    /// Sending actor URI
    pub actor: String,
    pub object: ActivityObject,
    pub published: Option<DateTime<Utc>>,
}

/// `"uri"` or `{"id": "uri", ...}`
fn id_of(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

impl Activity {
    /// Parse an activity from JSON
    ///
    /// # Errors
    /// `MalformedActivity` if `id`, `type` or `actor` are missing, or a
    /// handled type has no `object`
    pub fn from_json(value: &Value) -> Result<Self, FederationError> {
        if !value.is_object() {
            return Err(FederationError::MalformedActivity(
                "activity is not a JSON object".to_string(),
            ));
        }

        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FederationError::MalformedActivity("missing id".to_string()))?
            .to_string();
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(ActivityKind::parse)
            .ok_or_else(|| FederationError::MalformedActivity("missing type".to_string()))?;
        let actor = value
            .get("actor")
            .and_then(id_of)
            .ok_or_else(|| FederationError::MalformedActivity("missing actor".to_string()))?;

        let object = match value.get("object") {
            Some(object) => ActivityObject::from_value(object),
            None if kind.is_activity() => {
                return Err(FederationError::MalformedActivity(format!(
                    "{} without object",
                    kind.as_str()
                )));
            }
            None => ActivityObject::Object(Box::new(Value::Null)),
        };

        let published = value
            .get("published")
            .and_then(Value::as_str)
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|p| p.with_timezone(&Utc));

        Ok(Self {
            id,
            kind,
            actor,
            object,
            published,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_follow_with_uri_object() {
        let activity = Activity::from_json(&json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": "https://a.example/act/1",
            "type": "Follow",
            "actor": "https://a.example/users/alice",
            "object": "https://b.example/users/bob",
            "published": "2026-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(activity.kind, ActivityKind::Follow);
        assert_eq!(activity.object, ActivityObject::Uri("https://b.example/users/bob".to_string()));
        assert!(activity.published.is_some());
    }

    #[test]
    fn parses_undo_wrapping_follow() {
        let activity = Activity::from_json(&json!({
            "id": "https://a.example/act/2",
            "type": "Undo",
            "actor": { "id": "https://a.example/users/alice", "type": "Person" },
            "object": {
                "id": "https://a.example/act/1",
                "type": "Follow",
                "actor": "https://a.example/users/alice",
                "object": { "id": "https://b.example/users/bob" },
            },
        }))
        .unwrap();

        assert_eq!(activity.actor, "https://a.example/users/alice");
        match activity.object {
            ActivityObject::Activity(embedded) => {
                assert_eq!(embedded.kind, ActivityKind::Follow);
                assert_eq!(embedded.id.as_deref(), Some("https://a.example/act/1"));
                assert_eq!(embedded.object.as_deref(), Some("https://b.example/users/bob"));
            }
            other => panic!("expected embedded activity, got {other:?}"),
        }
    }

    #[test]
    fn note_object_stays_raw() {
        let activity = Activity::from_json(&json!({
            "id": "https://a.example/act/3",
            "type": "Create",
            "actor": "https://a.example/users/alice",
            "object": { "id": "https://a.example/notes/1", "type": "Note", "content": "hi" },
        }))
        .unwrap();

        assert!(matches!(activity.object, ActivityObject::Object(_)));
        assert_eq!(activity.object.id(), Some("https://a.example/notes/1"));
    }

    #[test]
    fn unknown_type_parses_without_object() {
        let activity = Activity::from_json(&json!({
            "id": "https://a.example/act/4",
            "type": "Move",
            "actor": "https://a.example/users/alice",
        }))
        .unwrap();
        assert_eq!(activity.kind, ActivityKind::Other("Move".to_string()));
    }

    #[test]
    fn rejects_missing_required_fields() {
        for value in [
            json!("not an object"),
            json!({ "type": "Follow", "actor": "a", "object": "b" }),
            json!({ "id": "x", "actor": "a", "object": "b" }),
            json!({ "id": "x", "type": "Follow", "object": "b" }),
            json!({ "id": "x", "type": "Follow", "actor": "a" }),
        ] {
            assert!(matches!(
                Activity::from_json(&value),
                Err(FederationError::MalformedActivity(_))
            ));
        }
    }
}
