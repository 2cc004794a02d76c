//! Inbox processing
//!
//! Applies verified inbound activities. Each activity moves through
//! `Received -> Verified -> Routed -> Applied | Rejected` within a single
//! request:
//!
//! 1. the sending actor must be the verified signer
//! 2. the activity is validated for its type
//! 3. its id is claimed in the processed-activity ledger; an id seen before
//!    short-circuits to success without side effects
//! 4. side effects are applied and observers are told the outcome
//!
//! The ledger claim and the side effects are not one transaction. A failure
//! after the claim is logged and reported, and a redelivery is treated as a
//! duplicate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::activity::{Activity, ActivityKind, ActivityObject, EmbeddedActivity};
use super::actor::{Actor, local_actor_uri};
use super::delivery::{OutboxDispatcher, builder};
use crate::data::{
    Announce, Database, EntityId, Follower, Like, LocalAccount, NotificationType, RemotePost,
};
use crate::error::{AppError, FederationError};
use crate::metrics::ACTIVITIES_RECEIVED;
use crate::service::{NotificationEvent, NotificationSink};

/// Terminal state of an inbound activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    /// Side effects applied
    Applied,
    /// Activity id already processed; nothing done
    Duplicate,
    /// Activity refused
    Rejected,
}

impl InboxOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
        }
    }
}

/// Hook called after every inbound activity reaches a terminal state
pub trait ActivityObserver: Send + Sync {
    fn activity_processed(&self, recipient: &str, activity: &Activity, outcome: InboxOutcome);
}

/// Counts inbound activities by type and outcome
pub struct MetricsObserver;

impl ActivityObserver for MetricsObserver {
    fn activity_processed(&self, _recipient: &str, activity: &Activity, outcome: InboxOutcome) {
        let activity_type = match &activity.kind {
            ActivityKind::Other(_) => "Other",
            kind => kind.as_str(),
        };
        ACTIVITIES_RECEIVED
            .with_label_values(&[activity_type, outcome.as_str()])
            .inc();
    }
}

/// `"uri"` or `{"id": "uri"}`
fn id_of(value: &Value) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.get("id").and_then(Value::as_str))
}

fn sanitize_remote_html(content: &str) -> String {
    ammonia::clean(content)
}

fn malformed(reason: impl Into<String>) -> AppError {
    FederationError::MalformedActivity(reason.into()).into()
}

/// Inbox state machine
pub struct InboxProcessor {
    db: Arc<Database>,
    notifications: Arc<dyn NotificationSink>,
    /// Used to answer Follow with Accept
    dispatcher: Arc<OutboxDispatcher>,
    observers: Vec<Arc<dyn ActivityObserver>>,
    /// Instance base URL
    base_url: String,
    auto_accept_follows: bool,
}

impl InboxProcessor {
    pub fn new(
        db: Arc<Database>,
        notifications: Arc<dyn NotificationSink>,
        dispatcher: Arc<OutboxDispatcher>,
        observers: Vec<Arc<dyn ActivityObserver>>,
        base_url: impl Into<String>,
        auto_accept_follows: bool,
    ) -> Self {
        Self {
            db,
            notifications,
            dispatcher,
            observers,
            base_url: base_url.into(),
            auto_accept_follows,
        }
    }

    /// Process a verified activity delivered to `recipient`'s inbox
    ///
    /// # Arguments
    /// * `recipient` - Local actor owning the inbox
    /// * `activity` - Parsed activity
    /// * `signer` - Actor whose signature was verified
    ///
    /// # Errors
    /// - `SenderMismatch` if the activity's actor is not the signer
    /// - `MalformedActivity` / `UnknownActivityType` for unusable activities
    /// - storage errors from side effects
    pub async fn process(
        &self,
        recipient: &LocalAccount,
        activity: &Activity,
        signer: &Actor,
    ) -> Result<InboxOutcome, AppError> {
        let result = self.process_inner(recipient, activity, signer).await;

        let outcome = match &result {
            Ok(outcome) => *outcome,
            Err(e) => {
                tracing::info!(
                    activity_id = %activity.id,
                    activity_type = %activity.kind.as_str(),
                    actor = %activity.actor,
                    error = %e,
                    "Inbound activity rejected"
                );
                InboxOutcome::Rejected
            }
        };
        for observer in &self.observers {
            observer.activity_processed(&recipient.username, activity, outcome);
        }

        result
    }

    async fn process_inner(
        &self,
        recipient: &LocalAccount,
        activity: &Activity,
        signer: &Actor,
    ) -> Result<InboxOutcome, AppError> {
        // 1. Sender must be the verified signer
        if activity.actor != signer.id {
            return Err(FederationError::SenderMismatch {
                activity_actor: activity.actor.clone(),
                signer: signer.id.clone(),
            }
            .into());
        }

        // 2. Type-specific validation
        self.validate(recipient, activity)?;

        // 3. Idempotency
        let claimed = self
            .db
            .record_processed_activity(&activity.id, &recipient.username)
            .await?;
        if !claimed {
            tracing::debug!(activity_id = %activity.id, "Activity already processed");
            return Ok(InboxOutcome::Duplicate);
        }

        // 4. Dispatch to type-specific handler
        match &activity.kind {
            ActivityKind::Follow => self.handle_follow(recipient, activity, signer).await?,
            ActivityKind::Undo => self.handle_undo(recipient, activity).await?,
            ActivityKind::Like => self.handle_like(activity).await?,
            ActivityKind::Create => self.handle_create(recipient, activity).await?,
            ActivityKind::Announce => self.handle_announce(recipient, activity).await?,
            ActivityKind::Accept => self.handle_accept(activity).await?,
            ActivityKind::Reject => self.handle_reject(activity).await?,
            ActivityKind::Other(kind) => {
                return Err(FederationError::UnknownActivityType(kind.clone()).into());
            }
        }

        tracing::info!(
            activity_id = %activity.id,
            activity_type = %activity.kind.as_str(),
            actor = %activity.actor,
            recipient = %recipient.username,
            "Activity applied"
        );
        Ok(InboxOutcome::Applied)
    }

    fn validate(&self, recipient: &LocalAccount, activity: &Activity) -> Result<(), AppError> {
        match &activity.kind {
            ActivityKind::Follow => {
                let target = activity
                    .object
                    .id()
                    .ok_or_else(|| malformed("Follow object has no id"))?;
                let local = local_actor_uri(&self.base_url, &recipient.username);
                if target != local {
                    return Err(malformed(format!("Follow target {} is not {}", target, local)));
                }
            }
            ActivityKind::Undo => {
                if let ActivityObject::Activity(embedded) = &activity.object {
                    if let Some(inner_actor) = embedded.actor.as_ref().filter(|a| **a != activity.actor) {
                        return Err(FederationError::SenderMismatch {
                            activity_actor: inner_actor.clone(),
                            signer: activity.actor.clone(),
                        }
                        .into());
                    }
                }
            }
            ActivityKind::Create => {
                let ActivityObject::Object(object) = &activity.object else {
                    return Err(malformed("Create must embed its object"));
                };
                if object.get("id").and_then(Value::as_str).is_none() {
                    return Err(malformed("Create object has no id"));
                }
                if let Some(author) = object
                    .get("attributedTo")
                    .and_then(id_of)
                    .filter(|author| *author != activity.actor)
                {
                    return Err(FederationError::SenderMismatch {
                        activity_actor: author.to_string(),
                        signer: activity.actor.clone(),
                    }
                    .into());
                }
            }
            ActivityKind::Like
            | ActivityKind::Announce
            | ActivityKind::Accept
            | ActivityKind::Reject => {
                if activity.object.id().is_none() {
                    return Err(malformed(format!(
                        "{} object has no id",
                        activity.kind.as_str()
                    )));
                }
            }
            ActivityKind::Other(_) => {}
        }
        Ok(())
    }

    /// Handle Follow activity
    async fn handle_follow(
        &self,
        recipient: &LocalAccount,
        activity: &Activity,
        signer: &Actor,
    ) -> Result<(), AppError> {
        let follower = Follower {
            id: EntityId::new().0,
            username: recipient.username.clone(),
            follower_uri: signer.id.clone(),
            inbox_uri: signer.delivery_inbox().to_string(),
            follow_activity_uri: activity.id.clone(),
            created_at: Utc::now(),
        };

        if self.db.insert_follower(&follower).await? {
            tracing::info!(follower = %signer.id, followee = %recipient.username, "New follower");
            self.notifications
                .notify(NotificationEvent {
                    recipient: recipient.username.clone(),
                    kind: NotificationType::Follow,
                    origin_actor: signer.id.clone(),
                    status_uri: None,
                })
                .await?;
        } else {
            tracing::debug!(follower = %signer.id, "Follow for existing relationship");
        }

        if self.auto_accept_follows {
            self.send_accept(recipient, activity, signer).await;
        }
        Ok(())
    }

    /// Answer a Follow with Accept; failures are logged only
    async fn send_accept(&self, recipient: &LocalAccount, follow: &Activity, follower: &Actor) {
        let local = local_actor_uri(&self.base_url, &recipient.username);
        let accept = builder::accept(
            &format!("{}#accepts/follows/{}", local, EntityId::new().0),
            &local,
            builder::follow(&follow.id, &follow.actor, &local),
        );

        if let Err(e) = self
            .dispatcher
            .deliver(&accept, &follower.inbox, recipient)
            .await
        {
            tracing::warn!(follower = %follower.id, error = %e, "Failed to send Accept");
        }
    }

    /// Handle Undo activity
    async fn handle_undo(&self, recipient: &LocalAccount, activity: &Activity) -> Result<(), AppError> {
        match &activity.object {
            ActivityObject::Activity(embedded) => {
                self.undo_embedded(recipient, &activity.actor, embedded).await
            }
            ActivityObject::Uri(uri) => self.undo_by_reference(&activity.actor, uri).await,
            ActivityObject::Object(object) => match object.get("id").and_then(Value::as_str) {
                Some(uri) => self.undo_by_reference(&activity.actor, uri).await,
                None => {
                    tracing::debug!(activity_id = %activity.id, "Undo of unidentified object ignored");
                    Ok(())
                }
            },
        }
    }

    async fn undo_embedded(
        &self,
        recipient: &LocalAccount,
        actor: &str,
        embedded: &EmbeddedActivity,
    ) -> Result<(), AppError> {
        match embedded.kind {
            ActivityKind::Follow => {
                if self.db.delete_follower(&recipient.username, actor).await? {
                    tracing::info!(follower = %actor, followee = %recipient.username, "Unfollowed");
                }
            }
            ActivityKind::Like => match (&embedded.object, &embedded.id) {
                (Some(object), _) => {
                    self.db.remove_like(actor, object).await?;
                }
                (None, Some(id)) => self.undo_by_reference(actor, id).await?,
                (None, None) => tracing::debug!("Undo Like without object ignored"),
            },
            ActivityKind::Announce => {
                if let Some(id) = &embedded.id {
                    self.db.delete_announce(actor, id).await?;
                }
            }
            _ => {
                tracing::debug!(kind = %embedded.kind.as_str(), "Undo of unsupported activity ignored");
            }
        }
        Ok(())
    }

    /// Undo whose object is a bare activity URI
    ///
    /// Only records created by the same actor are removed.
    async fn undo_by_reference(&self, actor: &str, uri: &str) -> Result<(), AppError> {
        if self.db.delete_follower_by_activity(actor, uri).await? {
            tracing::info!(follower = %actor, "Unfollowed by activity reference");
            return Ok(());
        }

        if let Some(like) = self.db.get_like_by_activity(uri).await? {
            if like.actor_uri == actor {
                self.db.remove_like(actor, &like.object_uri).await?;
            }
            return Ok(());
        }

        if !self.db.delete_announce(actor, uri).await? {
            tracing::debug!(reference = %uri, "Undo for unknown activity ignored");
        }
        Ok(())
    }

    /// Handle Like activity
    async fn handle_like(&self, activity: &Activity) -> Result<(), AppError> {
        let Some(object_uri) = activity.object.id() else {
            return Ok(());
        };
        let Some(status) = self.db.get_status_by_uri(object_uri).await? else {
            tracing::debug!(object = %object_uri, "Like for unknown post ignored");
            return Ok(());
        };

        let like = Like {
            id: EntityId::new().0,
            activity_uri: activity.id.clone(),
            actor_uri: activity.actor.clone(),
            object_uri: status.uri.clone(),
            created_at: Utc::now(),
        };
        if !self.db.record_like(&like).await? {
            tracing::debug!(actor = %activity.actor, object = %object_uri, "Post already liked");
            return Ok(());
        }

        let author = local_actor_uri(&self.base_url, &status.username);
        if author != activity.actor {
            self.notifications
                .notify(NotificationEvent {
                    recipient: status.username.clone(),
                    kind: NotificationType::Favourite,
                    origin_actor: activity.actor.clone(),
                    status_uri: Some(status.uri.clone()),
                })
                .await?;
        }
        Ok(())
    }

    /// Handle Create activity
    async fn handle_create(&self, recipient: &LocalAccount, activity: &Activity) -> Result<(), AppError> {
        let ActivityObject::Object(object) = &activity.object else {
            return Ok(());
        };
        let Some(uri) = object.get("id").and_then(Value::as_str) else {
            return Ok(());
        };

        let content = object
            .get("content")
            .and_then(Value::as_str)
            .map(sanitize_remote_html)
            .unwrap_or_default();
        let in_reply_to = object.get("inReplyTo").and_then(id_of).map(str::to_string);
        let published = object
            .get("published")
            .and_then(Value::as_str)
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|p| p.with_timezone(&Utc))
            .or(activity.published)
            .unwrap_or_else(Utc::now);

        let post = RemotePost {
            id: EntityId::new().0,
            uri: uri.to_string(),
            activity_uri: activity.id.clone(),
            attributed_to: activity.actor.clone(),
            recipient_username: recipient.username.clone(),
            content,
            in_reply_to_uri: in_reply_to.clone(),
            published_at: published,
            received_at: Utc::now(),
        };
        if !self.db.insert_remote_post(&post).await? {
            return Ok(());
        }

        if self.mentions_recipient(recipient, object, in_reply_to.as_deref()).await? {
            self.notifications
                .notify(NotificationEvent {
                    recipient: recipient.username.clone(),
                    kind: NotificationType::Mention,
                    origin_actor: activity.actor.clone(),
                    status_uri: Some(uri.to_string()),
                })
                .await?;
        }
        Ok(())
    }

    /// Whether a remote post tags the recipient or replies to one of their posts
    async fn mentions_recipient(
        &self,
        recipient: &LocalAccount,
        object: &Value,
        in_reply_to: Option<&str>,
    ) -> Result<bool, AppError> {
        let local = local_actor_uri(&self.base_url, &recipient.username);
        let tagged = object
            .get("tag")
            .and_then(Value::as_array)
            .is_some_and(|tags| {
                tags.iter().any(|tag| {
                    tag.get("type").and_then(Value::as_str) == Some("Mention")
                        && tag.get("href").and_then(Value::as_str) == Some(local.as_str())
                })
            });
        if tagged {
            return Ok(true);
        }

        match in_reply_to {
            Some(parent) => Ok(self
                .db
                .get_status_by_uri(parent)
                .await?
                .is_some_and(|status| status.username == recipient.username)),
            None => Ok(false),
        }
    }

    /// Handle Announce activity
    async fn handle_announce(&self, recipient: &LocalAccount, activity: &Activity) -> Result<(), AppError> {
        let Some(object_uri) = activity.object.id() else {
            return Ok(());
        };

        let announce = Announce {
            id: EntityId::new().0,
            activity_uri: activity.id.clone(),
            actor_uri: activity.actor.clone(),
            object_uri: object_uri.to_string(),
            recipient_username: recipient.username.clone(),
            created_at: Utc::now(),
        };
        if !self.db.insert_announce(&announce).await? {
            return Ok(());
        }

        if let Some(status) = self.db.get_status_by_uri(object_uri).await? {
            let author = local_actor_uri(&self.base_url, &status.username);
            if author != activity.actor {
                self.notifications
                    .notify(NotificationEvent {
                        recipient: status.username.clone(),
                        kind: NotificationType::Reblog,
                        origin_actor: activity.actor.clone(),
                        status_uri: Some(status.uri.clone()),
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Handle Accept of a Follow we sent
    async fn handle_accept(&self, activity: &Activity) -> Result<(), AppError> {
        let Some(follow_id) = activity.object.id() else {
            return Ok(());
        };
        if self.db.accept_follow(follow_id, &activity.actor).await? {
            tracing::info!(target_actor = %activity.actor, "Follow accepted");
        } else {
            tracing::debug!(follow = %follow_id, "Accept for unknown follow ignored");
        }
        Ok(())
    }

    /// Handle Reject of a Follow we sent
    async fn handle_reject(&self, activity: &Activity) -> Result<(), AppError> {
        let Some(follow_id) = activity.object.id() else {
            return Ok(());
        };
        if self.db.delete_follow_by_activity(follow_id, &activity.actor).await? {
            tracing::info!(target_actor = %activity.actor, "Follow rejected");
        }
        Ok(())
    }
}
