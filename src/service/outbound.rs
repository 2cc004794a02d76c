//! Outbound federation service
//!
//! Actions a local actor takes towards remote actors: following, liking and
//! publishing. Each action is recorded locally and delivered as a signed
//! activity.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::data::{Database, EntityId, Follow, LocalAccount, Status};
use crate::error::AppError;
use crate::federation::{
    ActorResolver, DeliveryResult, OutboxDispatcher, builder, local_actor_uri,
};

const MAX_CONTENT_LEN: usize = 5000;

/// Escape plain text and wrap it in a paragraph
fn render_plain_text(content: &str) -> String {
    let escaped = html_escape::encode_text(content).replace('\n', "<br>");
    format!("<p>{}</p>", escaped)
}

/// Outbound service
pub struct OutboundService {
    db: Arc<Database>,
    resolver: Arc<ActorResolver>,
    dispatcher: Arc<OutboxDispatcher>,
    base_url: String,
}

impl OutboundService {
    pub fn new(
        db: Arc<Database>,
        resolver: Arc<ActorResolver>,
        dispatcher: Arc<OutboxDispatcher>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            resolver,
            dispatcher,
            base_url: base_url.into(),
        }
    }

    fn activity_id(&self, local: &LocalAccount, kind: &str) -> String {
        format!(
            "{}#{}/{}",
            local_actor_uri(&self.base_url, &local.username),
            kind,
            EntityId::new().0
        )
    }

    /// Follow a remote actor
    ///
    /// The follow is recorded as pending before the `Follow` is delivered
    /// and becomes accepted when the remote `Accept` arrives. A failed
    /// delivery removes the pending record.
    ///
    /// # Arguments
    /// * `local` - Following local actor
    /// * `target` - `user@domain` handle or actor URI
    pub async fn follow(&self, local: &LocalAccount, target: &str) -> Result<Follow, AppError> {
        let actor = if target.starts_with("https://") || target.starts_with("http://") {
            self.resolver.resolve_by_uri(target).await?
        } else {
            self.resolver.resolve_by_handle(target).await?
        };

        if let Some(existing) = self.db.get_follow(&local.username, &actor.id).await? {
            tracing::debug!(target_actor = %actor.id, "Already following");
            return Ok(existing);
        }

        let follow = Follow {
            id: EntityId::new().0,
            username: local.username.clone(),
            target_uri: actor.id.clone(),
            target_inbox_uri: actor.inbox.clone(),
            follow_activity_uri: self.activity_id(local, "follows"),
            accepted: false,
            created_at: Utc::now(),
        };
        self.db.insert_follow(&follow).await?;

        let activity = builder::follow(
            &follow.follow_activity_uri,
            &local_actor_uri(&self.base_url, &local.username),
            &actor.id,
        );
        if let Err(e) = self.dispatcher.deliver(&activity, &actor.inbox, local).await {
            self.db.delete_follow(&local.username, &actor.id).await?;
            return Err(e.into());
        }

        tracing::info!(follower = %local.username, target_actor = %actor.id, "Follow sent");
        Ok(follow)
    }

    /// Stop following a remote actor
    ///
    /// The local record is removed even when the `Undo` cannot be delivered;
    /// the delivery error is still returned.
    pub async fn unfollow(&self, local: &LocalAccount, actor_uri: &str) -> Result<(), AppError> {
        let follow = self
            .db
            .get_follow(&local.username, actor_uri)
            .await?
            .ok_or(AppError::NotFound)?;

        let actor = local_actor_uri(&self.base_url, &local.username);
        let activity = builder::undo(
            &self.activity_id(local, "undo"),
            &actor,
            builder::follow(&follow.follow_activity_uri, &actor, &follow.target_uri),
        );

        self.db.delete_follow(&local.username, actor_uri).await?;
        self.dispatcher
            .deliver(&activity, &follow.target_inbox_uri, local)
            .await?;

        tracing::info!(follower = %local.username, target_actor = %actor_uri, "Unfollowed");
        Ok(())
    }

    /// Like a remote post
    ///
    /// # Returns
    /// The id of the delivered `Like`
    pub async fn like(
        &self,
        local: &LocalAccount,
        object_uri: &str,
        author_actor_uri: &str,
    ) -> Result<String, AppError> {
        let author = self.resolver.resolve_by_uri(author_actor_uri).await?;
        let id = self.activity_id(local, "likes");
        let activity = builder::like(
            &id,
            &local_actor_uri(&self.base_url, &local.username),
            object_uri,
        );

        self.dispatcher
            .deliver(&activity, author.delivery_inbox(), local)
            .await?;
        Ok(id)
    }

    /// Withdraw a like
    ///
    /// The receiver matches the embedded `Like` by actor and object.
    pub async fn unlike(
        &self,
        local: &LocalAccount,
        like_activity_uri: &str,
        object_uri: &str,
        author_actor_uri: &str,
    ) -> Result<(), AppError> {
        let author = self.resolver.resolve_by_uri(author_actor_uri).await?;
        let actor = local_actor_uri(&self.base_url, &local.username);
        let activity = builder::undo(
            &self.activity_id(local, "undo"),
            &actor,
            builder::like(like_activity_uri, &actor, object_uri),
        );

        self.dispatcher
            .deliver(&activity, author.delivery_inbox(), local)
            .await?;
        Ok(())
    }

    /// Publish a public post and deliver it to every follower
    ///
    /// # Returns
    /// The stored post and one result per distinct follower inbox
    pub async fn publish(
        &self,
        local: &LocalAccount,
        content: &str,
    ) -> Result<(Status, Vec<DeliveryResult>), AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("content cannot be empty".to_string()));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::Validation(format!(
                "content must be at most {} characters",
                MAX_CONTENT_LEN
            )));
        }

        let actor = local_actor_uri(&self.base_url, &local.username);
        let id = EntityId::new().0;
        let status = Status {
            uri: format!("{}/statuses/{}", actor, id),
            id,
            username: local.username.clone(),
            content: render_plain_text(content),
            like_count: 0,
            created_at: Utc::now(),
        };
        self.db.insert_status(&status).await?;

        let note = builder::note(
            &status.uri,
            &actor,
            &status.content,
            &status.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let activity = builder::create(&format!("{}/activity", status.uri), &actor, note);

        let inboxes = self.db.get_follower_inboxes(&local.username).await?;
        let results = self.dispatcher.deliver_many(activity, inboxes, local).await;

        tracing::info!(
            username = %local.username,
            status = %status.uri,
            deliveries = results.len(),
            "Post published"
        );
        Ok((status, results))
    }
}
