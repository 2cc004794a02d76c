//! ActivityPub endpoints
//!
//! - Actor document
//! - Inbox (activity receiving)
//! - Outbox
//! - Followers/Following collections

use axum::body::Bytes;
use axum::{
    Router,
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::SecondsFormat;
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;

use crate::AppState;
use crate::data::LocalAccount;
use crate::error::{AppError, FederationError};
use crate::federation::{
    ACTIVITY_JSON, ACTIVITYSTREAMS_CONTEXT, Activity, Actor, InboundRequest, builder,
    is_activity_json, local_actor_uri,
};
use crate::metrics::{FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL};

/// Number of posts listed in the outbox
const OUTBOX_PAGE_SIZE: usize = 20;

/// Largest activity body the inbox reads
const MAX_INBOX_BODY_BYTES: usize = 1024 * 1024;

/// Create ActivityPub router
///
/// Routes:
/// - GET /users/:username - Actor document
/// - POST /users/:username/inbox - Personal inbox, bodies up to 1 MiB
/// - GET /users/:username/outbox - Outbox
/// - GET /users/:username/followers - Followers collection
/// - GET /users/:username/following - Following collection
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/users/:username", get(actor))
        .route(
            "/users/:username/inbox",
            post(inbox).layer(RequestBodyLimitLayer::new(MAX_INBOX_BODY_BYTES)),
        )
        .route("/users/:username/outbox", get(outbox))
        .route("/users/:username/followers", get(followers))
        .route("/users/:username/following", get(following))
}

/// JSON body served as `application/activity+json`
fn activity_json(document: Value) -> Response {
    (
        [(header::CONTENT_TYPE, ACTIVITY_JSON)],
        axum::Json(document),
    )
        .into_response()
}

async fn local_account(state: &AppState, username: &str) -> Result<LocalAccount, AppError> {
    state
        .db
        .get_account_by_username(username)
        .await?
        .ok_or(AppError::NotFound)
}

fn ordered_collection(id: String, items: Vec<Value>) -> Value {
    json!({
        "@context": ACTIVITYSTREAMS_CONTEXT,
        "type": "OrderedCollection",
        "id": id,
        "totalItems": items.len(),
        "orderedItems": items
    })
}

/// GET /users/:username
///
/// Returns the actor document for ActivityPub clients. Any other `Accept`
/// is redirected to the profile page.
async fn actor(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let account = local_account(&state, &username).await?;

    let wants_activity_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_activity_json);
    if !wants_activity_json {
        return Ok(Redirect::to(&format!("/@{}", account.username)).into_response());
    }

    let actor = Actor::local(&state.config.server.base_url(), &account);
    Ok(activity_json(actor.to_document()))
}

/// POST /users/:username/inbox
///
/// Receives incoming ActivityPub activities.
///
/// # Steps
/// 1. Verify HTTP Signature against the sender's published key
/// 2. Parse activity
/// 3. Hand off to the inbox processor
async fn inbox(
    State(state): State<AppState>,
    Path(username): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let _timer = FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&["inbound"])
        .start_timer();

    let account = local_account(&state, &username).await?;

    // 1. Verify signature
    let request = InboundRequest {
        method: "POST".to_string(),
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers,
        body: body.to_vec(),
    };
    let signer = match state.verifier.verify(&request, state.resolver.as_ref()).await {
        Ok(signer) => signer,
        Err(e) => {
            FEDERATION_REQUESTS_TOTAL
                .with_label_values(&["inbound", "unauthorized"])
                .inc();
            tracing::warn!(recipient = %username, error = %e, "Signature verification failed");
            return Err(e.into());
        }
    };

    // 2. Parse activity
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| FederationError::MalformedActivity(format!("invalid JSON: {}", e)))?;
    let activity = Activity::from_json(&value)?;

    // 3. Process
    let outcome = state.inbox.process(&account, &activity, &signer).await?;

    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["inbound", outcome.as_str()])
        .inc();
    Ok(StatusCode::ACCEPTED)
}

/// GET /users/:username/outbox
///
/// Latest public posts wrapped in `Create` activities.
async fn outbox(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let account = local_account(&state, &username).await?;
    let base_url = state.config.server.base_url();
    let actor_uri = local_actor_uri(&base_url, &account.username);

    let statuses = state
        .db
        .get_statuses_by_username(&account.username, OUTBOX_PAGE_SIZE)
        .await?;
    let items = statuses
        .iter()
        .map(|status| {
            let published = status.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
            let note = builder::note(&status.uri, &actor_uri, &status.content, &published);
            builder::create(&format!("{}/activity", status.uri), &actor_uri, note)
        })
        .collect();

    Ok(activity_json(ordered_collection(
        format!("{}/outbox", actor_uri),
        items,
    )))
}

/// GET /users/:username/followers
async fn followers(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let account = local_account(&state, &username).await?;
    let actor_uri = local_actor_uri(&state.config.server.base_url(), &account.username);

    let items = state
        .db
        .get_followers(&account.username)
        .await?
        .into_iter()
        .map(|follower| Value::String(follower.follower_uri))
        .collect();

    Ok(activity_json(ordered_collection(
        format!("{}/followers", actor_uri),
        items,
    )))
}

/// GET /users/:username/following
///
/// Only accepted follows are listed.
async fn following(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let account = local_account(&state, &username).await?;
    let actor_uri = local_actor_uri(&state.config.server.base_url(), &account.username);

    let items = state
        .db
        .get_following_uris(&account.username)
        .await?
        .into_iter()
        .map(Value::String)
        .collect();

    Ok(activity_json(ordered_collection(
        format!("{}/following", actor_uri),
        items,
    )))
}
