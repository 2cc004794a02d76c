//! Remote actor resolution
//!
//! Resolves actors by URI or by `user@domain` handle and keeps fetched
//! documents in a shared in-memory cache.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::actor::{ACTIVITY_JSON, Actor, is_activity_json};
use super::signature::strip_fragment;
use super::webfinger::{Handle, WebFingerResponse};
use crate::error::FederationError;
use crate::metrics::{
    ACTOR_CACHE_LOOKUPS, ACTOR_CACHE_SIZE, FEDERATION_REQUEST_DURATION_SECONDS,
    FEDERATION_REQUESTS_TOTAL,
};

/// Actor lookup capability used by signature verification and the inbox
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResolveActor: Send + Sync {
    /// Resolve an actor by URI, from cache when possible
    async fn resolve_actor(&self, uri: &str) -> Result<Actor, FederationError>;

    /// Re-fetch an actor, replacing any cached entry
    ///
    /// Implementations may return the cached actor instead when it was
    /// fetched too recently to be worth another request.
    async fn refresh_actor(&self, uri: &str) -> Result<Actor, FederationError>;
}

// =============================================================================
// Remote host policy
// =============================================================================

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

/// Which remote URLs the server may contact
#[derive(Debug, Clone, Copy)]
pub struct RemoteHostPolicy {
    allow_private_hosts: bool,
}

impl RemoteHostPolicy {
    pub fn new(allow_private_hosts: bool) -> Self {
        Self {
            allow_private_hosts,
        }
    }

    /// Validate a remote URL before fetching or posting to it
    ///
    /// Rejects non-HTTP(S) URLs and, unless private hosts are allowed,
    /// hosts that are or resolve to loopback/private/link-local addresses.
    ///
    /// # Returns
    /// The parsed URL, or a reason for rejection
    pub async fn check(&self, raw: &str) -> Result<url::Url, String> {
        let parsed = url::Url::parse(raw).map_err(|e| format!("invalid URL {}: {}", raw, e))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(format!("unsupported URL scheme: {}", scheme)),
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| format!("missing host in {}", raw))?
            .to_ascii_lowercase();

        if self.allow_private_hosts {
            return Ok(parsed);
        }

        if is_disallowed_host(&host) {
            return Err(format!("host not allowed: {}", host));
        }

        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| format!("missing port in {}", raw))?;
        let lookup_host = host.trim_start_matches('[').trim_end_matches(']');
        let lookup = tokio::net::lookup_host((lookup_host, port))
            .await
            .map_err(|e| format!("failed to resolve {}: {}", host, e))?;

        let mut resolved_any = false;
        for addr in lookup {
            resolved_any = true;
            if is_disallowed_ip(addr.ip()) {
                return Err(format!("host resolves to a private address: {}", host));
            }
        }

        if !resolved_any {
            return Err(format!("no DNS records for {}", host));
        }

        Ok(parsed)
    }
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CachedActor {
    actor: Actor,
    fetched_at: Instant,
}

/// Remote actor cache
///
/// Concurrent readers share the lock; concurrent fills of the same URI are
/// last-writer-wins.
#[derive(Clone)]
pub struct RemoteActorCache {
    entries: Arc<RwLock<HashMap<String, CachedActor>>>,
    /// `None` keeps entries until invalidated
    ttl: Option<Duration>,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

impl RemoteActorCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    fn is_valid(&self, entry: &CachedActor) -> bool {
        self.ttl
            .is_none_or(|ttl| entry.fetched_at.elapsed() < ttl)
    }

    /// Get a cached actor if present and not expired
    pub async fn get(&self, uri: &str) -> Option<Actor> {
        let entries = self.entries.read().await;
        match entries.get(uri) {
            Some(entry) if self.is_valid(entry) => {
                ACTOR_CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                tracing::debug!(actor = %uri, "Actor cache hit");
                Some(entry.actor.clone())
            }
            Some(_) => {
                ACTOR_CACHE_LOOKUPS.with_label_values(&["expired"]).inc();
                tracing::debug!(actor = %uri, "Actor cache entry expired");
                None
            }
            None => {
                ACTOR_CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                None
            }
        }
    }

    /// Insert or replace the entry for the actor's id
    pub async fn insert(&self, actor: Actor) {
        let mut entries = self.entries.write().await;
        entries.insert(
            actor.id.clone(),
            CachedActor {
                actor,
                fetched_at: Instant::now(),
            },
        );
        ACTOR_CACHE_SIZE.set(entries.len() as i64);
    }

    /// A cached actor fetched less than `max_age` ago, expired or not
    pub async fn get_fetched_within(&self, uri: &str, max_age: Duration) -> Option<Actor> {
        let entries = self.entries.read().await;
        entries
            .get(uri)
            .filter(|entry| entry.fetched_at.elapsed() < max_age)
            .map(|entry| entry.actor.clone())
    }

    /// Remove a cached actor
    pub async fn invalidate(&self, uri: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(uri);
        ACTOR_CACHE_SIZE.set(entries.len() as i64);
        tracing::debug!(actor = %uri, "Invalidated actor cache entry");
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let total = entries.len();
        let valid = entries.values().filter(|e| self.is_valid(e)).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }

    /// Drop expired entries
    pub async fn prune_expired(&self) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| ttl.is_none_or(|ttl| e.fetched_at.elapsed() < ttl));
        ACTOR_CACHE_SIZE.set(entries.len() as i64);

        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!("Pruned {} expired actor cache entries", removed);
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Resolves remote actors over HTTP
///
/// The HTTP client carries the fetch timeout; a timeout surfaces as
/// `ActorUnreachable`.
#[derive(Clone)]
pub struct ActorResolver {
    http_client: reqwest::Client,
    cache: RemoteActorCache,
    policy: RemoteHostPolicy,
    /// Scheme for WebFinger queries ("https" outside development)
    remote_scheme: String,
    /// Entries younger than this are not re-fetched by `refresh_actor`
    min_refresh_interval: Duration,
}

impl ActorResolver {
    pub fn new(
        http_client: reqwest::Client,
        cache: RemoteActorCache,
        policy: RemoteHostPolicy,
        remote_scheme: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            cache,
            policy,
            remote_scheme: remote_scheme.into(),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn cache(&self) -> &RemoteActorCache {
        &self.cache
    }

    /// Resolve an actor by URI
    ///
    /// Checks the cache first; on miss fetches the document and caches it.
    pub async fn resolve_by_uri(&self, uri: &str) -> Result<Actor, FederationError> {
        let uri = strip_fragment(uri);
        if let Some(actor) = self.cache.get(uri).await {
            return Ok(actor);
        }
        self.fetch_and_cache(uri).await
    }

    /// Resolve an actor from a `user@domain` handle via WebFinger
    ///
    /// The subject returned by the remote server must name the same domain
    /// that was queried.
    pub async fn resolve_by_handle(&self, handle: &str) -> Result<Actor, FederationError> {
        let parsed = Handle::parse(handle)
            .ok_or_else(|| FederationError::ActorUnreachable(format!("invalid handle: {}", handle)))?;

        let url = format!(
            "{}://{}/.well-known/webfinger?resource={}",
            self.remote_scheme,
            parsed.domain,
            urlencoding::encode(&parsed.resource())
        );
        let response: WebFingerResponse = self
            .get_json(&url, "application/jrd+json, application/json", false)
            .await?;

        if response.subject_domain().as_deref() != Some(parsed.domain.as_str()) {
            tracing::warn!(
                handle = %handle,
                subject = %response.subject,
                "WebFinger subject does not match queried domain"
            );
            return Err(FederationError::ActorUnreachable(format!(
                "WebFinger subject {} does not match {}",
                response.subject, parsed.domain
            )));
        }

        let actor_uri = response.actor_uri().ok_or_else(|| {
            FederationError::ActorUnreachable(format!("no ActivityPub link for {}", handle))
        })?;

        self.resolve_by_uri(actor_uri).await
    }

    async fn fetch_and_cache(&self, uri: &str) -> Result<Actor, FederationError> {
        let document: serde_json::Value = self.get_json(uri, ACTIVITY_JSON, true).await?;
        let actor = Actor::from_document(&document)?;

        if actor.id != uri {
            return Err(FederationError::ActorUnreachable(format!(
                "document fetched from {} claims id {}",
                uri, actor.id
            )));
        }

        tracing::debug!(actor = %uri, "Fetched remote actor");
        self.cache.insert(actor.clone()).await;
        Ok(actor)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        accept: &str,
        require_activity_json: bool,
    ) -> Result<T, FederationError> {
        let unreachable = |reason: String| FederationError::ActorUnreachable(reason);

        let parsed = self.policy.check(url).await.map_err(unreachable)?;

        let timer = FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["fetch"])
            .start_timer();
        let result = self
            .http_client
            .get(parsed)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await;
        timer.observe_duration();

        let response = result.map_err(|e| {
            FEDERATION_REQUESTS_TOTAL
                .with_label_values(&["fetch", "error"])
                .inc();
            unreachable(format!("GET {} failed: {}", url, e))
        })?;

        let status = response.status();
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["fetch", status.as_str()])
            .inc();
        if !status.is_success() {
            return Err(unreachable(format!("GET {} returned HTTP {}", url, status)));
        }

        if require_activity_json {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !is_activity_json(content_type) {
                return Err(unreachable(format!(
                    "GET {} returned content type {:?}",
                    url, content_type
                )));
            }
        }

        response
            .json::<T>()
            .await
            .map_err(|e| unreachable(format!("invalid JSON from {}: {}", url, e)))
    }
}

#[async_trait]
impl ResolveActor for ActorResolver {
    async fn resolve_actor(&self, uri: &str) -> Result<Actor, FederationError> {
        self.resolve_by_uri(uri).await
    }

    /// Re-fetch unless the cached copy is younger than the refresh interval
    ///
    /// A failed fetch leaves the existing entry in place.
    async fn refresh_actor(&self, uri: &str) -> Result<Actor, FederationError> {
        let uri = strip_fragment(uri);
        if let Some(actor) = self
            .cache
            .get_fetched_within(uri, self.min_refresh_interval)
            .await
        {
            tracing::debug!(actor = %uri, "Actor fetched recently, not refreshing");
            return Ok(actor);
        }
        self.fetch_and_cache(uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::actor::PublicKey;
    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn actor(id: &str, pem: &str) -> Actor {
        Actor {
            id: id.to_string(),
            kind: "Person".to_string(),
            preferred_username: Some("alice".to_string()),
            name: None,
            inbox: format!("{}/inbox", id),
            outbox: None,
            followers: None,
            following: None,
            shared_inbox: None,
            public_key: PublicKey {
                id: format!("{}#main-key", id),
                owner: id.to_string(),
                public_key_pem: pem.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn cache_expiry() {
        let cache = RemoteActorCache::new(Some(Duration::from_millis(100)));
        cache.insert(actor("https://a.example/users/alice", "pem")).await;

        assert!(cache.get("https://a.example/users/alice").await.is_some());
        assert_eq!(cache.stats().await.valid_entries, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get("https://a.example/users/alice").await.is_none());
        assert_eq!(cache.stats().await.expired_entries, 1);

        cache.prune_expired().await;
        assert_eq!(cache.stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn cache_without_ttl_keeps_entries_until_invalidated() {
        let cache = RemoteActorCache::new(None);
        cache.insert(actor("https://a.example/users/alice", "pem")).await;
        cache.prune_expired().await;
        assert!(cache.get("https://a.example/users/alice").await.is_some());

        cache.invalidate("https://a.example/users/alice").await;
        assert!(cache.get("https://a.example/users/alice").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_fills_are_last_writer_wins() {
        let cache = RemoteActorCache::new(None);
        let uri = "https://a.example/users/alice";

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.insert(actor(uri, &format!("pem-{i}"))).await;
                cache.get(uri).await
            }));
        }
        for handle in handles {
            let cached = handle.await.unwrap().expect("entry present");
            assert!(cached.public_key.public_key_pem.starts_with("pem-"));
        }

        assert_eq!(cache.stats().await.total_entries, 1);
    }

    #[test]
    fn disallowed_hosts() {
        assert!(is_disallowed_host("localhost"));
        assert!(is_disallowed_host("foo.localhost."));
        assert!(is_disallowed_host("127.0.0.1"));
        assert!(is_disallowed_host("192.168.1.10"));
        assert!(is_disallowed_host("[::1]"));
        assert!(!is_disallowed_host("example.com"));
        assert!(!is_disallowed_host("93.184.216.34"));
    }

    #[tokio::test]
    async fn policy_rejects_private_hosts_unless_allowed() {
        let strict = RemoteHostPolicy::new(false);
        assert!(strict.check("https://localhost/users/alice").await.is_err());
        assert!(strict.check("http://192.168.1.10/users/alice").await.is_err());
        assert!(strict.check("ftp://example.com/users/alice").await.is_err());

        let relaxed = RemoteHostPolicy::new(true);
        assert!(relaxed.check("http://127.0.0.1:8080/users/alice").await.is_ok());
        assert!(relaxed.check("ftp://example.com/users/alice").await.is_err());
    }

    #[tokio::test]
    async fn resolve_by_uri_serves_cached_actor_without_network() {
        let cache = RemoteActorCache::new(None);
        cache.insert(actor("https://a.example/users/alice", "pem")).await;

        let resolver = ActorResolver::new(
            reqwest::Client::new(),
            cache,
            RemoteHostPolicy::new(false),
            "https",
        );
        let resolved = resolver
            .resolve_by_uri("https://a.example/users/alice#main-key")
            .await
            .unwrap();
        assert_eq!(resolved.id, "https://a.example/users/alice");
    }

    #[tokio::test]
    async fn unreachable_host_is_actor_unreachable() {
        let resolver = ActorResolver::new(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap(),
            RemoteActorCache::new(None),
            RemoteHostPolicy::new(false),
            "https",
        );

        let err = resolver
            .resolve_by_uri("https://localhost/users/alice")
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::ActorUnreachable(_)));

        let err = resolver.resolve_by_handle("not-a-handle").await.unwrap_err();
        assert!(matches!(err, FederationError::ActorUnreachable(_)));
    }

    // Stub remote server

    struct Stub {
        listener: tokio::net::TcpListener,
        authority: String,
    }

    impl Stub {
        async fn bind() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let authority = listener.local_addr().unwrap().to_string();
            Self { listener, authority }
        }

        fn actor_uri(&self) -> String {
            format!("http://{}/users/alice", self.authority)
        }

        fn serve(self, app: axum::Router) {
            tokio::spawn(async move {
                axum::serve(self.listener, app).await.unwrap();
            });
        }
    }

    fn stub_response(status: StatusCode, content_type: &str, body: String) -> Response {
        (status, [(header::CONTENT_TYPE, content_type.to_string())], body).into_response()
    }

    /// Serves `document` at `/users/alice`, counting requests
    fn actor_route(document: serde_json::Value, hits: Arc<AtomicUsize>) -> axum::Router {
        axum::Router::new().route(
            "/users/alice",
            get(move || {
                let body = document.to_string();
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    stub_response(StatusCode::OK, ACTIVITY_JSON, body)
                }
            }),
        )
    }

    fn local_resolver() -> ActorResolver {
        ActorResolver::new(
            reqwest::Client::new(),
            RemoteActorCache::new(None),
            RemoteHostPolicy::new(true),
            "http",
        )
    }

    #[tokio::test]
    async fn fetched_actor_is_cached() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        let hits = Arc::new(AtomicUsize::new(0));
        stub.serve(actor_route(actor(&uri, "pem").to_document(), hits.clone()));

        let resolver = local_resolver();
        assert_eq!(resolver.resolve_by_uri(&uri).await.unwrap().id, uri);
        assert_eq!(resolver.resolve_by_uri(&uri).await.unwrap().id, uri);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn webfinger_subject_on_another_domain_is_rejected() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        let jrd = serde_json::json!({
            "subject": "acct:alice@evil.example",
            "links": [{ "rel": "self", "type": ACTIVITY_JSON, "href": uri }],
        });
        let hits = Arc::new(AtomicUsize::new(0));
        let app = actor_route(actor(&uri, "pem").to_document(), hits.clone()).route(
            "/.well-known/webfinger",
            get(move || {
                let body = jrd.to_string();
                async move { stub_response(StatusCode::OK, "application/jrd+json", body) }
            }),
        );
        let handle = format!("alice@{}", stub.authority);
        stub.serve(app);

        let err = local_resolver().resolve_by_handle(&handle).await.unwrap_err();
        assert!(
            matches!(&err, FederationError::ActorUnreachable(reason) if reason.contains("evil.example")),
            "unexpected error: {err:?}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        stub.serve(axum::Router::new().route(
            "/users/alice",
            get(|| async {
                stub_response(StatusCode::GONE, ACTIVITY_JSON, "{}".to_string())
            }),
        ));

        let err = local_resolver().resolve_by_uri(&uri).await.unwrap_err();
        assert!(
            matches!(&err, FederationError::ActorUnreachable(reason) if reason.contains("410")),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn plain_json_content_type_is_rejected() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        let body = actor(&uri, "pem").to_document().to_string();
        stub.serve(axum::Router::new().route(
            "/users/alice",
            get(move || {
                let body = body.clone();
                async move { stub_response(StatusCode::OK, "application/json", body) }
            }),
        ));

        let resolver = local_resolver();
        let err = resolver.resolve_by_uri(&uri).await.unwrap_err();
        assert!(
            matches!(&err, FederationError::ActorUnreachable(reason) if reason.contains("content type")),
            "unexpected error: {err:?}"
        );
        assert!(resolver.cache().get(&uri).await.is_none());
    }

    #[tokio::test]
    async fn document_claiming_another_id_is_rejected() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        let hits = Arc::new(AtomicUsize::new(0));
        stub.serve(actor_route(
            actor("https://elsewhere.example/users/alice", "pem").to_document(),
            hits,
        ));

        let resolver = local_resolver();
        let err = resolver.resolve_by_uri(&uri).await.unwrap_err();
        assert!(
            matches!(&err, FederationError::ActorUnreachable(reason) if reason.contains("claims id")),
            "unexpected error: {err:?}"
        );
        assert!(
            resolver
                .cache()
                .get("https://elsewhere.example/users/alice")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn refresh_of_recently_fetched_actor_uses_cache() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        let hits = Arc::new(AtomicUsize::new(0));
        stub.serve(actor_route(actor(&uri, "pem").to_document(), hits.clone()));

        let resolver = local_resolver().with_min_refresh_interval(Duration::from_secs(60));
        resolver.resolve_actor(&uri).await.unwrap();
        for _ in 0..5 {
            resolver.refresh_actor(&format!("{uri}#main-key")).await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let eager = local_resolver().with_min_refresh_interval(Duration::ZERO);
        eager.resolve_actor(&uri).await.unwrap();
        eager.refresh_actor(&uri).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_cached_actor() {
        let stub = Stub::bind().await;
        let uri = stub.actor_uri();
        let hits = Arc::new(AtomicUsize::new(0));
        let document = actor(&uri, "pem").to_document().to_string();
        let counter = hits.clone();
        stub.serve(axum::Router::new().route(
            "/users/alice",
            get(move || {
                let body = document.clone();
                let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        stub_response(StatusCode::OK, ACTIVITY_JSON, body)
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }),
        ));

        let resolver = local_resolver().with_min_refresh_interval(Duration::ZERO);
        resolver.resolve_actor(&uri).await.unwrap();
        assert!(resolver.refresh_actor(&uri).await.is_err());

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(resolver.cache().get(&uri).await.is_some());
    }
}
