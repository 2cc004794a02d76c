//! Fedipost - a federated social-posting service speaking ActivityPub
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - ActivityPub endpoints (actor, inbox, collections)        │
//! │  - WebFinger / NodeInfo discovery                           │
//! │  - Health and metrics                                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Service & Federation Layer                    │
//! │  - HTTP signatures, actor resolution                        │
//! │  - Inbox state machine, outbound delivery                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Local actor lifecycle, notifications, outbound actions
//! - `federation`: ActivityPub federation handling
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use federation::{
    ActivityObserver, ActorResolver, InboxProcessor, KeyPairProvider, MetricsObserver,
    OutboxDispatcher, RemoteActorCache, RemoteHostPolicy, RsaKeyPairProvider, SignatureVerifier,
};
use service::{AccountService, NotificationService, NotificationSink, OutboundService};

/// Application state shared across all handlers
///
/// Services are built leaf-first and handed to their dependents.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Local actor lifecycle
    pub accounts: Arc<AccountService>,

    /// Notification storage
    pub notifications: Arc<NotificationService>,

    /// Remote actor resolution with shared cache
    pub resolver: Arc<ActorResolver>,

    /// Inbound signature verification
    pub verifier: SignatureVerifier,

    /// Inbox state machine
    pub inbox: Arc<InboxProcessor>,

    /// Signed outbound delivery
    pub dispatcher: Arc<OutboxDispatcher>,

    /// Follow, like and publish on behalf of local actors
    pub outbound: Arc<OutboundService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build the HTTP client
    /// 3. Wire federation components and services
    /// 4. Create the admin actor if missing
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        Self::with_key_provider(config, Arc::new(RsaKeyPairProvider::new())).await
    }

    /// Initialize application state with a specific key pair source
    pub async fn with_key_provider(
        config: config::AppConfig,
        keys: Arc<dyn KeyPairProvider>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");
        metrics::init_metrics();

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Initialize HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.federation.fetch_timeout())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        // 3. Federation components, leaves first
        let base_url = config.server.base_url();
        let policy = RemoteHostPolicy::new(config.federation.allow_private_hosts);
        let resolver = Arc::new(ActorResolver::new(
            http_client.clone(),
            RemoteActorCache::new(config.federation.actor_cache_ttl()),
            policy,
            config.federation.remote_scheme.clone(),
        )
        .with_min_refresh_interval(config.federation.min_refresh_interval()));
        let dispatcher = Arc::new(OutboxDispatcher::new(
            http_client,
            policy,
            base_url.clone(),
            config.federation.delivery_concurrency,
        ));
        let notifications = Arc::new(NotificationService::new(db.clone()));
        let observers: Vec<Arc<dyn ActivityObserver>> = vec![Arc::new(MetricsObserver)];
        let inbox = Arc::new(InboxProcessor::new(
            db.clone(),
            notifications.clone() as Arc<dyn NotificationSink>,
            dispatcher.clone(),
            observers,
            base_url.clone(),
            config.federation.auto_accept_follows,
        ));
        let accounts = Arc::new(AccountService::new(db.clone(), keys));
        let outbound = Arc::new(OutboundService::new(
            db.clone(),
            resolver.clone(),
            dispatcher.clone(),
            base_url,
        ));

        // 4. Initialize admin user
        accounts
            .ensure_account(
                &config.admin.username,
                &config.admin.display_name,
                config.admin.note.as_deref(),
            )
            .await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            verifier: SignatureVerifier::new(config.federation.signature_max_age_seconds),
            config: Arc::new(config),
            db,
            accounts,
            notifications,
            resolver,
            inbox,
            dispatcher,
            outbound,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .merge(api::metrics_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method};
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods([Method::GET])
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods([Method::GET]).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
