//! Quillpost - federation core for a single-author blog
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                       │
//! │  - Inbox + followers (ActivityPub)                          │
//! │  - Per-post collections (replies/likes/shares)              │
//! │  - Internal shared-secret endpoints                         │
//! │  - Static site surface                                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                           │
//! │  - Activity dispatch                                        │
//! │  - Reply graph, endorsements, followers, profile sync       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │   Federation Layer       │   │        Data Layer            │
//! │   - HTTP signatures      │   │  - Document store (SQLite)   │
//! │   - Actor resolution     │   │  - Persisted models          │
//! │   - Delivery + broadcast │   │                              │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: activity handling logic
//! - `federation`: signatures, authentication, outbound delivery
//! - `data`: document store and models
//! - `slug`: URI canonicalization
//! - `config`: configuration management
//! - `error`: error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod service;
pub mod slug;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains shared
/// resources like the document store and the HTTP client.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Document store
    pub store: Arc<data::DocumentStore>,

    /// HTTP client for unsigned probes (HEAD checks of local posts)
    pub http_client: Arc<reqwest::Client>,

    /// Signed outbound delivery
    pub deliverer: Arc<federation::Deliverer>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Open the document store
    /// 2. Build the shared HTTP client
    /// 3. Set up the outbound deliverer with the site key
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Open the document store
        let store = data::DocumentStore::connect(&config.database.path).await?;
        tracing::info!("Document store connected");

        // 2. Shared HTTP client
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent(concat!("Quillpost/", env!("CARGO_PKG_VERSION")))
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );

        // 3. Outbound deliverer
        let deliverer = federation::Deliverer::new(
            http_client.clone(),
            config.site.key_id(),
            config.federation.private_key_pem.clone(),
        );

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            http_client,
            deliverer: Arc::new(deliverer),
        })
    }
}

/// Build the Axum router with all routes
pub fn app(state: AppState) -> axum::Router {
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    axum::Router::new()
        // ActivityPub inbox + followers
        .merge(api::activitypub_router())
        // Per-post collections
        .merge(api::collections_router())
        // Internal shared-secret endpoints
        .merge(api::internal_router())
        // Static site surface (includes the fallback)
        .merge(api::site_router())
        // Middleware
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
