use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    api::{handlers, handlers::AppState, sse},
    config::AppConfig,
    events::EventBus,
    services::{
        install::InstallService,
        platform_client::{PlatformClient, TokenExchange},
        session_store::SessionStore,
        topic_handlers,
        webhook_dispatcher::WebhookDispatcher,
    },
    storage::{memory::MemoryKv, KvStore},
    utils::errors::{Result, ShopBridgeError},
};

pub struct Server {
    config: AppConfig,
    app: Router,
}

impl Server {
    /// Wire the service against the in-memory KV backend. Deployments with a
    /// real durable store assemble the state themselves via [`build_state`].
    pub async fn new(config: AppConfig) -> Result<Self> {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let state = build_state(config.clone(), kv);
        Ok(Self {
            config,
            app: build_router(state),
        })
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        tracing::info!("Starting shop-bridge on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ShopBridgeError::Internal(e.into()))?;

        axum::serve(listener, self.app)
            .await
            .map_err(|e| ShopBridgeError::Internal(e.into()))?;

        Ok(())
    }
}

/// Assemble the component graph over an externally supplied KV backend.
pub fn build_state(config: AppConfig, kv: Arc<dyn KvStore>) -> AppState {
    let event_bus = EventBus::new();

    let sessions = Arc::new(SessionStore::new(
        kv.clone(),
        config.storage.session_ttl(),
        config.storage.operation_timeout(),
    ));

    let platform = Arc::new(PlatformClient::new(&config.platform));

    // The registry is immutable after this point; the dispatcher only ever
    // reads it.
    let registry = Arc::new(topic_handlers::default_registry(
        sessions.clone(),
        kv.clone(),
        event_bus.clone(),
        config.webhooks.compliance_record_ttl(),
    ));

    let dispatcher = Arc::new(WebhookDispatcher::new(
        registry,
        kv,
        event_bus.clone(),
        &config.webhooks,
    ));

    let exchanger: Arc<dyn TokenExchange> = platform.clone();
    let installs = Arc::new(InstallService::new(
        sessions.clone(),
        exchanger,
        event_bus.clone(),
        &config.platform,
    ));

    AppState {
        sessions,
        dispatcher,
        installs,
        platform,
        config,
        event_bus,
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::entry))
        .route("/embedded", get(handlers::embedded_app))
        .route("/api/auth", get(handlers::begin_install))
        .route("/api/auth/callback", get(handlers::install_callback))
        .route("/api/webhooks", post(handlers::receive_webhook))
        .route("/api/shop-kpis", get(handlers::shop_kpis))
        .route("/api/platform/api-key", get(handlers::platform_api_key))
        .route("/api/events", get(sse::global_events_stream))
        .route("/api/events/{shop}", get(sse::shop_events_stream))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
