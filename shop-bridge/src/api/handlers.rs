use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use chrono::Utc;

use crate::{
    api::models::*,
    config::AppConfig,
    domain::{Session, WebhookEnvelope},
    events::EventBus,
    services::{
        install::{InstallService, PostInstallRedirect},
        platform_client::{KpiReport, PlatformClient},
        session_store::SessionStore,
        webhook_dispatcher::WebhookDispatcher,
    },
    utils::errors::{Result, ShopBridgeError},
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub installs: Arc<InstallService>,
    pub platform: Arc<PlatformClient>,
    pub config: AppConfig,
    pub event_bus: EventBus,
}

// Health check
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// Begin install: redirect the merchant to the platform's authorize page
pub async fn begin_install(
    State(state): State<AppState>,
    Query(query): Query<BeginInstallQuery>,
) -> std::result::Result<Redirect, (StatusCode, Json<ErrorResponse>)> {
    match state.installs.begin_install(&query.shop) {
        Ok(authorize_url) => Ok(Redirect::temporary(&authorize_url)),
        Err(e) => Err(handle_error(e)),
    }
}

// Install callback: store the session, then escape to the app
pub async fn install_callback(
    State(state): State<AppState>,
    Query(query): Query<InstallCallbackQuery>,
) -> Response {
    let embedded = query.embedded.as_deref() == Some("1") || query.host.is_some();
    match state
        .installs
        .complete_install(&query.shop, &query.code, embedded)
        .await
    {
        Ok(PostInstallRedirect::Embedded { app_url }) => {
            Html(embedded_redirect_page(&app_url)).into_response()
        }
        Ok(PostInstallRedirect::TopLevel { app_url }) => Redirect::to(&app_url).into_response(),
        Err(e) => {
            tracing::error!(shop = %query.shop, error = %e, "Install failed");
            // Merchants get a generic retry page, never the raw failure.
            (StatusCode::INTERNAL_SERVER_ERROR, Html(RETRY_INSTALL_PAGE)).into_response()
        }
    }
}

/// Single intake path for platform deliveries. The signature gate runs
/// upstream; an envelope that reaches this handler is authenticated.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let envelope = match envelope_from_request(&headers, &body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed webhook delivery");
            return StatusCode::BAD_REQUEST;
        }
    };

    let outcome = state.dispatcher.dispatch(&envelope).await;
    if outcome.is_acknowledged() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn envelope_from_request(headers: &HeaderMap, body: &[u8]) -> Result<WebhookEnvelope> {
    let topic = header_str(headers, "x-shopify-topic")?;
    let shop = header_str(headers, "x-shopify-shop-domain")?;
    let delivery_id = header_str(headers, "x-shopify-webhook-id")?;
    Ok(WebhookEnvelope::new(topic, shop, delivery_id, body.to_vec()))
}

fn header_str(headers: &HeaderMap, name: &str) -> Result<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ShopBridgeError::InvalidRequest(format!("Missing header {name}")))
}

// Read API: shop KPIs aggregated from the platform's admin API
pub async fn shop_kpis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ShopScopedQuery>,
) -> std::result::Result<Json<KpiReport>, (StatusCode, Json<ErrorResponse>)> {
    let Some(session) = resolve_session(&state, &headers, query.shop.as_deref()).await else {
        return Err(handle_error(ShopBridgeError::Unauthenticated));
    };

    match state.platform.shop_kpis(&session).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            tracing::error!(shop = %session.shop, error = %e, "KPI aggregation failed");
            Err(handle_error(e))
        }
    }
}

/// Explicit session resolution: shop domain from the query or the
/// `X-Shop-Domain` header, then the stored offline session for it. No
/// ambient request state.
async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
    shop_param: Option<&str>,
) -> Option<Session> {
    let shop = shop_param.map(str::to_string).or_else(|| {
        headers
            .get("x-shop-domain")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })?;
    state
        .sessions
        .load(&Session::offline_id(&shop))
        .await
        .ok()
        .flatten()
        .filter(|session| !session.is_expired())
}

// Public API key for the embedded frontend
pub async fn platform_api_key(State(state): State<AppState>) -> Json<ApiKeyResponse> {
    Json(ApiKeyResponse {
        api_key: state.config.platform.api_key.clone(),
    })
}

/// Platform entry point. Forwards the install context parameters verbatim to
/// the embedded page.
pub async fn entry(Query(query): Query<EntryQuery>) -> Redirect {
    match &query.shop {
        Some(shop) => {
            let mut params = url::form_urlencoded::Serializer::new(String::new());
            params.append_pair("shop", shop);
            if let Some(host) = &query.host {
                params.append_pair("host", host);
            }
            if let Some(embedded) = &query.embedded {
                params.append_pair("embedded", embedded);
            }
            if let Some(hmac) = &query.hmac {
                params.append_pair("hmac", hmac);
            }
            Redirect::to(&format!("/embedded?{}", params.finish()))
        }
        None => Redirect::to("/embedded"),
    }
}

/// Placeholder shell for the embedded admin UI; the production frontend is
/// served from the platform's CDN.
pub async fn embedded_app() -> Html<&'static str> {
    Html(EMBEDDED_SHELL)
}

fn embedded_redirect_page(app_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Redirecting...</title></head>
<body>
<script>
  if (window.top === window.self) {{
    window.location.href = "{app_url}";
  }} else {{
    window.top.location.href = "{app_url}";
  }}
</script>
<p>Redirecting to your app... <a href="{app_url}">Continue</a></p>
</body>
</html>"#
    )
}

const RETRY_INSTALL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Installation failed</title></head>
<body>
<h2>Something went wrong installing the app.</h2>
<p>Please retry the installation from your admin panel.</p>
</body>
</html>"#;

const EMBEDDED_SHELL: &str = r#"<!DOCTYPE html>
<html>
<head><title>Shop Bridge</title></head>
<body>
<div id="app">Loading dashboard...</div>
</body>
</html>"#;

fn handle_error(error: ShopBridgeError) -> (StatusCode, Json<ErrorResponse>) {
    let (status_code, error_type) = match &error {
        ShopBridgeError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated"),
        ShopBridgeError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
        ShopBridgeError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
        ShopBridgeError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "Storage"),
        ShopBridgeError::PlatformApi(_) => (StatusCode::BAD_GATEWAY, "PlatformApi"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
    };

    (
        status_code,
        Json(ErrorResponse {
            error: error_type.to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }),
    )
}
