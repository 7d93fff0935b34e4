use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::{
    config::PlatformConfig,
    domain::Session,
    events::{BridgeEvent, EventBus},
    services::{platform_client::TokenExchange, session_store::SessionStore},
    utils::errors::{Result, ShopBridgeError},
};

/// Where to send the merchant after a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostInstallRedirect {
    /// Request came from inside the platform's embedded UI; escape the
    /// iframe via the app-bridge page.
    Embedded { app_url: String },
    /// Plain top-level navigation.
    TopLevel { app_url: String },
}

impl PostInstallRedirect {
    pub fn app_url(&self) -> &str {
        match self {
            Self::Embedded { app_url } | Self::TopLevel { app_url } => app_url,
        }
    }
}

/// Coordinates the install handshake. The cryptographic parts live in the
/// external collaborators; the one state-affecting step owned here is the
/// session write.
pub struct InstallService {
    sessions: Arc<SessionStore>,
    exchanger: Arc<dyn TokenExchange>,
    events: EventBus,
    api_key: String,
    scopes: String,
    app_url: String,
}

impl InstallService {
    pub fn new(
        sessions: Arc<SessionStore>,
        exchanger: Arc<dyn TokenExchange>,
        events: EventBus,
        config: &PlatformConfig,
    ) -> Self {
        Self {
            sessions,
            exchanger,
            events,
            api_key: config.api_key.clone(),
            scopes: config.scopes.clone(),
            app_url: config.app_url.clone(),
        }
    }

    /// Authorize URL for the begin-install redirect. The state nonce is
    /// echoed back by the platform and verified upstream with the rest of
    /// the handshake.
    pub fn begin_install(&self, shop: &str) -> Result<String> {
        if !is_plausible_shop_domain(shop) {
            return Err(ShopBridgeError::InvalidRequest(format!(
                "Not a shop domain: {shop}"
            )));
        }
        let mut url = Url::parse(&format!("https://{shop}/admin/oauth/authorize"))
            .map_err(|e| ShopBridgeError::InvalidRequest(format!("Invalid shop domain: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.api_key)
            .append_pair("scope", &self.scopes)
            .append_pair("redirect_uri", &format!("{}/api/auth/callback", self.app_url))
            .append_pair("state", &Uuid::new_v4().to_string());
        tracing::info!(shop = %shop, "Install started");
        Ok(url.into())
    }

    /// Completes an install whose callback already passed the platform's
    /// signature checks. A failed or timed-out session write surfaces as an
    /// error so no redirect is ever issued to an unauthenticated state.
    pub async fn complete_install(
        &self,
        shop: &str,
        code: &str,
        embedded: bool,
    ) -> Result<PostInstallRedirect> {
        if !is_plausible_shop_domain(shop) {
            return Err(ShopBridgeError::InvalidRequest(format!(
                "Not a shop domain: {shop}"
            )));
        }

        let grant = self.exchanger.exchange_code(shop, code).await?;
        let session = Session::offline(shop, grant.access_token, grant.scope);
        self.sessions.store(&session).await?;

        self.events.publish(
            shop,
            BridgeEvent::SessionStored {
                shop: shop.to_string(),
                session_id: session.id.clone(),
            },
        );
        tracing::info!(shop = %shop, session_id = %session.id, "Install completed");

        let app_url = format!("https://{shop}/admin/apps/{}", self.api_key);
        Ok(if embedded {
            PostInstallRedirect::Embedded { app_url }
        } else {
            PostInstallRedirect::TopLevel { app_url }
        })
    }
}

/// A shop domain is a bare hostname: no scheme, no path, at least one dot.
fn is_plausible_shop_domain(shop: &str) -> bool {
    !shop.is_empty()
        && shop.contains('.')
        && shop
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}
