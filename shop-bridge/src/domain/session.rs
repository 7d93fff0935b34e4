use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One authorized link between this app and a merchant store.
///
/// Records are replaced wholesale on every write; the store has no partial
/// update or merge semantics. `access_token` is a live credential, so `Debug`
/// is implemented by hand to keep it out of logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub shop: String,
    pub access_token: String,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Offline (background) session for a shop. The platform issues one
    /// long-lived offline token per installation, so the id derives from the
    /// shop domain.
    pub fn offline(
        shop: impl Into<String>,
        access_token: impl Into<String>,
        scope: Option<String>,
    ) -> Self {
        let shop = shop.into();
        Self {
            id: Self::offline_id(&shop),
            shop,
            access_token: access_token.into(),
            is_online: false,
            scope,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn offline_id(shop: &str) -> String {
        format!("offline_{shop}")
    }

    /// Token-level expiry. Offline tokens carry none; storage TTL is handled
    /// separately by the session store.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("shop", &self.shop)
            .field("access_token", &"<redacted>")
            .field("is_online", &self.is_online)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}
