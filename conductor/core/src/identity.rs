//! Identity Provider
//!
//! Produces the three opaque identifiers attached to every chat request:
//!
//! | Identifier | Lifetime      | Header         |
//! |------------|---------------|----------------|
//! | session id | tab store     | `x-session-id` |
//! | client id  | durable store | `x-client-id`  |
//! | origin id  | in memory     | `x-ipaddress`  |
//!
//! None of the accessors can fail. Storage write errors are logged and the
//! freshly generated value is still returned, so a broken disk degrades to
//! per-process identifiers rather than failed requests.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::{ChatConfig, StorageKeys};
use crate::messages::{now_millis, random_suffix};
use crate::storage::KeyValueStore;

/// Header carrying the session id
pub const SESSION_HEADER: &str = "x-session-id";
/// Header carrying the client id
pub const CLIENT_HEADER: &str = "x-client-id";
/// Header carrying the network-origin id
pub const ORIGIN_HEADER: &str = "x-ipaddress";

/// Identifiers captured for a single request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityHeaders {
    /// Tab-scoped session id
    pub session_id: String,
    /// Durable client id
    pub client_id: String,
    /// Best-effort origin id, empty when unknown
    pub origin_id: String,
}

impl IdentityHeaders {
    /// Header name/value pairs in send order
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            (SESSION_HEADER, self.session_id.as_str()),
            (CLIENT_HEADER, self.client_id.as_str()),
            (ORIGIN_HEADER, self.origin_id.as_str()),
        ]
    }
}

/// Memoizing source of request identifiers
pub struct IdentityProvider {
    tab: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
    session_key: String,
    client_key: String,
    default_client_id: String,
    origin: RwLock<Option<String>>,
    // Serializes check-then-generate so concurrent callers agree on one id
    generate: Mutex<()>,
}

impl std::fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProvider")
            .field("session_key", &self.session_key)
            .field("client_key", &self.client_key)
            .field("origin", &*self.origin.read())
            .finish_non_exhaustive()
    }
}

impl IdentityProvider {
    /// Create a provider over a tab-scoped and a durable store
    ///
    /// An empty `default_client_id` makes the provider seed a random UUID.
    pub fn new(
        tab: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
        keys: &StorageKeys,
        default_client_id: impl Into<String>,
    ) -> Self {
        Self {
            tab,
            durable,
            session_key: keys.session_id.clone(),
            client_key: keys.client_id.clone(),
            default_client_id: default_client_id.into(),
            origin: RwLock::new(None),
            generate: Mutex::new(()),
        }
    }

    /// Create a provider using the keys and default client id from `config`
    pub fn from_config(
        config: &ChatConfig,
        tab: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::new(tab, durable, &config.keys, config.default_client_id.clone())
    }

    /// Current session id, generating and persisting one if absent
    pub fn session_id(&self) -> String {
        let _guard = self.generate.lock();
        if let Some(id) = self.tab.get(&self.session_key) {
            return id;
        }

        let id = format!("session_{}_{}", now_millis(), random_suffix(9));
        if let Err(e) = self.tab.set(&self.session_key, &id) {
            tracing::warn!(error = %e, "Failed to persist session id");
        }
        tracing::debug!(session_id = %id, "Started new session");
        id
    }

    /// Durable client id, seeding it on first use
    pub fn client_id(&self) -> String {
        let _guard = self.generate.lock();
        if let Some(id) = self.durable.get(&self.client_key) {
            return id;
        }

        let id = if self.default_client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.default_client_id.clone()
        };
        if let Err(e) = self.durable.set(&self.client_key, &id) {
            tracing::warn!(error = %e, "Failed to persist client id");
        }
        id
    }

    /// Cached origin id, or an empty string if none has been fetched
    pub fn origin_id(&self) -> String {
        self.origin.read().clone().unwrap_or_default()
    }

    /// Replace the cached origin id
    pub fn set_origin_id(&self, origin: impl Into<String>) {
        *self.origin.write() = Some(origin.into());
    }

    /// Fetch the origin id from `url` and cache it for later requests
    ///
    /// Accepts either `{"ip": "..."}` or a bare text body. Any failure is
    /// logged and leaves the cache unchanged.
    pub async fn refresh_origin_id(&self, client: &reqwest::Client, url: &str) {
        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "Origin lookup failed");
                return;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Origin lookup rejected");
            return;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url, error = %e, "Origin lookup body unreadable");
                return;
            }
        };

        match parse_origin(&body) {
            Some(origin) => {
                tracing::debug!(origin = %origin, "Cached origin id");
                self.set_origin_id(origin);
            }
            None => tracing::debug!(url, "Origin lookup returned no usable value"),
        }
    }

    /// Drop the session id so the next request starts a new session
    pub fn clear_session_id(&self) {
        let _guard = self.generate.lock();
        if let Err(e) = self.tab.remove(&self.session_key) {
            tracing::warn!(error = %e, "Failed to remove session id");
        }
    }

    /// Snapshot all three identifiers for one request
    pub fn headers(&self) -> IdentityHeaders {
        IdentityHeaders {
            session_id: self.session_id(),
            client_id: self.client_id(),
            origin_id: self.origin_id(),
        }
    }
}

fn parse_origin(body: &str) -> Option<String> {
    let body = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return value
            .get("ip")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);
    }

    let plain = !body.is_empty() && body.len() <= 64 && !body.contains(char::is_whitespace);
    plain.then(|| body.to_string())
}
