//! The Auth Coordinator: drives OAuth for an MCP client talking to one or
//! more upstream MCP servers, owns the Session state machine, persists
//! tokens, and notifies completion subscribers.
//!
//! Bound to a single `context_id` for its lifetime — multi-user isolation
//! is realized by `ClientManager` constructing one `AuthCoordinator` per
//! context rather than by this type juggling many contexts' sessions
//! itself.

use crate::error::{CoordinatorError, Result};
use crate::local::{run_loopback_and_await_callback, CallbackResult, LocalProfileConfig};
use crate::pkce_flow::{build_authorization_attempt, AuthorizationAttempt};
use crate::registration_cache::RegistrationCache;
use crate::remote::{AuthChallenge, CompletionBus, CompletionEvent, CompletionSubscriber};
use crate::session::{PendingAuthorization, Session, SessionState};
use crate::storage::{client_key, pending_key, state_key, token_key, StorageBackend};
use mcp_identity_oauth::{
    AuthStrategy, ClientRegistrationRequest, HttpMethod, HttpRequest, HttpTransport, OAuthClient,
    OAuthClientConfig, ProtectedResourceMetadata, RegisteredClient, ReqwestTransport, TokenRecord,
    TokenRequest, Zone,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Per-upstream-server static configuration the coordinator needs to drive
/// registration and the authorization-code flow for that server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The MCP server's own base URL — sent as `resource` in both the
    /// authorization request and the code-exchange call.
    pub base_url: String,
    pub client_name: String,
    pub grant_types: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
    pub scope: Option<String>,
}

impl ServerConfig {
    pub fn new(base_url: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_name: client_name.into(),
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            token_endpoint_auth_method: None,
            scope: None,
        }
    }
}

/// Which operational profile drives the authorization-code flow: `Local`
/// opens a system browser and blocks on a loopback callback, for
/// single-process clients; `Remote` hands the authorization URL back to
/// the embedding application and exposes a completion endpoint it wires
/// into its own router, for non-blocking multi-tenant services.
pub enum CoordinatorProfile {
    Local(LocalProfileConfig),
    Remote { redirect_uri: String },
}

impl CoordinatorProfile {
    fn redirect_uri(&self) -> String {
        match self {
            CoordinatorProfile::Local(config) => config.redirect_uri(),
            CoordinatorProfile::Remote { redirect_uri } => redirect_uri.clone(),
        }
    }
}

/// Coordinator-wide configuration, independent of any one upstream server.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub servers: HashMap<String, ServerConfig>,
    /// How long a pending authorization attempt may sit unanswered before
    /// it auto-transitions `AUTH_PENDING -> AUTH_FAILED` (default 10 min).
    pub pending_ttl: chrono::Duration,
    /// How long before a token's stated expiry it is treated as already
    /// expired (default 30s).
    pub token_safety_margin: chrono::Duration,
    /// Whether to route the authorization request through RFC 9126 PAR
    /// when available. Defaults off — an Open Question resolved in
    /// DESIGN.md.
    pub use_par: bool,
    pub oauth: OAuthClientConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            servers: HashMap::new(),
            pending_ttl: chrono::Duration::minutes(10),
            token_safety_margin: chrono::Duration::seconds(30),
            use_par: false,
            oauth: OAuthClientConfig::default(),
        }
    }
}

/// Drives OAuth for one context's connections to its configured upstream
/// MCP servers. Construct one per `context_id` (see `ClientManager`); all
/// storage keys this instance reads or writes are prefixed with that
/// `context_id` by the key helpers in `storage.rs`, except the global
/// `state:` reverse index, which is deliberately un-prefixed (the state
/// value alone is what correlates a callback back to its context before
/// the context is even known).
pub struct AuthCoordinator {
    context_id: String,
    config: CoordinatorConfig,
    profile: CoordinatorProfile,
    storage: Arc<dyn StorageBackend>,
    oauth_client: Arc<OAuthClient>,
    transport: Arc<dyn HttpTransport>,
    registration_cache: RegistrationCache,
    sessions: Mutex<HashMap<String, Session>>,
    /// In-memory only: which zone a server's tokens were last issued
    /// against, so a refresh-grant exchange knows where to call without
    /// re-deriving it from protected-resource metadata. Refresh is an
    /// optimization over re-authentication, never a requirement — an empty
    /// cache (e.g. after a restart) simply means the coordinator falls
    /// back to provoking a fresh 401 instead of refreshing.
    zone_cache: Mutex<HashMap<String, Zone>>,
    completion_bus: Arc<CompletionBus>,
}

impl AuthCoordinator {
    pub fn new(
        context_id: impl Into<String>,
        config: CoordinatorConfig,
        profile: CoordinatorProfile,
        storage: Arc<dyn StorageBackend>,
        oauth_client: Arc<OAuthClient>,
    ) -> Self {
        Self::with_transport(
            context_id,
            config,
            profile,
            storage,
            oauth_client,
            Arc::new(ReqwestTransport::default()),
        )
    }

    /// As `new`, but with an injectable transport for the
    /// protected-resource metadata fetch and per-zone token exchanges —
    /// used by tests to avoid a real network call.
    pub fn with_transport(
        context_id: impl Into<String>,
        config: CoordinatorConfig,
        profile: CoordinatorProfile,
        storage: Arc<dyn StorageBackend>,
        oauth_client: Arc<OAuthClient>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            registration_cache: RegistrationCache::new(oauth_client.clone(), storage.clone()),
            config,
            profile,
            storage,
            oauth_client,
            transport,
            sessions: Mutex::new(HashMap::new()),
            zone_cache: Mutex::new(HashMap::new()),
            completion_bus: Arc::new(CompletionBus::new()),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn CompletionSubscriber>) {
        self.completion_bus.subscribe(subscriber).await;
    }

    fn server_config(&self, server_name: &str) -> Result<ServerConfig> {
        self.config
            .servers
            .get(server_name)
            .cloned()
            .ok_or_else(|| CoordinatorError::Config(format!("no server configured named {server_name}")))
    }

    pub async fn session_state(&self, server_name: &str) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(server_name)
            .map(|s| s.status)
            .unwrap_or(SessionState::Initializing)
    }

    /// The authorization URL still awaiting user action for `server_name`,
    /// if any. Used by the non-blocking Local profile (`block_until_callback
    /// = false`) and by any caller that wants to poll ahead of the Remote
    /// profile's `get_auth_challenges`.
    pub async fn get_auth_pending(&self, server_name: &str) -> Option<String> {
        self.expire_stale_pending(server_name).await;
        self.sessions
            .lock()
            .await
            .get(server_name)
            .and_then(|s| s.authorization_url_pending.clone())
    }

    /// Every session currently `AUTH_PENDING`, surfaced to the Remote
    /// profile's embedding application so it can route the end user to
    /// each `authorization_url`.
    pub async fn get_auth_challenges(&self) -> Vec<AuthChallenge> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .filter(|s| s.status == SessionState::AuthPending)
            .filter_map(|s| {
                let url = s.authorization_url_pending.clone()?;
                let state = s.metadata.get("state").cloned()?;
                Some(AuthChallenge {
                    context_id: s.context_id.clone(),
                    server_name: s.server_name.clone(),
                    authorization_url: url,
                    state,
                })
            })
            .collect()
    }

    /// A pending authorization that has sat unanswered past
    /// `pending_ttl` auto-transitions to `AUTH_FAILED` with reason
    /// `timeout`, and its `pending:`/`state:` storage records are removed
    /// so a late callback with that `state` returns `invalid_request`.
    async fn expire_stale_pending(&self, server_name: &str) {
        let state = {
            let sessions = self.sessions.lock().await;
            match sessions.get(server_name) {
                Some(session) if session.status == SessionState::AuthPending => {
                    session.metadata.get("state").cloned()
                }
                _ => None,
            }
        };
        let Some(state) = state else { return };

        let pending: Option<PendingAuthorization> = self
            .storage
            .get(&pending_key(&self.context_id, server_name))
            .await
            .ok()
            .flatten()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());

        let Some(pending) = pending else { return };
        if !pending.is_expired(self.config.pending_ttl) {
            return;
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(server_name) {
            session.last_error = Some("timeout".to_string());
            session.transition(SessionState::AuthFailed);
        }
        drop(sessions);
        let _ = self.storage.delete(&pending_key(&self.context_id, server_name)).await;
        let _ = self.storage.delete(&state_key(&state)).await;
    }

    /// Resolves the hinted protected-resource metadata, picks the first
    /// authorization server, ensures a registered client, and generates a
    /// PKCE authorization attempt. Transitions the session
    /// `CONNECTING -> AUTHENTICATING -> AUTH_PENDING`.
    async fn initiate_authorization(
        &self,
        server_name: &str,
        resource_metadata_url: &str,
    ) -> Result<AuthorizationAttempt> {
        let server = self.server_config(server_name)?;

        {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(server_name.to_string())
                .or_insert_with(|| Session::new(self.context_id.clone(), server_name.to_string()));
            if session.status == SessionState::Initializing {
                session.transition(SessionState::Connecting);
            }
            session.transition(SessionState::Authenticating);
        }

        let resource_metadata =
            fetch_protected_resource_metadata(self.transport.as_ref(), resource_metadata_url).await?;
        let authorization_server_url = resource_metadata.authorization_servers.first().ok_or_else(|| {
            CoordinatorError::Config(
                "protected-resource metadata lists no authorization servers".to_string(),
            )
        })?;
        let zone = Zone::from_url(authorization_server_url)?;

        let discovered = self.oauth_client.discover_metadata(&zone).await?;
        let authorization_endpoint = discovered.authorization_endpoint.clone().ok_or_else(|| {
            CoordinatorError::Config(format!("zone {zone} advertises no authorization_endpoint"))
        })?;

        let redirect_uri = self.profile.redirect_uri();
        let registered = self
            .registration_cache
            .ensure_registered(&zone, &server.client_name, || ClientRegistrationRequest {
                client_name: server.client_name.clone(),
                redirect_uris: vec![redirect_uri.clone()],
                grant_types: server.grant_types.clone(),
                token_endpoint_auth_method: server.token_endpoint_auth_method.clone(),
                scope: server.scope.clone(),
                jwks_url: None,
            })
            .await?;

        let attempt = build_authorization_attempt(
            &self.oauth_client,
            &zone,
            &authorization_endpoint,
            &registered.client_id,
            &redirect_uri,
            &server.base_url,
            self.config.use_par,
        )
        .await?;

        let pending = PendingAuthorization {
            state: attempt.state.clone(),
            pkce_verifier: attempt.pkce.verifier.clone(),
            redirect_uri,
            server_name: server_name.to_string(),
            context_id: self.context_id.clone(),
            zone_url: zone.key(),
            created_at: chrono::Utc::now(),
        };
        self.storage
            .set(
                &pending_key(&self.context_id, server_name),
                serde_json::to_vec(&pending).map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            )
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        self.storage
            .set(
                &state_key(&attempt.state),
                serde_json::to_vec(&(self.context_id.clone(), server_name.to_string()))
                    .map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            )
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;

        self.zone_cache.lock().await.insert(server_name.to_string(), zone);

        {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.get_mut(server_name).expect("session inserted above");
            session.registered_client_ref = Some(registered.client_id.clone());
            session.authorization_url_pending = Some(attempt.authorization_url.clone());
            session.metadata.insert("state".to_string(), attempt.state.clone());
            session.transition(SessionState::AuthPending);
        }

        info!(server_name, %zone, "authorization URL generated, awaiting user action");
        Ok(attempt)
    }

    /// Local profile entry point: initiates authorization, opens the
    /// system browser (unless suppressed), and — when
    /// `block_until_callback` is set — awaits the callback synchronously
    /// and completes the code exchange before returning. When
    /// `block_until_callback` is false the loopback listener still runs,
    /// just on a detached task: this call returns as soon as the
    /// authorization URL exists, and the caller is expected to poll
    /// `get_auth_pending` until it clears.
    pub async fn connect_local(
        self: &Arc<Self>,
        server_name: &str,
        resource_metadata_url: &str,
    ) -> Result<()> {
        let CoordinatorProfile::Local(local_config) = &self.profile else {
            return Err(CoordinatorError::Config(
                "connect_local called on a Remote-profile coordinator".to_string(),
            ));
        };
        let local_config = local_config.clone();

        let attempt = self.initiate_authorization(server_name, resource_metadata_url).await?;

        if !local_config.block_until_callback {
            let this = self.clone();
            let server_name = server_name.to_string();
            let authorization_url = attempt.authorization_url.clone();
            let fallback_state = attempt.state.clone();
            tokio::spawn(async move {
                let result = match run_loopback_and_await_callback(&local_config, &authorization_url).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(server_name, error = %e, "loopback listener failed for non-blocking local connect");
                        return;
                    }
                };
                let outcome = match result {
                    CallbackResult::Granted { code, state } => this.complete_authorization(&state, Ok(code)).await,
                    CallbackResult::Denied { error, description } => {
                        this.complete_authorization(&fallback_state, Err((error, description))).await
                    }
                };
                if let Err(e) = outcome {
                    warn!(server_name, error = %e, "failed to complete non-blocking local authorization");
                }
            });
            return Ok(());
        }

        let result = run_loopback_and_await_callback(&local_config, &attempt.authorization_url).await?;
        match result {
            CallbackResult::Granted { code, state } => {
                self.complete_authorization(&state, Ok(code)).await?;
                Ok(())
            }
            CallbackResult::Denied { error, description } => {
                self.complete_authorization(&attempt.state, Err((error, description))).await?;
                Err(CoordinatorError::InvalidSessionState {
                    context_id: self.context_id.clone(),
                    server_name: server_name.to_string(),
                    state: "AUTH_FAILED".to_string(),
                })
            }
        }
    }

    /// Non-blocking entry point shared by the Remote profile and the
    /// Local profile's `block_until_callback = false` mode: initiates
    /// authorization and returns immediately, leaving the caller to poll
    /// `get_auth_pending`/`get_auth_challenges` and eventually call
    /// `complete_authorization` once the callback arrives.
    pub async fn begin_authorization(&self, server_name: &str, resource_metadata_url: &str) -> Result<String> {
        let attempt = self.initiate_authorization(server_name, resource_metadata_url).await?;
        Ok(attempt.authorization_url)
    }

    /// The completion endpoint for the Remote profile (and reused
    /// internally by the Local profile's blocking path): looks up `state`,
    /// consumes the pending record exactly once, and on success exchanges
    /// the code for tokens and transitions the session to `CONNECTED`. A
    /// `CompletionEvent` is always published, whether or not the exchange
    /// succeeded.
    pub async fn complete_authorization(
        &self,
        state: &str,
        outcome: std::result::Result<String, (String, Option<String>)>,
    ) -> Result<CompletionEvent> {
        let state_bytes = self
            .storage
            .get(&state_key(state))
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        let Some(state_bytes) = state_bytes else {
            return Err(CoordinatorError::UnknownState(state.to_string()));
        };
        self.storage
            .delete(&state_key(state))
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        let (context_id, server_name): (String, String) = serde_json::from_slice(&state_bytes)
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;

        let pending_bytes = self
            .storage
            .get(&pending_key(&context_id, &server_name))
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        let Some(pending_bytes) = pending_bytes else {
            return Err(CoordinatorError::PendingExpired { context_id, server_name });
        };
        self.storage
            .delete(&pending_key(&context_id, &server_name))
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        let pending: PendingAuthorization = serde_json::from_slice(&pending_bytes)
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;

        if pending.is_expired(self.config.pending_ttl) {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(&server_name) {
                session.last_error = Some("timeout".to_string());
                session.transition(SessionState::AuthFailed);
            }
            return Err(CoordinatorError::PendingExpired { context_id, server_name });
        }

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(&server_name) {
                session.transition(SessionState::Authenticating);
            }
        }

        let server = self.server_config(&server_name)?;

        let (success, result, last_error) = match outcome {
            Ok(code) => match self.exchange_code(&server, &pending, &code).await {
                Ok(token) => {
                    let mut sessions = self.sessions.lock().await;
                    if let Some(session) = sessions.get_mut(&server_name) {
                        session.current_token_ref = Some(token.clone());
                        session.transition(SessionState::Connected);
                    }
                    (true, Some(token.access_token), None)
                }
                Err(err) => {
                    warn!(server_name = %server_name, error = %err, "code exchange failed");
                    let mut sessions = self.sessions.lock().await;
                    if let Some(session) = sessions.get_mut(&server_name) {
                        session.last_error = Some(err.to_string());
                        session.transition(SessionState::AuthFailed);
                    }
                    (false, None, Some(err.to_string()))
                }
            },
            Err((error, description)) => {
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(&server_name) {
                    session.last_error = Some(error.clone());
                    session.transition(SessionState::AuthFailed);
                }
                (
                    false,
                    None,
                    Some(description.unwrap_or(error)),
                )
            }
        };

        let metadata = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(&server_name)
                .map(|s| s.metadata.clone())
                .unwrap_or_default()
        };

        let event = CompletionEvent {
            context_id,
            server_name,
            state: state.to_string(),
            success,
            result: if success { result } else { last_error },
            metadata,
        };
        self.completion_bus.publish(event.clone()).await;
        Ok(event)
    }

    async fn registered_client_record(&self, zone: &Zone, app_name: &str) -> Result<RegisteredClient> {
        let bytes = self
            .storage
            .get(&client_key(&zone.key(), app_name))
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?
            .ok_or_else(|| CoordinatorError::Config(format!("no registered client for {zone}/{app_name}")))?;
        serde_json::from_slice(&bytes).map_err(|e| CoordinatorError::Storage(e.to_string()))
    }

    fn exchange_client_for(&self, record: &RegisteredClient) -> OAuthClient {
        let strategy = match &record.client_secret {
            Some(secret) => AuthStrategy::Basic {
                client_id: record.client_id.clone(),
                client_secret: secret.clone(),
            },
            // A public client authorized only by PKCE — correct and
            // common for dynamically-registered native/CLI clients.
            None => AuthStrategy::None,
        };
        OAuthClient::with_transport(self.config.oauth.clone(), strategy, self.transport.clone())
    }

    async fn exchange_code(
        &self,
        server: &ServerConfig,
        pending: &PendingAuthorization,
        code: &str,
    ) -> Result<TokenRecord> {
        let zone = Zone::from_url(&pending.zone_url)?;
        let record = self.registered_client_record(&zone, &server.client_name).await?;
        let client = self.exchange_client_for(&record);

        let request = TokenRequest::authorization_code(code, &pending.pkce_verifier, &pending.redirect_uri)
            .with_resource(server.base_url.clone());
        let token = client.request_token(&zone, request).await?;

        self.storage
            .set(
                &token_key(&self.context_id, &pending.server_name),
                serde_json::to_vec(&token).map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            )
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        self.zone_cache.lock().await.insert(pending.server_name.clone(), zone);
        Ok(token)
    }

    /// Read the current token for `server_name`, transparently refreshing
    /// it when expired and a `refresh_token` is present. When the token is
    /// absent, expired and unrefreshable, or refresh itself fails, the
    /// session is nudged back to `CONNECTING` to provoke a fresh 401/re-auth
    /// cycle on the next MCP call.
    pub async fn get_token(&self, server_name: &str) -> Result<TokenRecord> {
        let key = token_key(&self.context_id, server_name);
        let stored = self
            .storage
            .get(&key)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        let record: Option<TokenRecord> = stored.and_then(|bytes| serde_json::from_slice(&bytes).ok());

        if let Some(record) = &record {
            if record.is_valid(chrono::Utc::now(), self.config.token_safety_margin) {
                return Ok(record.clone());
            }
        }

        if let Some(record) = &record {
            if let Some(refresh_token) = &record.refresh_token {
                if let Some(zone) = self.zone_cache.lock().await.get(server_name).cloned() {
                    match self.refresh(&zone, server_name, refresh_token).await {
                        Ok(refreshed) => return Ok(refreshed),
                        Err(err) => {
                            warn!(server_name, error = %err, "refresh attempt failed, re-authenticating");
                        }
                    }
                }
            }
        }

        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(server_name.to_string())
            .or_insert_with(|| Session::new(self.context_id.clone(), server_name.to_string()));
        if session.status.is_operational() {
            session.transition(SessionState::Connecting);
        }
        Err(CoordinatorError::InvalidSessionState {
            context_id: self.context_id.clone(),
            server_name: server_name.to_string(),
            state: "token missing or expired and not refreshable".to_string(),
        })
    }

    async fn refresh(&self, zone: &Zone, server_name: &str, refresh_token: &str) -> Result<TokenRecord> {
        let server = self.server_config(server_name)?;
        let record = self.registered_client_record(zone, &server.client_name).await?;
        let client = self.exchange_client_for(&record);
        let token = client.request_token(zone, TokenRequest::refresh(refresh_token)).await?;

        self.storage
            .set(
                &token_key(&self.context_id, server_name),
                serde_json::to_vec(&token).map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            )
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(token)
    }

    /// Cancel an in-flight authorization attempt: transitions the session
    /// to `AUTH_FAILED` with cause `cancelled` and removes the `pending:`
    /// and `state:` storage records. Never leaves a partially-stored
    /// token — this runs before any token would have been written.
    pub async fn cancel_authorization(&self, server_name: &str) -> Result<()> {
        let state = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(server_name) else {
                return Ok(());
            };
            let state = session.metadata.remove("state");
            session.last_error = Some("cancelled".to_string());
            session.transition(SessionState::AuthFailed);
            state
        };

        let _ = self.storage.delete(&pending_key(&self.context_id, server_name)).await;
        if let Some(state) = state {
            let _ = self.storage.delete(&state_key(&state)).await;
        }
        Err(CoordinatorError::Cancelled)
    }
}

/// Fetches an RFC 9728 protected-resource metadata document from the
/// `resource_metadata` URL hinted by a `401`'s `WWW-Authenticate` header.
async fn fetch_protected_resource_metadata(
    transport: &dyn HttpTransport,
    url: &str,
) -> Result<ProtectedResourceMetadata> {
    let response = transport
        .send(HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: HashMap::new(),
            body: None,
        })
        .await?;
    if response.status < 200 || response.status >= 300 {
        return Err(CoordinatorError::Config(format!(
            "protected-resource metadata fetch returned status {}",
            response.status
        )));
    }
    response
        .json()
        .map_err(|e| CoordinatorError::Storage(format!("malformed protected-resource metadata: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use mcp_identity_oauth::transport::test_support::ScriptedTransport;
    use mcp_identity_oauth::HttpResponse;
    use std::collections::HashMap as StdHashMap;

    fn coordinator_config() -> CoordinatorConfig {
        let mut servers = HashMap::new();
        servers.insert("upstream".to_string(), ServerConfig::new("http://srv:8000/", "agent"));
        CoordinatorConfig { servers, ..Default::default() }
    }

    fn ok(body: serde_json::Value) -> std::result::Result<HttpResponse, String> {
        Ok(HttpResponse { status: 200, headers: StdHashMap::new(), body: serde_json::to_vec(&body).unwrap() })
    }

    /// End-to-end: unauthenticated call triggers full PKCE, registration,
    /// and exchange down to a `CONNECTED` session.
    #[tokio::test]
    async fn full_pkce_flow_reaches_connected_session() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(serde_json::json!({
                "resource": "http://srv:8000/",
                "authorization_servers": ["https://zone.example/"],
                "bearer_methods_supported": ["header"],
            })),
            ok(serde_json::json!({
                "issuer": "https://zone.example/",
                "authorization_endpoint": "https://zone.example/oauth2/authorize",
                "token_endpoint": "https://zone.example/oauth2/token",
            })),
            ok(serde_json::json!({
                "client_id": "c123",
                "redirect_uris": ["http://127.0.0.1:8765/callback"],
                "grant_types": ["authorization_code"],
                "token_endpoint_auth_method": "none",
            })),
            ok(serde_json::json!({ "access_token": "T1", "expires_in": 3600 })),
        ]));
        let oauth_client = Arc::new(mcp_identity_oauth::OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::None,
            transport.clone(),
        ));
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let coordinator = AuthCoordinator::with_transport(
            "alice",
            coordinator_config(),
            CoordinatorProfile::Remote { redirect_uri: "http://127.0.0.1:8765/callback".to_string() },
            storage,
            oauth_client,
            transport,
        );

        let url = coordinator
            .begin_authorization(
                "upstream",
                "http://srv:8000/.well-known/oauth-protected-resource/mcp",
            )
            .await
            .unwrap();
        assert!(url.contains("client_id=c123"));
        assert_eq!(coordinator.session_state("upstream").await, SessionState::AuthPending);

        let challenges = coordinator.get_auth_challenges().await;
        assert_eq!(challenges.len(), 1);
        let state = challenges[0].state.clone();

        let event = coordinator.complete_authorization(&state, Ok("abc".to_string())).await.unwrap();
        assert!(event.success);
        assert_eq!(coordinator.session_state("upstream").await, SessionState::Connected);

        let token = coordinator.get_token("upstream").await.unwrap();
        assert_eq!(token.access_token, "T1");
    }

    /// Replaying a consumed `state` returns `UnknownState`.
    #[tokio::test]
    async fn replayed_state_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(serde_json::json!({
                "resource": "http://srv:8000/",
                "authorization_servers": ["https://zone.example/"],
            })),
            ok(serde_json::json!({ "issuer": "https://zone.example/", "authorization_endpoint": "https://zone.example/oauth2/authorize", "token_endpoint": "https://zone.example/oauth2/token" })),
            ok(serde_json::json!({ "client_id": "c123", "redirect_uris": ["http://127.0.0.1:8765/callback"], "grant_types": ["authorization_code"], "token_endpoint_auth_method": "none" })),
            ok(serde_json::json!({ "access_token": "T1", "expires_in": 3600 })),
        ]));
        let oauth_client = Arc::new(mcp_identity_oauth::OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::None,
            transport.clone(),
        ));
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let coordinator = AuthCoordinator::with_transport(
            "alice",
            coordinator_config(),
            CoordinatorProfile::Remote { redirect_uri: "http://127.0.0.1:8765/callback".to_string() },
            storage,
            oauth_client,
            transport,
        );
        coordinator
            .begin_authorization("upstream", "http://srv:8000/.well-known/oauth-protected-resource/mcp")
            .await
            .unwrap();
        let state = coordinator.get_auth_challenges().await[0].state.clone();

        coordinator.complete_authorization(&state, Ok("abc".to_string())).await.unwrap();
        let replay = coordinator.complete_authorization(&state, Ok("abc".to_string())).await;
        assert!(matches!(replay, Err(CoordinatorError::UnknownState(_))));
    }

    /// Two contexts never observe each other's tokens.
    #[tokio::test]
    async fn two_contexts_never_share_stored_tokens() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        storage
            .set(&token_key("alice", "upstream"), b"alice-token".to_vec())
            .await
            .unwrap();
        storage
            .set(&token_key("bob", "upstream"), b"bob-token".to_vec())
            .await
            .unwrap();

        assert_ne!(
            storage.get(&token_key("alice", "upstream")).await.unwrap(),
            storage.get(&token_key("bob", "upstream")).await.unwrap(),
        );
    }

    #[tokio::test]
    async fn cancel_clears_pending_and_fails_session() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(serde_json::json!({
                "resource": "http://srv:8000/",
                "authorization_servers": ["https://zone.example/"],
            })),
            ok(serde_json::json!({ "issuer": "https://zone.example/", "authorization_endpoint": "https://zone.example/oauth2/authorize", "token_endpoint": "https://zone.example/oauth2/token" })),
            ok(serde_json::json!({ "client_id": "c123", "redirect_uris": ["http://127.0.0.1:8765/callback"], "grant_types": ["authorization_code"], "token_endpoint_auth_method": "none" })),
        ]));
        let oauth_client = Arc::new(mcp_identity_oauth::OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::None,
            transport.clone(),
        ));
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let coordinator = AuthCoordinator::with_transport(
            "alice",
            coordinator_config(),
            CoordinatorProfile::Remote { redirect_uri: "http://127.0.0.1:8765/callback".to_string() },
            storage.clone(),
            oauth_client,
            transport,
        );
        coordinator
            .begin_authorization("upstream", "http://srv:8000/.well-known/oauth-protected-resource/mcp")
            .await
            .unwrap();

        let _ = coordinator.cancel_authorization("upstream").await;
        assert_eq!(coordinator.session_state("upstream").await, SessionState::AuthFailed);
        assert!(storage.get(&pending_key("alice", "upstream")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_server_name_is_a_config_error() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let oauth_client = Arc::new(mcp_identity_oauth::OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::None,
            transport.clone(),
        ));
        let coordinator = AuthCoordinator::with_transport(
            "alice",
            CoordinatorConfig::default(),
            CoordinatorProfile::Remote { redirect_uri: "http://127.0.0.1:8765/callback".to_string() },
            storage,
            oauth_client,
            transport,
        );

        let result = coordinator.begin_authorization("ghost", "http://srv:8000/.well-known/oauth-protected-resource/mcp").await;
        assert!(matches!(result, Err(CoordinatorError::Config(_))));
    }
}
