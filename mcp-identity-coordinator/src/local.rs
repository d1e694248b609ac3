//! Local coordinator profile: opens the system browser and runs a loopback
//! HTTP listener to receive the authorization-server callback directly,
//! for single-process command-line and desktop clients.

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Configuration for the Local profile's loopback listener.
#[derive(Debug, Clone)]
pub struct LocalProfileConfig {
    pub host: String,
    pub port: u16,
    pub callback_path: String,
    /// Suppress the system browser launch (e.g. headless test runs);
    /// the authorization URL is still returned to the caller.
    pub open_browser: bool,
    /// `true` (default): `complete_authorization` awaits the callback
    /// synchronously. `false`: returns immediately; the caller polls
    /// `get_auth_pending`.
    pub block_until_callback: bool,
}

impl Default for LocalProfileConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            callback_path: "/callback".to_string(),
            open_browser: true,
            block_until_callback: true,
        }
    }
}

impl LocalProfileConfig {
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.host,
            self.port,
            self.callback_path
        )
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Outcome of a received `/callback` hit: either the `code`/`state` pair
/// the authorization server issued, or an error it reported.
#[derive(Debug, Clone)]
pub enum CallbackResult {
    Granted { code: String, state: String },
    Denied { error: String, description: Option<String> },
}

struct CallbackState {
    sender: std::sync::Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let result = match (params.code, params.state, params.error) {
        (Some(code), Some(state_value), None) => CallbackResult::Granted { code, state: state_value },
        (_, _, Some(error)) => CallbackResult::Denied { error, description: params.error_description },
        _ => CallbackResult::Denied {
            error: "invalid_request".to_string(),
            description: Some("callback is missing code/state".to_string()),
        },
    };

    if let Some(sender) = state.sender.lock().unwrap().take() {
        let _ = sender.send(result);
    }

    Html("<html><body>Authorization complete. You may close this window.</body></html>")
}

/// Starts the loopback listener, opens the authorization URL in the system
/// browser (unless suppressed), and awaits exactly one callback hit.
///
/// Grounded on the `tokio::net::TcpListener` + `axum::serve` bring-up used
/// throughout this SDK's own HTTP transports, scaled down to one route and
/// one shutdown-on-first-hit shot.
pub async fn run_loopback_and_await_callback(
    config: &LocalProfileConfig,
    authorization_url: &str,
) -> crate::error::Result<CallbackResult> {
    let (tx, rx) = oneshot::channel();
    let callback_state = Arc::new(CallbackState { sender: std::sync::Mutex::new(Some(tx)) });

    let app = axum::Router::new()
        .route(&config.callback_path, get(handle_callback))
        .with_state(callback_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| crate::error::CoordinatorError::Config(format!("invalid loopback address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::CoordinatorError::Config(format!("failed to bind loopback listener: {e}")))?;

    info!(%addr, "local auth profile listening for the authorization callback");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    if config.open_browser {
        if let Err(e) = webbrowser::open(authorization_url) {
            warn!(error = %e, "failed to open system browser; authorization_url must be opened manually");
        }
    }

    let result = rx.await.map_err(|_| crate::error::CoordinatorError::CallbackTimeout)?;
    let _ = shutdown_tx.send(());
    if let Err(e) = server.await {
        error!(error = %e, "loopback listener task panicked");
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_combines_host_port_and_path() {
        let config = LocalProfileConfig::default();
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:8765/callback");
    }
}
