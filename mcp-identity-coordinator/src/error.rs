//! Auth Coordinator errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("oauth error: {0}")]
    OAuth(#[from] mcp_identity_oauth::OAuthError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("session {context_id}/{server_name} is in state {state}, which does not permit this operation")]
    InvalidSessionState {
        context_id: String,
        server_name: String,
        state: String,
    },

    #[error("no pending authorization found for state {0}")]
    UnknownState(String),

    #[error("pending authorization for {context_id}/{server_name} expired")]
    PendingExpired { context_id: String, server_name: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authorization was cancelled")]
    Cancelled,

    #[error("timed out waiting for the authorization callback")]
    CallbackTimeout,
}
