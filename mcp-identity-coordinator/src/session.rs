//! Per-(context, server) coordinator state and its transition table.

use mcp_identity_oauth::TokenRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The coordinator's view of one upstream MCP server connection and its
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Session created, nothing attempted yet.
    Initializing,
    /// HTTP connection to the MCP server in progress.
    Connecting,
    /// Discovery + registration in progress.
    Authenticating,
    /// Awaiting user completion of the authorization-code flow.
    AuthPending,
    /// Authenticated; tool calls permitted.
    Connected,
    /// Terminal for this attempt; retriable.
    AuthFailed,
    /// Terminal for this attempt; retriable.
    ConnectionFailed,
}

impl SessionState {
    /// `CONNECTED` is the only operational state: tool calls are permitted.
    pub fn is_operational(self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// The caller must complete an out-of-band step (open the
    /// authorization URL) before this session can proceed.
    pub fn requires_user_action(self) -> bool {
        matches!(self, SessionState::AuthPending)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, SessionState::AuthFailed | SessionState::ConnectionFailed)
    }

    /// Failed states are always retriable by re-entering `CONNECTING`.
    pub fn can_retry(self) -> bool {
        self.is_failed()
    }

    /// Whether `to` is a transition the table below permits from `self`.
    /// Used defensively; the coordinator itself only ever drives valid
    /// transitions, but this lets session mutation be asserted in tests and
    /// guards against a future caller wiring a transition incorrectly.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Initializing, Connecting)
                | (Connecting, Connected)
                | (Connecting, Authenticating)
                | (Connecting, ConnectionFailed)
                | (Authenticating, AuthPending)
                | (Authenticating, AuthFailed)
                | (AuthPending, Authenticating)
                | (AuthPending, AuthFailed)
                | (Connected, Connecting)
                | (Connected, ConnectionFailed)
                | (AuthFailed, Connecting)
                | (ConnectionFailed, Connecting)
        )
    }
}

/// A PKCE authorization attempt in flight: the verifier and state the
/// coordinator generated before redirecting the user, stored under
/// `pending:{context_id}:{server_name}` and reverse-indexed under
/// `state:{opaque_state}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub pkce_verifier: String,
    pub redirect_uri: String,
    pub server_name: String,
    pub context_id: String,
    /// The authorization server's base URL, so the callback handler can
    /// redeem the code against the same zone without re-deriving it from
    /// protected-resource metadata a second time.
    pub zone_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PendingAuthorization {
    pub fn is_expired(&self, ttl: chrono::Duration) -> bool {
        chrono::Utc::now() - self.created_at > ttl
    }
}

/// Per-(context_id, server_name) coordinator state.
#[derive(Debug, Clone)]
pub struct Session {
    pub context_id: String,
    pub server_name: String,
    pub status: SessionState,
    pub authorization_url_pending: Option<String>,
    pub registered_client_ref: Option<String>,
    pub current_token_ref: Option<TokenRecord>,
    pub last_error: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(context_id: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            server_name: server_name.into(),
            status: SessionState::Initializing,
            authorization_url_pending: None,
            registered_client_ref: None,
            current_token_ref: None,
            last_error: None,
            metadata: HashMap::new(),
        }
    }

    /// Move to `to`, clearing the pending-authorization fields whenever the
    /// destination is not `AUTH_PENDING`: `status = AUTH_PENDING` iff
    /// `authorization_url_pending` is present.
    pub fn transition(&mut self, to: SessionState) {
        debug_assert!(
            self.status.can_transition_to(to),
            "illegal session transition {:?} -> {:?}",
            self.status,
            to
        );
        if to != SessionState::AuthPending {
            self.authorization_url_pending = None;
        }
        self.status = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_predicates_match_spec_table() {
        assert!(SessionState::Connected.is_operational());
        assert!(!SessionState::AuthPending.is_operational());

        assert!(SessionState::AuthPending.requires_user_action());
        assert!(!SessionState::Connected.requires_user_action());

        assert!(SessionState::AuthFailed.is_failed());
        assert!(SessionState::ConnectionFailed.is_failed());
        assert!(!SessionState::Connected.is_failed());

        assert!(SessionState::AuthFailed.can_retry());
        assert!(!SessionState::Connected.can_retry());
    }

    #[test]
    fn full_happy_path_transition_sequence() {
        let mut session = Session::new("ctx1", "upstream");
        assert_eq!(session.status, SessionState::Initializing);

        session.transition(SessionState::Connecting);
        session.transition(SessionState::Authenticating);
        session.authorization_url_pending = Some("https://zone.example/authorize?...".into());
        session.transition(SessionState::AuthPending);
        assert!(session.status.requires_user_action());

        session.transition(SessionState::Authenticating);
        session.transition(SessionState::Connected);
        assert!(session.status.is_operational());
    }

    #[test]
    fn auth_pending_clears_when_leaving_that_state() {
        let mut session = Session::new("ctx1", "upstream");
        session.transition(SessionState::Connecting);
        session.transition(SessionState::Authenticating);
        session.authorization_url_pending = Some("https://zone.example/authorize".into());
        session.transition(SessionState::AuthPending);

        session.transition(SessionState::AuthFailed);
        assert!(session.authorization_url_pending.is_none());
    }

    #[test]
    fn failed_states_are_retriable_into_connecting() {
        let mut session = Session::new("ctx1", "upstream");
        session.status = SessionState::ConnectionFailed;
        assert!(session.status.can_retry());
        session.transition(SessionState::Connecting);
        assert_eq!(session.status, SessionState::Connecting);
    }
}
