//! MCP-client Auth Coordinator.
//!
//! Drives the PKCE authorization-code flow against an upstream MCP
//! server's authorization server, owns the per-(context, server) session
//! state machine, persists registered clients and tokens through a
//! pluggable `StorageBackend`, and supports both a blocking Local profile
//! (loopback listener + system browser) and a non-blocking Remote profile
//! (authorization URLs handed back to the caller, completed through an
//! endpoint the embedding application wires up itself).

pub mod client_manager;
pub mod coordinator;
pub mod error;
pub mod local;
pub mod pkce_flow;
pub mod registration_cache;
pub mod remote;
pub mod session;
pub mod storage;

pub use client_manager::ClientManager;
pub use coordinator::{AuthCoordinator, CoordinatorConfig, CoordinatorProfile, ServerConfig};
pub use error::{CoordinatorError, Result};
pub use local::{CallbackResult, LocalProfileConfig};
pub use pkce_flow::{build_authorization_attempt, AuthorizationAttempt};
pub use registration_cache::RegistrationCache;
pub use remote::{AuthChallenge, CompletionBus, CompletionEvent, CompletionSubscriber};
pub use session::{PendingAuthorization, Session, SessionState};
pub use storage::{client_key, pending_key, state_key, token_key, InMemoryStorage, StorageBackend};
