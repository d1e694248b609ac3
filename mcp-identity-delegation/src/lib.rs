//! Delegation Provider: the resource-server half of the SDK.
//!
//! Authenticates incoming MCP tool calls against a configured zone's
//! tokens and performs on-demand RFC 8693 token exchange for
//! `grant`/`grant_multi`-declared downstream resources, composing the
//! whole into one protected HTTP application.

pub mod access_context;
pub mod challenge;
pub mod error;
pub mod grant;
pub mod metadata_routes;
pub mod middleware;
pub mod provider;

pub use access_context::{AccessContext, FailureReason, ResourceAccess};
pub use challenge::{ChallengeReason, UnauthorizedChallenge};
pub use error::{DelegationError, Result};
pub use grant::{GrantResolver, GrantSpec};
pub use middleware::{bearer_auth, AuthenticatedRequest};
pub use provider::DelegationProvider;
