//! OAuth 2.0/2.1 client layer for the MCP identity delegation SDK.
//!
//! Implements RFC 8693 token exchange, RFC 7591 dynamic client
//! registration, RFC 8414 discovery, RFC 7636 PKCE, RFC 7662 introspection,
//! RFC 7009 revocation, and RFC 9126 PAR as stateless request builders and
//! HTTP callers. This crate does not implement an authorization server: it
//! only ever speaks to one.

pub mod auth_strategy;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod pkce;
pub mod retry;
pub mod sync;
pub mod transport;
pub mod zone;

pub use auth_strategy::AuthStrategy;
pub use client::{OAuthClient, OAuthClientConfig};
pub use endpoints::{Endpoint, EndpointResolver};
pub use error::{OAuthError, ProtocolErrorBody, Result};
pub use models::{
    ClientRegistrationRequest, GrantType, IntrospectionResponse, ParResponse,
    ProtectedResourceMetadata, RegisteredClient, ServerMetadata, TokenRecord, TokenRequest,
    TokenResponseBody,
};
pub use pkce::PkcePair;
pub use retry::RetryPolicy;
pub use sync::BlockingOAuthClient;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use zone::Zone;
