//! Token verifier and metadata layer.
//!
//! Validates inbound JWT bearer tokens against a cached JWKS document, and
//! publishes RFC 9728 protected-resource metadata plus a mirror of the
//! upstream zone's RFC 8414 authorization-server metadata.

pub mod error;
pub mod jwks;
pub mod metadata;
pub mod validate;

pub use error::{Result, VerifierError};
pub use jwks::JwksCache;
pub use metadata::{AuthorizationServerMirror, ProtectedResourcePublisher};
pub use validate::{AudienceClaim, TokenVerifier, VerifiedClaims, VerifierConfig};
