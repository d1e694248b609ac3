//! Publishing RFC 9728 protected-resource metadata and mirroring the
//! upstream zone's RFC 8414 authorization-server metadata.
//!
//! When multiple protected paths coexist on one host, each gets its own
//! protected-resource document at `/.well-known/oauth-protected-resource/<path>`
//! per RFC 9728 §3.3.

use mcp_identity_oauth::{ProtectedResourceMetadata, ServerMetadata};

/// Builds the protected-resource metadata document for one protected path.
#[derive(Clone)]
pub struct ProtectedResourcePublisher {
    pub resource_base_url: String,
    pub authorization_servers: Vec<String>,
    pub jwks_uri: Option<String>,
}

impl ProtectedResourcePublisher {
    pub fn new(resource_base_url: impl Into<String>, authorization_servers: Vec<String>) -> Self {
        Self {
            resource_base_url: resource_base_url.into(),
            authorization_servers,
            jwks_uri: None,
        }
    }

    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    /// Build the document for a specific mounted path, e.g. `mcp`, yielding
    /// a `resource` of `{resource_base_url}/{path}`.
    pub fn document_for_path(&self, path: Option<&str>) -> ProtectedResourceMetadata {
        let resource = match path {
            Some(p) if !p.is_empty() => format!("{}/{p}", self.resource_base_url.trim_end_matches('/')),
            _ => self.resource_base_url.clone(),
        };
        ProtectedResourceMetadata {
            resource,
            authorization_servers: self.authorization_servers.clone(),
            jwks_uri: self.jwks_uri.clone(),
            bearer_methods_supported: vec!["header".to_string()],
        }
    }

    /// The well-known URL path this document should be mounted at.
    pub fn well_known_path(path: Option<&str>) -> String {
        match path {
            Some(p) if !p.is_empty() => format!("/.well-known/oauth-protected-resource/{p}"),
            _ => "/.well-known/oauth-protected-resource".to_string(),
        }
    }
}

/// Mirrors an upstream zone's RFC 8414 document verbatim, re-fetched
/// through the same discovery cache the OAuth client layer uses.
pub struct AuthorizationServerMirror {
    metadata: ServerMetadata,
}

impl AuthorizationServerMirror {
    pub fn new(metadata: ServerMetadata) -> Self {
        Self { metadata }
    }

    pub fn document(&self) -> &ServerMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_protected_path_gets_its_own_document() {
        let publisher = ProtectedResourcePublisher::new(
            "http://srv:8000",
            vec!["https://zone.example/".to_string()],
        );

        let doc = publisher.document_for_path(Some("mcp"));
        assert_eq!(doc.resource, "http://srv:8000/mcp");
        assert_eq!(
            ProtectedResourcePublisher::well_known_path(Some("mcp")),
            "/.well-known/oauth-protected-resource/mcp"
        );

        let root_doc = publisher.document_for_path(None);
        assert_eq!(root_doc.resource, "http://srv:8000");
        assert_eq!(
            ProtectedResourcePublisher::well_known_path(None),
            "/.well-known/oauth-protected-resource"
        );
    }
}
