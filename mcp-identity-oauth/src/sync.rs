//! Blocking wrapper over [`OAuthClient`].
//!
//! Synchronous and asynchronous call sites share one protocol definition.
//! Rather than duplicating request-building logic,
//! `BlockingOAuthClient` owns a dedicated current-thread runtime and blocks
//! it on the same async `OAuthClient` operations. This is the shape the
//! Local coordinator profile needs: it already blocks the calling thread
//! while it waits for the loopback callback, so there is no async context
//! to preserve across the call.

use crate::client::OAuthClient;
use crate::error::Result;
use crate::models::{ClientRegistrationRequest, IntrospectionResponse, ParResponse, RegisteredClient, ServerMetadata, TokenRecord, TokenRequest};
use crate::zone::Zone;
use std::collections::HashMap;

pub struct BlockingOAuthClient {
    inner: OAuthClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingOAuthClient {
    pub fn new(inner: OAuthClient) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { inner, runtime })
    }

    pub fn discover_metadata(&self, zone: &Zone) -> Result<ServerMetadata> {
        self.runtime.block_on(self.inner.discover_metadata(zone))
    }

    pub fn register_client(
        &self,
        zone: &Zone,
        request: ClientRegistrationRequest,
    ) -> Result<RegisteredClient> {
        self.runtime.block_on(self.inner.register_client(zone, request))
    }

    pub fn request_token(&self, zone: &Zone, request: TokenRequest) -> Result<TokenRecord> {
        self.runtime.block_on(self.inner.request_token(zone, request))
    }

    pub fn introspect(&self, zone: &Zone, token: &str) -> Result<IntrospectionResponse> {
        self.runtime.block_on(self.inner.introspect(zone, token))
    }

    pub fn revoke(&self, zone: &Zone, token: &str, hint: Option<&str>) -> Result<()> {
        self.runtime.block_on(self.inner.revoke(zone, token, hint))
    }

    pub fn par(&self, zone: &Zone, params: HashMap<String, String>) -> Result<ParResponse> {
        self.runtime.block_on(self.inner.par(zone, params))
    }
}
