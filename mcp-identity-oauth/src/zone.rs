//! Zone addressing.
//!
//! A zone is a logical authorization-server tenant, addressed either by a
//! short zone ID combined with a base domain, or by an explicit URL.
//! Ownership is fixed once a server entry or provider is configured with
//! one; nothing in this crate mutates a `Zone` after construction.

use crate::error::{OAuthError, Result};
use url::Url;

/// A logical authorization-server tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone {
    /// Canonical base URL used as the cache/storage key for this zone.
    url: Url,
}

impl Zone {
    /// Address a zone by explicit base URL.
    pub fn from_url(url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| OAuthError::config(format!("invalid zone URL: {e}")))?;
        Ok(Self { url })
    }

    /// Address a zone by short ID, resolved against a base domain
    /// (e.g. zone_id=`acme`, base_domain=`zones.example.com` yields
    /// `https://acme.zones.example.com/`).
    pub fn from_id(zone_id: impl AsRef<str>, base_domain: impl AsRef<str>) -> Result<Self> {
        let zone_id = zone_id.as_ref();
        let base_domain = base_domain.as_ref();
        if zone_id.is_empty() || base_domain.is_empty() {
            return Err(OAuthError::config("zone_id and base_domain must be non-empty"));
        }
        let composed = format!("https://{zone_id}.{base_domain}/");
        Self::from_url(composed)
    }

    /// The zone's canonical base URL.
    pub fn base_url(&self) -> &Url {
        &self.url
    }

    /// Stable string key for this zone, used by registration/JWKS caches.
    pub fn key(&self) -> String {
        self.url.to_string()
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_id_composes_url() {
        let zone = Zone::from_id("acme", "zones.example.com").unwrap();
        assert_eq!(zone.base_url().as_str(), "https://acme.zones.example.com/");
    }

    #[test]
    fn from_url_rejects_garbage() {
        assert!(Zone::from_url("not a url").is_err());
    }

    #[test]
    fn key_is_stable_for_equal_zones() {
        let a = Zone::from_url("https://zone.example/").unwrap();
        let b = Zone::from_url("https://zone.example/").unwrap();
        assert_eq!(a.key(), b.key());
    }
}
