//! Client authentication strategies applied to outbound OAuth requests.
//!
//! A strategy only ever mutates outbound headers/form fields; it never
//! reads response bodies. Picking a strategy whose zone has no configured
//! credentials is a `ConfigError`, caught before any network call.

use crate::error::{OAuthError, Result};
use crate::zone::Zone;
use std::collections::HashMap;

/// Client authentication applied when calling an authorization server.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    /// No client authentication (public client).
    None,
    /// RFC 6749 HTTP Basic with a single client id/secret pair.
    Basic { client_id: String, client_secret: String },
    /// Bearer-token authentication (e.g. for introspection/revocation
    /// performed with a service-level token rather than client credentials).
    Bearer { token: String },
    /// HTTP Basic, but the credentials are looked up per zone — used by a
    /// provider or coordinator that talks to many authorization servers
    /// with distinct registered client records.
    PerZoneBasic { credentials: HashMap<String, (String, String)> },
}

/// Header/body fragments a strategy contributes to a request.
#[derive(Debug, Default, Clone)]
pub struct AuthApplication {
    pub basic_auth: Option<(String, String)>,
    pub bearer_header: Option<String>,
}

impl AuthStrategy {
    /// Resolve what this strategy contributes for a call against `zone`.
    /// Returns a `ConfigError` if the strategy cannot authenticate for
    /// that zone at all (e.g. `PerZoneBasic` with no entry for it).
    pub fn resolve(&self, zone: &Zone) -> Result<AuthApplication> {
        match self {
            AuthStrategy::None => Ok(AuthApplication::default()),
            AuthStrategy::Basic { client_id, client_secret } => Ok(AuthApplication {
                basic_auth: Some((client_id.clone(), client_secret.clone())),
                bearer_header: None,
            }),
            AuthStrategy::Bearer { token } => Ok(AuthApplication {
                basic_auth: None,
                bearer_header: Some(token.clone()),
            }),
            AuthStrategy::PerZoneBasic { credentials } => {
                let (id, secret) = credentials.get(&zone.key()).ok_or_else(|| {
                    OAuthError::config(format!(
                        "no client credentials configured for zone {}",
                        zone.key()
                    ))
                })?;
                Ok(AuthApplication {
                    basic_auth: Some((id.clone(), secret.clone())),
                    bearer_header: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(u: &str) -> Zone {
        Zone::from_url(u).unwrap()
    }

    #[test]
    fn none_contributes_nothing() {
        let app = AuthStrategy::None.resolve(&zone("https://z.example/")).unwrap();
        assert!(app.basic_auth.is_none());
        assert!(app.bearer_header.is_none());
    }

    #[test]
    fn basic_always_applies_regardless_of_zone() {
        let strat = AuthStrategy::Basic {
            client_id: "c1".into(),
            client_secret: "s1".into(),
        };
        let app = strat.resolve(&zone("https://any.example/")).unwrap();
        assert_eq!(app.basic_auth, Some(("c1".into(), "s1".into())));
    }

    #[test]
    fn per_zone_basic_requires_configured_zone() {
        let mut map = HashMap::new();
        map.insert("https://known.example/".to_string(), ("c".to_string(), "s".to_string()));
        let strat = AuthStrategy::PerZoneBasic { credentials: map };

        assert!(strat.resolve(&zone("https://known.example/")).is_ok());
        let err = strat.resolve(&zone("https://unknown.example/"));
        assert!(err.is_err());
        assert!(!err.unwrap_err().is_retriable());
    }
}
