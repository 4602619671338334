// Credential blob (browser cookies exported as a JSON array)
//
// Parsed once at startup and shared read-only between requests. Strategies
// that need it receive an `Arc<Credentials>` inside their BackendConfig.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Cookie blob is not a JSON array of cookies: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Cookie blob contains no usable cookies")]
    Empty,
}

#[derive(Clone, Deserialize)]
struct Cookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
}

impl Cookie {
    fn applies_to_youtube(&self) -> bool {
        match self.domain.as_deref() {
            None => true,
            Some(domain) => {
                let domain = domain.trim_start_matches('.');
                domain.ends_with("youtube.com") || domain.ends_with("google.com")
            }
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    cookies: Vec<Cookie>,
}

impl Credentials {
    /// Parse the exported JSON array (`[{"name": .., "value": .., "domain": ..}, ..]`)
    pub fn from_json(blob: &str) -> Result<Self, CredentialsError> {
        let cookies: Vec<Cookie> = serde_json::from_str(blob)?;
        let cookies: Vec<Cookie> = cookies
            .into_iter()
            .filter(|c| !c.name.is_empty() && c.applies_to_youtube())
            .collect();

        if cookies.is_empty() {
            return Err(CredentialsError::Empty);
        }

        Ok(Self { cookies })
    }

    /// Load from the optional environment blob. Invalid blobs are logged and
    /// dropped so the catalog falls back to uncredentialed strategies.
    pub fn load(blob: Option<&str>) -> Option<Arc<Self>> {
        let blob = blob.map(str::trim).filter(|b| !b.is_empty());
        let Some(blob) = blob else {
            info!("No cookie blob configured; using uncredentialed strategies only (cookies avoid most 403s)");
            return None;
        };

        match Self::from_json(blob) {
            Ok(credentials) => {
                info!(cookies = credentials.len(), "Loaded cookie credentials");
                Some(Arc::new(credentials))
            }
            Err(e) => {
                warn!("Ignoring cookie blob: {}", e);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for a `Cookie:` request header
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// `Authorization` header value for InnerTube requests made with a logged-in session
    pub fn sapisid_authorization(&self, origin: &str, unix_secs: u64) -> Option<String> {
        let sapisid = self
            .cookie("SAPISID")
            .or_else(|| self.cookie("__Secure-3PAPISID"))?;

        let digest = Sha1::digest(format!("{} {} {}", unix_secs, sapisid, origin).as_bytes());
        Some(format!("SAPISIDHASH {}_{}", unix_secs, hex::encode(digest)))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|c| c.name.as_str()).collect();
        f.debug_struct("Credentials")
            .field("cookies", &names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOB: &str = r#"[
        {"name": "SAPISID", "value": "abcSAPISID", "domain": ".youtube.com"},
        {"name": "LOGIN_INFO", "value": "xyz", "domain": ".youtube.com"},
        {"name": "tracker", "value": "nope", "domain": ".example.com"}
    ]"#;

    #[test]
    fn test_parses_and_filters_foreign_domains() {
        let credentials = Credentials::from_json(BLOB).unwrap();
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials.cookie_header(), "SAPISID=abcSAPISID; LOGIN_INFO=xyz");
    }

    #[test]
    fn test_invalid_blobs_are_rejected() {
        assert!(matches!(
            Credentials::from_json("not json"),
            Err(CredentialsError::Malformed(_))
        ));
        assert!(matches!(
            Credentials::from_json("[]"),
            Err(CredentialsError::Empty)
        ));
        assert!(Credentials::load(Some("{broken")).is_none());
        assert!(Credentials::load(Some("   ")).is_none());
        assert!(Credentials::load(None).is_none());
        assert!(Credentials::load(Some(BLOB)).is_some());
    }

    #[test]
    fn test_sapisid_authorization() {
        let credentials = Credentials::from_json(BLOB).unwrap();
        let header = credentials
            .sapisid_authorization("https://www.youtube.com", 1_700_000_000)
            .unwrap();
        assert_eq!(
            header,
            "SAPISIDHASH 1700000000_b4d59c573190b5106be035dd4b3e304f7edd9c46"
        );
    }

    #[test]
    fn test_debug_hides_values() {
        let credentials = Credentials::from_json(BLOB).unwrap();
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("SAPISID"));
        assert!(!debug.contains("abcSAPISID"));
    }
}
