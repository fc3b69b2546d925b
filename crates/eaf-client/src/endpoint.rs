//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "WebSocket endpoint derivation from the hosting page URL."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::fmt;

use url::Url;

use crate::ClientError;

/// WebSocket URL the client connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Derive the stream endpoint from the page URL: `https` pages use `wss`,
    /// `http` pages use `ws`. Host and port are kept, the path is replaced.
    pub fn from_page(page_url: &str, path: &str) -> Result<Self, ClientError> {
        let mut url = Url::parse(page_url)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(ClientError::UnsupportedScheme(other.to_owned())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::UnsupportedScheme(url.scheme().to_owned()))?;
        url.set_path(path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_page_uses_secure_transport() {
        let endpoint = Endpoint::from_page("https://demo.example.com/heats/42?tab=ops", "/ws").unwrap();
        assert_eq!(endpoint.as_str(), "wss://demo.example.com/ws");
        assert!(endpoint.is_secure());
    }

    #[test]
    fn plain_page_keeps_port() {
        let endpoint = Endpoint::from_page("http://127.0.0.1:8090/", "/ws").unwrap();
        assert_eq!(endpoint.to_string(), "ws://127.0.0.1:8090/ws");
        assert!(!endpoint.is_secure());
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(matches!(
            Endpoint::from_page("ftp://example.com/", "/ws"),
            Err(ClientError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
        assert!(matches!(
            Endpoint::from_page("not a url", "/ws"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
