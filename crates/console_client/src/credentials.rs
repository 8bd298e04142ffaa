//! Credential fetching for console connections.
//!
//! The management API hands out a short-lived grant per connection attempt: a
//! websocket URL plus a token. Grants are consumable, so nothing here caches.
//! Every call to [`CredentialFetcher::fetch`] performs exactly one request.

use crate::error::CredentialError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// An auth token for one streaming connection attempt.
///
/// The value is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// A single streaming grant.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// `ws://` or `wss://` URL of the console socket
    pub endpoint_url: String,
    pub token: SecretToken,
}

/// Obtains a fresh grant for a server.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch(&self, server_id: &str) -> Result<Credentials, CredentialError>;
}

/// Which API shape the fetcher talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// The dashboard backend: `GET /api/servers/{id}/console` -> `{"socket", "token"}`
    #[default]
    Dashboard,
    /// The panel client API: `GET /api/client/servers/{id}/websocket` -> `{"data": {"socket", "token"}}`
    Panel,
}

impl ApiFlavor {
    fn path_segments<'a>(&self, server_id: &'a str) -> Vec<&'a str> {
        match self {
            ApiFlavor::Dashboard => vec!["api", "servers", server_id, "console"],
            ApiFlavor::Panel => vec!["api", "client", "servers", server_id, "websocket"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    #[serde(default, alias = "endpointUrl")]
    socket: Option<String>,
    #[serde(default, alias = "authToken")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PanelEnvelope {
    #[serde(default)]
    data: Option<GrantBody>,
}

/// Parse a credential response body.
pub fn parse_credentials(body: &str, flavor: ApiFlavor) -> Result<Credentials, CredentialError> {
    let grant = match flavor {
        ApiFlavor::Dashboard => serde_json::from_str::<GrantBody>(body)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?,
        ApiFlavor::Panel => serde_json::from_str::<PanelEnvelope>(body)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?
            .data
            .ok_or(CredentialError::MissingField("data"))?,
    };

    let endpoint_url = grant
        .socket
        .filter(|s| !s.is_empty())
        .ok_or(CredentialError::MissingField("socket"))?;
    let token = grant
        .token
        .filter(|t| !t.is_empty())
        .ok_or(CredentialError::MissingField("token"))?;

    let parsed = Url::parse(&endpoint_url)
        .map_err(|e| CredentialError::Malformed(format!("endpoint {endpoint_url}: {e}")))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(CredentialError::Malformed(format!(
            "endpoint {endpoint_url} is not a websocket URL"
        )));
    }

    Ok(Credentials {
        endpoint_url,
        token: SecretToken::new(token),
    })
}

/// Fetches grants over HTTP from the dashboard or the panel API.
pub struct HttpCredentialFetcher {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    flavor: ApiFlavor,
}

impl HttpCredentialFetcher {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        flavor: ApiFlavor,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CredentialError::Malformed(format!("base url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CredentialError::Malformed(format!("base url {base_url} cannot hold a path")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            flavor,
        })
    }

    /// URL of the grant endpoint for `server_id`. The id is percent-encoded as one path segment.
    pub fn grant_url(&self, server_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(self.flavor.path_segments(server_id));
        }
        url
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch(&self, server_id: &str) -> Result<Credentials, CredentialError> {
        let url = self.grant_url(server_id);
        debug!(server_id, %url, "Requesting console grant");

        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(CredentialError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_credentials(&body, self.flavor)
    }
}
