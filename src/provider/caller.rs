//! The authenticated HTTP caller seam.
//!
//! The sync core never acquires or refreshes credentials; it receives an
//! already-usable caller behind this trait. Production wires in
//! [`BearerCaller`] over `reqwest`; tests substitute scripted callers that
//! replay canned responses.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Maximum number of body bytes echoed into error messages.
const BODY_SNIPPET_LIMIT: usize = 200;

/// A raw provider response: status, lower-cased headers, and body bytes.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers with lower-cased names
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Bytes,
}

impl ProviderResponse {
    /// Build a response from parts; header names are lower-cased.
    pub fn new(status: u16, headers: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// The server-signalled retry hint in whole seconds, if present.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after").and_then(|v| v.trim().parse().ok())
    }

    /// A bounded, lossy rendering of the body for diagnostics.
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        if text.chars().count() > BODY_SNIPPET_LIMIT {
            let truncated: String = text.chars().take(BODY_SNIPPET_LIMIT).collect();
            format!("{}...", truncated)
        } else {
            text.into_owned()
        }
    }
}

/// An HTTP GET caller that already carries authentication.
#[async_trait]
pub trait AuthenticatedCaller: Send + Sync {
    /// Perform an authenticated GET and return the raw response.
    /// Transport-level failures surface as [`SyncError::Transport`].
    async fn get(&self, url: &str) -> Result<ProviderResponse>;
}

/// Production caller: a `reqwest` client plus a bearer token.
pub struct BearerCaller {
    client: reqwest::Client,
    access_token: String,
}

impl BearerCaller {
    /// Request timeout applied to every call.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Wrap a client and token into an authenticated caller.
    pub fn new(client: reqwest::Client, access_token: String) -> Self {
        Self {
            client,
            access_token,
        }
    }
}

#[async_trait]
impl AuthenticatedCaller for BearerCaller {
    async fn get(&self, url: &str) -> Result<ProviderResponse> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(Self::REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(ProviderResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "7".to_string());
        let response = ProviderResponse::new(429, headers, Bytes::new());
        assert_eq!(response.retry_after_secs(), Some(7));
    }

    #[test]
    fn retry_after_absent_or_malformed() {
        let response = ProviderResponse::new(429, HashMap::new(), Bytes::new());
        assert_eq!(response.retry_after_secs(), None);

        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "soon".to_string());
        let response = ProviderResponse::new(429, headers, Bytes::new());
        assert_eq!(response.retry_after_secs(), None);
    }

    #[test]
    fn body_snippet_is_bounded() {
        let body = "x".repeat(500);
        let response = ProviderResponse::new(500, HashMap::new(), body);
        let snippet = response.body_snippet();
        assert!(snippet.len() <= BODY_SNIPPET_LIMIT + 3);
        assert!(snippet.ends_with("..."));
    }
}
