//! HTTP API client with session token support.

use async_trait::async_trait;
use chatsync_shared::{try_error_detail, ApiError};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Header carrying the session token on every authenticated request.
pub const SESSION_HEADER: &str = "x-session-token";

/// The request function the cache consumes for `fetch` and REST mutations.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;
}

/// HTTP client for making authenticated API requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Configure the session token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, ApiError> {
        let token = self.token.as_ref().ok_or(ApiError::Unauthenticated)?;
        let url = self.url(path);

        tracing::debug!(%method, %url, "api request");

        let mut rb = self
            .client
            .request(method, &url)
            .header(SESSION_HEADER, token);

        if let Some(body) = body {
            rb = rb.body(body).header("Content-Type", "application/json");
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            let body = try_error_detail(&text).unwrap_or(text);
            return Err(ApiError::Http { status, body });
        }

        Ok(text)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestHandler for ApiClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let body_bytes = body
            .map(|body| serde_json::to_vec(&body))
            .transpose()
            .map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let text = self.send(method, path, body_bytes).await?;
        parse_body(&text)
    }
}

/// Empty bodies decode as `null`.
fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = if text.is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
}
