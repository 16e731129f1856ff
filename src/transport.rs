//! HTTP transport and response classification
//!
//! All network traffic goes through the [`Transport`] trait, which maps every
//! outcome to the client's error taxonomy exactly once. Layers above never
//! see a raw `reqwest` error or an unclassified status code.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::{ClientConfig, ConfigError};
use crate::error::ApiError;

/// Roblox API surfaces the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Users,
    Thumbnails,
    Friends,
}

impl Endpoint {
    /// Production host for this endpoint.
    pub fn host(&self) -> &'static str {
        match self {
            Endpoint::Users => "https://users.roblox.com",
            Endpoint::Thumbnails => "https://thumbnails.roblox.com",
            Endpoint::Friends => "https://friends.roblox.com",
        }
    }
}

/// Abstraction over the HTTP layer.
///
/// Implementations return already-classified errors, so callers only deal
/// with [`ApiError`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request and return the decoded JSON body.
    async fn get(&self, endpoint: Endpoint, path: &str, query: &[(&str, String)])
        -> Result<Value, ApiError>;

    /// Issue a POST request with a JSON body and return the decoded response.
    async fn post(&self, endpoint: Endpoint, path: &str, body: Value) -> Result<Value, ApiError>;
}

/// Production transport backed by `reqwest`.
pub struct HttpTransport {
    client: ReqwestClient,
    base_override: Option<String>,
}

impl HttpTransport {
    /// Build a transport from the client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| ConfigError::Invalid(format!("failed to build http client: {err}")))?;

        Ok(Self { client, base_override: config.base_url.clone() })
    }

    fn url(&self, endpoint: Endpoint, path: &str) -> String {
        let base = self.base_override.as_deref().unwrap_or_else(|| endpoint.host());
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn classify(response: Response, path: &str) -> Result<Value, ApiError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(std::time::Duration::from_secs);
            return Err(ApiError::RateLimited { retry_after });
        }

        if status == StatusCode::NOT_FOUND && path.contains("/users/") {
            return Err(ApiError::NotFound(format!("no resource at {path}")));
        }

        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ApiError::Api { status: status.as_u16(), message });
        }

        // A 2xx body that is not valid JSON means the response was cut
        // short or mangled in transit, so treat it as a network fault.
        response
            .json::<Value>()
            .await
            .map_err(|err| ApiError::Network(format!("invalid response body: {err}")))
    }

    /// Best-effort extraction of the API's own error message. Roblox wraps
    /// errors as `{"errors": [{"message": "..."}]}`.
    async fn error_message(response: Response) -> String {
        let fallback = "request failed".to_string();
        let Ok(body) = response.text().await else {
            return fallback;
        };
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("errors")?
                    .get(0)?
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| if body.is_empty() { fallback } else { body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint, path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(classify_transport_error)?;
        Self::classify(response, path).await
    }

    async fn post(&self, endpoint: Endpoint, path: &str, body: Value) -> Result<Value, ApiError> {
        let url = self.url(endpoint, path);
        debug!(%url, "POST");
        let response =
            self.client.post(&url).json(&body).send().await.map_err(classify_transport_error)?;
        Self::classify(response, path).await
    }
}

/// Connection faults and timeouts are transient by definition.
fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Network(format!("request timed out: {err}"))
    } else {
        ApiError::Network(format!("connection error: {err}"))
    }
}
