use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::repository::session_store::SessionStore;

/// Failures surfaced by the backend client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authorized{}", detail_suffix(.detail))]
    Unauthorized { detail: Option<String> },

    #[error("Not found{}", detail_suffix(.detail))]
    NotFound { detail: Option<String> },

    #[error("Request failed ({status}){}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },

    #[error("Could not reach the backend: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response for {context}: {source}")]
    Decode {
        context: String,
        source: serde_json::Error,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Shared HTTP plumbing for every backend repository.
///
/// Each request reads the bearer token from the session store at send
/// time, so a logout takes effect on the very next call.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<SessionStore>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        Self::decode(response, path).await
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute(self.request(method, path).json(body))
            .await?;
        Self::decode(response, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Sends the request and maps non-success statuses to `ApiError`.
    pub(crate) async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Backend response");

        if status.is_success() {
            return Ok(response);
        }

        let detail = Self::error_detail(response).await;
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized { detail },
            StatusCode::NOT_FOUND => ApiError::NotFound { detail },
            other => ApiError::Status {
                status: other.as_u16(),
                detail,
            },
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            context: context.to_string(),
            source,
        })
    }

    /// Prefers the `message` field of a JSON error body, falling back to the
    /// raw text.
    async fn error_detail(response: Response) -> Option<String> {
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let text = response.text().await.ok()?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if is_json {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
                    return Some(message.to_string());
                }
                return Some(value.to_string());
            }
        }

        Some(text.to_string())
    }
}
