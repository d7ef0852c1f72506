//! Shared HTTP client with retry

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use voicebot_config::ServicesConfig;

use crate::ServiceError;

/// Delay before the first retry; doubles on each further attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Authenticated client for one API base URL
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(config: &ServicesConfig) -> Result<Self, ServiceError> {
        if config.api_key.is_empty() {
            return Err(ServiceError::Configuration(
                "services.api_key not set. Set it via config or OPENAI_API_KEY.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ServiceError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated POST to `path`
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.api_key)
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// The request is rebuilt for every attempt. Only the connection and the
    /// response status are covered; reading the body is up to the caller.
    pub async fn send<F>(&self, build: F) -> Result<Response, ServiceError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(ServiceError::from(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        "Request failed, retrying in {:?} (attempt {}/{})",
                        backoff,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Turn a non-success response into `ServiceError::Api`
async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Extract `error.message` from an API error body, falling back to the raw text
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}
