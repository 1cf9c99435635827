//! JSON-over-HTTP client shared by the search and language-model services.
//!
//! Every request carries the `api-key` header and the `api-version` query
//! parameter. Transient failures are retried with exponential backoff:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ServiceClient {
    service: &'static str,
    base_url: String,
    api_key: String,
    api_version: String,
    max_retries: u32,
    backoff_base: Duration,
    client: reqwest::Client,
}

/// A successful response: status plus parsed body (`Null` when empty).
#[derive(Debug)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ServiceClient {
    pub fn new(
        service: &'static str,
        base_url: &str,
        api_key: &str,
        api_version: &str,
        http: &HttpConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;
        Ok(Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
            max_retries: http.max_retries,
            backoff_base: Duration::from_secs(1),
            client,
        })
    }

    /// Override the first backoff step (later steps double it).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<ServiceResponse> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ServiceResponse> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<ServiceResponse> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ServiceResponse> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<ServiceResponse> {
        let url = self.url(path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_base * (1u32 << (attempt - 1).min(5));
                tracing::warn!(
                    service = self.service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .request(method.clone(), &url)
                .query(&[("api-version", self.api_version.as_str())])
                .header("api-key", &self.api_key);
            if let Some(b) = body {
                req = req.json(b);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(service = self.service, error = %e, "request failed");
                    last_err = Some(Error::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response.text().await?;
                let body = if text.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&text).map_err(|e| {
                        Error::invalid_response(self.service, format!("invalid JSON: {}", e))
                    })?
                };
                return Ok(ServiceResponse { status, body });
            }

            let body_text = response.text().await.unwrap_or_default();
            let err = Error::Service {
                service: self.service,
                status: status.as_u16(),
                body: body_text,
            };

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err.unwrap_or_else(|| {
            Error::invalid_response(self.service, "request failed after retries")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ServiceClient {
        ServiceClient::new("search", base, "k", "2024-07-01", &HttpConfig::default()).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let c = client("https://svc.example.net/");
        assert_eq!(c.url("/indexes/a"), "https://svc.example.net/indexes/a");
        assert_eq!(c.url("indexes"), "https://svc.example.net/indexes");
    }
}
