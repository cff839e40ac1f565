//! HTTP client for the remote ledger API.
//!
//! Replays are expressed as (method, path, body) triples so queued operations
//! can be sent exactly as they were recorded.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use ledgerline_core::records::Category;
use ledgerline_core::sync::{HttpMethod, CATEGORIES_RESOURCE, TRANSACTIONS_RESOURCE};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::types::{ApiErrorResponse, RemoteCategory, RemoteTransaction};

const MAX_LOG_BODY_CHARS: usize = 512;

/// Remote system of record for transactions.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Send one request. Returns the JSON body, or `None` for an empty 2xx.
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>>;

    async fn list_transactions(&self) -> Result<Vec<RemoteTransaction>>;

    async fn list_categories(&self) -> Result<Vec<Category>>;
}

/// Liveness check of the remote.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok` only on a 2xx within the probe timeout.
    async fn check_health(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    health_path: String,
    probe_timeout: Duration,
}

impl LedgerClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    pub fn new(config: &SyncConfig) -> Result<Self> {
        let base_url = config.api_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::invalid_request("Remote API URL is not configured"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
            health_path: config.health_path.clone(),
            probe_timeout: config.probe_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = self.access_token.as_deref() {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| SyncError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Parse a response body, mapping non-2xx statuses to `SyncError::Api`.
    async fn parse_response(response: reqwest::Response) -> Result<Option<Value>> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                let message = match error.code {
                    Some(code) => format!("{}: {}", code, error.message),
                    None => error.message,
                };
                return Err(SyncError::api(status.as_u16(), message));
            }
            return Err(SyncError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&body).map(Some).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            SyncError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self
            .execute(HttpMethod::Get, path, None)
            .await?
            .unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl RemoteLedger for LedgerClient {
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        debug!("[Remote] {} {}", method.as_str(), url);

        let mut request = self
            .client
            .request(Self::method(method), &url)
            .headers(self.headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// GET /api/transactions
    async fn list_transactions(&self) -> Result<Vec<RemoteTransaction>> {
        self.get_json(TRANSACTIONS_RESOURCE).await
    }

    /// GET /api/categories
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories: Vec<RemoteCategory> = self.get_json(CATEGORIES_RESOURCE).await?;
        Ok(categories.into_iter().map(Category::from).collect())
    }
}

#[async_trait]
impl HealthProbe for LedgerClient {
    async fn check_health(&self) -> Result<()> {
        let url = self.url(&self.health_path);
        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::api(
                status.as_u16(),
                format!("Health check failed with status {}", status),
            ))
        }
    }
}
