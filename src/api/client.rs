use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ApiError;
use super::normalize::{normalize_list, Page};
use crate::config::SyncConfig;
use crate::session::SessionStore;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// REST client for the dashboard API.
///
/// Every request carries `Authorization: Bearer <token>` when the session
/// holds a token. POST bodies are form-encoded unless `post_json` is used.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: Arc<SyncConfig>,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(config: &SyncConfig, session: SessionStore) -> Result<Self, ApiError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: Arc::new(config.clone()),
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let url = self.config.api_url(path)?;
        debug!("GET {url}");
        let response = self
            .authorize(self.client.get(&url).query(query))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let url = self.config.api_url(path)?;
        debug!("POST {url} (form)");
        let response = self
            .authorize(self.client.post(&url))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_form(fields))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.config.api_url(path)?;
        debug!("POST {url} (json)");
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Fetch one page of a list endpoint and normalize its shape.
    pub async fn fetch_list(
        &self,
        path: &str,
        params: &[(String, String)],
        offset: usize,
        page_size: usize,
    ) -> Result<Page<Value>, ApiError> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| key != "offset" && key != "page_size")
            .cloned()
            .collect();
        query.push(("offset".to_string(), offset.to_string()));
        query.push(("page_size".to_string(), page_size.to_string()));

        let payload = self.get_json(path, &query).await?;
        normalize_list(&payload)
    }
}

fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized(truncate(&body)));
    }
    if !status.is_success() {
        warn!("API returned status {}", status.as_u16());
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: truncate(&body),
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| ApiError::InvalidResponse(format!("failed to parse response JSON: {e}")))
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push('…');
    cut
}
