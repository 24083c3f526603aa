//! Google Gemini upstream.

mod reframe;

pub use reframe::{FrameSummary, FramingMode, Fragment, StreamReframer};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

use crate::health::HealthProbe;
use crate::protocol::gemini::GeminiRequest;
use crate::provider::{ByteStream, Result, UpstreamError, UpstreamProvider};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    /// Create a provider. An empty or missing key leaves it unconfigured.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Set a custom base URL (e.g., for proxies or alternative endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(UpstreamError::Unconfigured)
    }

    fn stream_url(&self, api_key: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?key={}",
            self.base_url, self.model, api_key
        )
    }

    fn model_url(&self, api_key: &str) -> String {
        format!("{}/models/{}?key={}", self.base_url, self.model, api_key)
    }
}

#[async_trait]
impl UpstreamProvider for GeminiProvider {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn stream_generate(&self, request: &GeminiRequest) -> Result<ByteStream> {
        let api_key = self.api_key()?;

        log::debug!(
            "Gemini request to model '{}' with {} content(s)",
            self.model,
            request.contents.len()
        );

        let response = self
            .client
            .post(self.stream_url(api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(UpstreamError::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        log::debug!("Gemini stream started successfully");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(UpstreamError::Http));
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl HealthProbe for GeminiProvider {
    async fn probe(&self) -> Result<u16> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(self.model_url(api_key))
            .send()
            .await
            .map_err(UpstreamError::Http)?;
        Ok(response.status().as_u16())
    }
}
