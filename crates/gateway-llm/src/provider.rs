use crate::protocol::gemini::GeminiRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Upstream credentials are not configured")]
    Unconfigured,
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Raw response body chunks, with boundaries chosen by the transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Whether credentials are present. Calls without them are never attempted.
    fn is_configured(&self) -> bool;

    /// Start a streamed generation and return the body once headers arrive.
    ///
    /// Non-2xx responses are errors; the body stream itself may still fail
    /// part-way with [`UpstreamError::Stream`] or [`UpstreamError::Http`].
    async fn stream_generate(&self, request: &GeminiRequest) -> Result<ByteStream>;
}
