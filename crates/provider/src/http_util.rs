//! Shared HTTP plumbing for the upstream client.

use crate::classify::classify;
use copilink_types::{
    CopilinkError,
    traits::{ByteStream, Result},
};
use futures_util::StreamExt as _;
use rquest::{Client, RequestBuilder};

/// Sends requests and turns non-success responses into classified errors.
#[derive(Clone)]
pub struct ProviderHttp {
    http: Client,
}

impl ProviderHttp {
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Returns a reference to the inner HTTP client for building requests.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.http
    }

    /// Sends a request and checks for success status.
    ///
    /// # Errors
    ///
    /// Returns [`CopilinkError::Upstream`] carrying the classified failure on
    /// non-success status codes, or a transport error if the request fails
    /// to send.
    pub async fn send(&self, builder: RequestBuilder) -> Result<rquest::Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let headers = resp.headers().clone();
        let text = resp.text().await.unwrap_or_default();
        let err = classify(status.as_u16(), &text, &headers);
        tracing::warn!(
            status = err.status_code,
            category = %err.category,
            request_id = err.request_id.as_deref().unwrap_or("-"),
            "upstream request failed"
        );
        Err(err.into())
    }

    /// Converts an `rquest::Response` into a `ByteStream`.
    #[must_use]
    pub fn byte_stream(resp: rquest::Response) -> ByteStream {
        Box::pin(resp.bytes_stream().map(|r| r.map_err(CopilinkError::from)))
    }
}
