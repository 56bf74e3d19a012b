//! HTTP transport backed by reqwest

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::core::{CallError, CraneError, Result};
use crate::llm::traits::{ProviderRequest, ProviderResponse, Transport};

/// reqwest-based [`Transport`]
///
/// Carries no overall request timeout; the agent bounds each attempt.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the default connect timeout
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    /// Create a transport with a custom connect timeout
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(CraneError::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderResponse, CallError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                CallError::Network(format!("cannot connect to {}: {}", request.url, e))
            } else {
                CallError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CallError::Network(format!("failed to read body: {}", e)))?;

        debug!(url = %request.url, status, bytes = body.len(), "provider response");

        Ok(ProviderResponse { status, body })
    }
}
