//! # Polling Fallback — snapshot acquisition over plain HTTP
//!
//! Fixed-interval pull of the aggregate snapshot endpoint, used when the
//! push channel is disabled or permanently failed. The response body is the
//! same envelope shape the push channel delivers, so the result flows
//! through the one parse-and-route path — no duplicated aggregation logic.

use crate::error::{StreamError, StreamResult};
use crate::types::{parse_frame, Inbound};
use std::time::Duration;
use tracing::debug;

pub struct SnapshotPoller {
    http: reqwest::Client,
    endpoint: String,
}

impl SnapshotPoller {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("argus-stream/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the current aggregate snapshot. A failed fetch is reported and
    /// leaves no trace in any buffer — the caller retries on the next tick.
    pub async fn fetch(&self) -> StreamResult<Inbound> {
        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| StreamError::PollFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StreamError::PollFetch(format!(
                "snapshot endpoint returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StreamError::PollFetch(e.to_string()))?;

        debug!(bytes = body.len(), "snapshot fetched");
        parse_frame(&body)
    }
}
