// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Destinations for event payloads.

use std::time::Duration;

use async_trait::async_trait;
use nova_analytics_core::{SinkPayload, SinkResponse};
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::config::{validate_endpoint, TrackerConfig};
use crate::error::{AnalyticsError, Result};

/// Receives one event payload per call.
///
/// Implementations report failure through the result; the tracker logs it
/// and moves on.
#[async_trait]
pub trait EventSink: Send + Sync {
	async fn send(&self, payload: &SinkPayload) -> Result<()>;
}

/// User-Agent sent with every sink request: `nova-analytics/{version}`.
pub fn user_agent() -> String {
	format!("nova-analytics/{}", env!("CARGO_PKG_VERSION"))
}

/// Creates the HTTP client used by [`HttpSink`].
pub fn http_client(timeout: Duration) -> Result<Client> {
	Ok(Client::builder()
		.user_agent(user_agent())
		.timeout(timeout)
		.build()?)
}

/// POSTs each payload as JSON to the analytics endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
	client: Client,
	endpoint: Url,
}

impl HttpSink {
	/// Creates a sink for `endpoint`. Only `http` and `https` URLs are accepted.
	pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
		let endpoint = validate_endpoint(endpoint)?;
		Ok(Self {
			client: http_client(timeout)?,
			endpoint,
		})
	}

	/// Creates a sink from the config's endpoint and request timeout.
	pub fn from_config(config: &TrackerConfig) -> Result<Self> {
		Self::new(&config.endpoint, config.request_timeout())
	}

	/// The URL payloads are POSTed to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}
}

#[async_trait]
impl EventSink for HttpSink {
	async fn send(&self, payload: &SinkPayload) -> Result<()> {
		let response = self
			.client
			.post(self.endpoint.clone())
			.json(payload)
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await.unwrap_or_default();

		if status.is_success() {
			let accepted = serde_json::from_str::<SinkResponse>(&body)
				.ok()
				.and_then(|r| r.success);
			debug!(event = %payload.event, status = status.as_u16(), ?accepted, "sink accepted event");
			return Ok(());
		}

		let message = serde_json::from_str::<SinkResponse>(&body)
			.ok()
			.and_then(|r| r.error)
			.unwrap_or(body);

		Err(AnalyticsError::ServerError {
			status: status.as_u16(),
			message,
		})
	}
}

/// Discards every payload without logging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
	async fn send(&self, _payload: &SinkPayload) -> Result<()> {
		Ok(())
	}
}

/// Writes every payload to the log instead of the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
	async fn send(&self, payload: &SinkPayload) -> Result<()> {
		let properties = serde_json::to_string(&payload.properties)?;
		info!(
			event = %payload.event,
			timestamp = %payload.timestamp,
			properties = %properties,
			"analytics event"
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn payload() -> SinkPayload {
		SinkPayload {
			event: "logo_click".to_string(),
			properties: json!({"source": "header"}),
			timestamp: "2025-03-01T12:00:00.000Z".to_string(),
		}
	}

	#[test]
	fn user_agent_has_crate_prefix() {
		let ua = user_agent();
		assert!(ua.starts_with("nova-analytics/"));
		assert_eq!(ua.split('/').count(), 2);
	}

	#[test]
	fn http_sink_rejects_bad_endpoints() {
		assert!(matches!(
			HttpSink::new("not a url", Duration::from_secs(1)),
			Err(AnalyticsError::InvalidEndpoint(_))
		));
		assert!(matches!(
			HttpSink::new("file:///tmp/events", Duration::from_secs(1)),
			Err(AnalyticsError::InvalidEndpoint(_))
		));
	}

	#[test]
	fn http_sink_keeps_endpoint() {
		let sink = HttpSink::new("https://nova.example/api/analytics", Duration::from_secs(1)).unwrap();
		assert_eq!(sink.endpoint().path(), "/api/analytics");
	}

	#[tokio::test]
	async fn noop_and_log_sinks_accept_everything() {
		NoopSink.send(&payload()).await.unwrap();
		LogSink.send(&payload()).await.unwrap();
	}
}
