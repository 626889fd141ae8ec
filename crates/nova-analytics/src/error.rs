// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the analytics SDK.
//!
//! Only construction and configuration return these to callers. Delivery
//! errors are logged by the tracker and dropped.

use thiserror::Error;

/// Analytics SDK errors.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	/// Sink endpoint is missing or not an absolute http(s) URL.
	#[error("invalid sink endpoint: {0}")]
	InvalidEndpoint(String),

	/// The tracker was built outside a Tokio runtime.
	#[error("no Tokio runtime available to deliver events")]
	NoRuntime,

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Sink returned a non-2xx response.
	#[error("sink error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// Configuration file could not be read.
	#[error("failed to read config {path}: {source}")]
	ConfigRead {
		path: String,
		#[source]
		source: std::io::Error,
	},

	/// Configuration file is not valid TOML for [`crate::TrackerConfig`].
	#[error("invalid config: {0}")]
	ConfigParse(#[from] toml::de::Error),

	/// A configuration value is out of range.
	#[error("invalid config value for {key}: {message}")]
	InvalidConfigValue { key: String, message: String },

	/// Serialization error.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
	/// True for failures of a single delivery, as opposed to setup problems.
	pub fn is_delivery_failure(&self) -> bool {
		matches!(
			self,
			AnalyticsError::RequestFailed(_) | AnalyticsError::ServerError { .. }
		)
	}
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
