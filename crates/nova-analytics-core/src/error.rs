// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the core analytics model.

use thiserror::Error;

/// Errors produced while parsing core analytics values.
#[derive(Debug, Error)]
pub enum AnalyticsCoreError {
	/// Invalid session ID
	#[error("invalid session ID: {0}")]
	InvalidSessionId(String),

	/// Invalid visitor kind string
	#[error("invalid visitor kind: {0}")]
	InvalidVisitorKind(String),

	/// Invalid bounce trigger string
	#[error("invalid bounce trigger: {0}")]
	InvalidBounceTrigger(String),

	/// Serialization error
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type alias for core analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsCoreError>;
