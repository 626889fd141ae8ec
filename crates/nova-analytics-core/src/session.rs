// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session types for per-tab browsing context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalyticsCoreError;

/// Unique identifier for a tab session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}

	#[must_use]
	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for SessionId {
	type Err = AnalyticsCoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s.trim())
			.map(Self)
			.map_err(|_| AnalyticsCoreError::InvalidSessionId(s.to_string()))
	}
}

/// The browsing context of a single tab.
///
/// A session is created lazily the first time anything asks for its id and
/// lives until the tab's storage is cleared. There is no explicit end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	pub id: SessionId,
	pub started_at: DateTime<Utc>,
	/// Number of navigations seen in this tab.
	pub page_view_count: u32,
}

impl Session {
	/// Starts a fresh session at `now` with no page views.
	#[must_use]
	pub fn start(now: DateTime<Utc>) -> Self {
		Self {
			id: SessionId::new(),
			started_at: now,
			page_view_count: 0,
		}
	}

	/// Milliseconds elapsed since the session started, clamped at zero for
	/// clocks that went backwards.
	#[must_use]
	pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
		let ms = (now - self.started_at).num_milliseconds();
		u64::try_from(ms).unwrap_or(0)
	}
}
