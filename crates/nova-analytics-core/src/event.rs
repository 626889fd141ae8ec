// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event records and the wire shape accepted by the sink.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionId;
use crate::visitor::Visitor;

/// Event names emitted by the Nova landing site.
///
/// Any other name is accepted by the tracker; these are the ones with
/// special handling or that UI code is expected to use.
pub mod names {
	pub const PAGE_VIEW: &str = "page_view";
	pub const BOUNCE: &str = "bounce";
	pub const WAITLIST_SIGNUP: &str = "waitlist_signup";
	pub const AUTH_MODAL_OPEN: &str = "auth_modal_open";
	pub const AUTH_ATTEMPT: &str = "auth_attempt";
	pub const AUTH_SUCCESS: &str = "auth_success";
	pub const BETA_MODAL_OPEN: &str = "beta_modal_open";
	pub const NAVIGATION_CLICK: &str = "navigation_click";
	pub const LOGO_CLICK: &str = "logo_click";
	pub const MOBILE_MENU_TOGGLE: &str = "mobile_menu_toggle";
	pub const LOGOUT: &str = "logout";

	/// Substituted for an empty event name or page path.
	pub const UNKNOWN: &str = "unknown";
}

/// Formats a timestamp the way every event and record carries it.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// An immutable record describing one user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub name: String,
	pub timestamp: DateTime<Utc>,
	pub session_id: SessionId,
	pub visitor: Visitor,
	pub properties: Map<String, Value>,
}

impl Event {
	/// Creates an event. An empty name is replaced with `"unknown"`.
	pub fn new(
		name: impl Into<String>,
		session_id: SessionId,
		visitor: Visitor,
		properties: Map<String, Value>,
		timestamp: DateTime<Utc>,
	) -> Self {
		let mut name = name.into();
		if name.trim().is_empty() {
			name = names::UNKNOWN.to_string();
		}
		Self {
			name,
			timestamp,
			session_id,
			visitor,
			properties,
		}
	}

	/// Builds the body POSTed to the sink.
	///
	/// Session and visitor data are folded into `properties` so the sink
	/// only ever has to look at `event`, `properties` and `timestamp`.
	/// Caller-supplied properties never override the enrichment keys.
	pub fn to_payload(&self) -> SinkPayload {
		let mut properties = self.properties.clone();
		properties.insert(
			"session_id".to_string(),
			Value::String(self.session_id.to_string()),
		);
		properties.insert(
			"visitor_id".to_string(),
			Value::String(self.visitor.distinct_id().to_string()),
		);
		properties.insert(
			"visitor_type".to_string(),
			Value::String(self.visitor.kind().to_string()),
		);
		properties.insert(
			"visitor".to_string(),
			serde_json::to_value(&self.visitor).unwrap_or(Value::Null),
		);

		SinkPayload {
			event: self.name.clone(),
			properties: Value::Object(properties),
			timestamp: format_timestamp(self.timestamp),
		}
	}
}

/// Request body accepted by the sink endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkPayload {
	pub event: String,
	#[serde(default)]
	pub properties: Value,
	pub timestamp: String,
}

/// Response body returned by the sink endpoint.
///
/// `{ "success": true }` on accept, `{ "error": "..." }` on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
