// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity-bearing actions reported by the waitlist and auth forms.
//!
//! These are thin wrappers over [`Tracker::track`]; the visitor update
//! happens there.

use nova_analytics_core::names;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::properties::Properties;
use crate::tracker::Tracker;

/// Which auth form was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
	Login,
	Signup,
}

impl AuthMode {
	/// Value of the `user_type` property on `auth_success`.
	pub fn user_type(&self) -> &'static str {
		match self {
			AuthMode::Login => "returning_user",
			AuthMode::Signup => "new_user",
		}
	}
}

impl std::fmt::Display for AuthMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AuthMode::Login => write!(f, "login"),
			AuthMode::Signup => write!(f, "signup"),
		}
	}
}

impl Tracker {
	/// Reports a waitlist form submission.
	pub fn waitlist_signup(&self, email: &str, source: &str) {
		let email = email.trim();
		let domain = email.split_once('@').map(|(_, d)| d).unwrap_or_default();
		self.track(
			names::WAITLIST_SIGNUP,
			Properties::new()
				.insert("email", email)
				.insert("email_domain", domain)
				.insert("email_length", email.len())
				.insert("source", source)
				.insert("action_type", "conversion"),
		);
	}

	/// Reports an auth form submission, before it "succeeds".
	pub fn auth_attempt(&self, mode: AuthMode, username: &str) {
		let username = username.trim();
		self.track(
			names::AUTH_ATTEMPT,
			Properties::new()
				.insert("mode", mode.to_string())
				.insert("username", username)
				.insert("username_length", username.len())
				.insert("action_type", "authentication"),
		);
	}

	/// Reports a successful login or signup. There is no credential check;
	/// every attempt succeeds. Also appends a visit for `username` on the
	/// tab's current page.
	pub fn auth_success(&self, mode: AuthMode, username: &str) {
		self.track(
			names::AUTH_SUCCESS,
			Properties::new()
				.insert("mode", mode.to_string())
				.insert("username", username.trim())
				.insert("user_type", mode.user_type())
				.insert("action_type", "conversion"),
		);
	}

	/// Forgets the logged-in and attempted usernames and reports `logout`.
	///
	/// The visitor falls back to the waitlist email or the anonymous id.
	pub fn logout(&self) {
		let previous = self.resolve_visitor();
		self.storage().clear_authenticated_username();
		self.storage().clear_attempted_username();
		debug!(previous_visitor = %previous.distinct_id(), "Visitor logged out");

		self.track(
			names::LOGOUT,
			Properties::new()
				.insert("previous_visitor_id", previous.distinct_id())
				.insert("previous_visitor_type", previous.kind().to_string()),
		);
	}
}
