// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Visitor identity and its resolution order.
//!
//! A tab can carry several identity hints at once: a random anonymous id,
//! the email submitted to the waitlist, a username typed into the auth form,
//! and a username that "logged in". Only the strongest one is used to
//! attribute an event:
//!
//! ```text
//! Authenticated > AuthAttempted > WaitlistSubmitter > Anonymous
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalyticsCoreError;

/// Random token identifying an anonymous visitor for the lifetime of a tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousId(pub String);

impl AnonymousId {
	pub fn new() -> Self {
		Self(format!("visitor_{}", Uuid::new_v4().simple()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for AnonymousId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for AnonymousId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

/// The resolved identity an event is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Visitor {
	Anonymous { anonymous_id: AnonymousId },
	WaitlistSubmitter { email: String },
	AuthAttempted { username: String },
	Authenticated { username: String },
}

impl Visitor {
	/// Picks the strongest identity among the given hints.
	///
	/// Returns `None` only when no hint at all is present; callers then mint
	/// a fresh [`AnonymousId`].
	pub fn resolve(
		authenticated: Option<&str>,
		attempted: Option<&str>,
		waitlist_email: Option<&str>,
		anonymous_id: Option<&AnonymousId>,
	) -> Option<Visitor> {
		if let Some(username) = authenticated {
			return Some(Visitor::Authenticated {
				username: username.to_string(),
			});
		}
		if let Some(username) = attempted {
			return Some(Visitor::AuthAttempted {
				username: username.to_string(),
			});
		}
		if let Some(email) = waitlist_email {
			return Some(Visitor::WaitlistSubmitter {
				email: email.to_string(),
			});
		}
		anonymous_id.map(|id| Visitor::Anonymous {
			anonymous_id: id.clone(),
		})
	}

	pub fn kind(&self) -> VisitorKind {
		match self {
			Visitor::Anonymous { .. } => VisitorKind::Anonymous,
			Visitor::WaitlistSubmitter { .. } => VisitorKind::WaitlistSubmitter,
			Visitor::AuthAttempted { .. } => VisitorKind::AuthAttempted,
			Visitor::Authenticated { .. } => VisitorKind::Authenticated,
		}
	}

	/// The identifier reported as `visitor_id` on outgoing events.
	pub fn distinct_id(&self) -> &str {
		match self {
			Visitor::Anonymous { anonymous_id } => anonymous_id.as_str(),
			Visitor::WaitlistSubmitter { email } => email,
			Visitor::AuthAttempted { username } | Visitor::Authenticated { username } => username,
		}
	}
}

/// Discriminant of [`Visitor`], ordered by resolution precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorKind {
	Anonymous,
	WaitlistSubmitter,
	AuthAttempted,
	Authenticated,
}

impl std::fmt::Display for VisitorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			VisitorKind::Anonymous => write!(f, "anonymous"),
			VisitorKind::WaitlistSubmitter => write!(f, "waitlist_submitter"),
			VisitorKind::AuthAttempted => write!(f, "auth_attempted"),
			VisitorKind::Authenticated => write!(f, "authenticated"),
		}
	}
}

impl std::str::FromStr for VisitorKind {
	type Err = AnalyticsCoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"anonymous" => Ok(VisitorKind::Anonymous),
			"waitlist_submitter" => Ok(VisitorKind::WaitlistSubmitter),
			"auth_attempted" => Ok(VisitorKind::AuthAttempted),
			"authenticated" => Ok(VisitorKind::Authenticated),
			_ => Err(AnalyticsCoreError::InvalidVisitorKind(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn hints() -> impl Strategy<Value = (Option<String>, Option<String>, Option<String>, Option<String>)> {
		(
			proptest::option::of("[a-z]{1,12}"),
			proptest::option::of("[a-z]{1,12}"),
			proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.com"),
			proptest::option::of("visitor_[a-f0-9]{8}"),
		)
	}

	#[test]
	fn authenticated_beats_attempted() {
		let visitor = Visitor::resolve(Some("bob"), Some("alice"), None, None).unwrap();
		assert_eq!(
			visitor,
			Visitor::Authenticated {
				username: "bob".to_string()
			}
		);
	}

	#[test]
	fn attempted_beats_waitlist() {
		let anon = AnonymousId::new();
		let visitor = Visitor::resolve(None, Some("alice"), Some("a@b.com"), Some(&anon)).unwrap();
		assert_eq!(visitor.kind(), VisitorKind::AuthAttempted);
		assert_eq!(visitor.distinct_id(), "alice");
	}

	#[test]
	fn waitlist_beats_anonymous() {
		let anon = AnonymousId::new();
		let visitor = Visitor::resolve(None, None, Some("x@y.com"), Some(&anon)).unwrap();
		assert_eq!(
			visitor,
			Visitor::WaitlistSubmitter {
				email: "x@y.com".to_string()
			}
		);
	}

	#[test]
	fn no_hints_resolves_to_none() {
		assert!(Visitor::resolve(None, None, None, None).is_none());
	}

	#[test]
	fn anonymous_ids_are_prefixed_and_unique() {
		let a = AnonymousId::new();
		let b = AnonymousId::new();
		assert!(a.as_str().starts_with("visitor_"));
		assert_ne!(a, b);
	}

	#[test]
	fn visitor_serializes_with_type_tag() {
		let visitor = Visitor::WaitlistSubmitter {
			email: "x@y.com".to_string(),
		};
		let json = serde_json::to_value(&visitor).unwrap();
		assert_eq!(json["type"], "waitlist_submitter");
		assert_eq!(json["email"], "x@y.com");

		let anon = Visitor::Anonymous {
			anonymous_id: AnonymousId("visitor_abc".to_string()),
		};
		let json = serde_json::to_value(&anon).unwrap();
		assert_eq!(json["anonymous_id"], "visitor_abc");
	}

	#[test]
	fn kind_display_parse() {
		for kind in [
			VisitorKind::Anonymous,
			VisitorKind::WaitlistSubmitter,
			VisitorKind::AuthAttempted,
			VisitorKind::Authenticated,
		] {
			assert_eq!(kind.to_string().parse::<VisitorKind>().unwrap(), kind);
		}
		assert!("admin".parse::<VisitorKind>().is_err());
	}

	proptest! {
		#[test]
		fn resolved_kind_is_strongest_present((auth, attempted, email, anon) in hints()) {
			let anon = anon.map(AnonymousId);
			let resolved = Visitor::resolve(
				auth.as_deref(),
				attempted.as_deref(),
				email.as_deref(),
				anon.as_ref(),
			);

			let mut present = Vec::new();
			if anon.is_some() { present.push(VisitorKind::Anonymous); }
			if email.is_some() { present.push(VisitorKind::WaitlistSubmitter); }
			if attempted.is_some() { present.push(VisitorKind::AuthAttempted); }
			if auth.is_some() { present.push(VisitorKind::Authenticated); }

			prop_assert_eq!(resolved.map(|v| v.kind()), present.into_iter().max());
		}
	}
}
