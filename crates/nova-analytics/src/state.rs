// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed access to the tracker's persisted state.
//!
//! Every read goes through [`TrackerStorage::read_parsed`], which is the one
//! place where a backend error or an unparseable value turns into "absent".
//! Writes log failures and carry on; tracking never fails the caller.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use nova_analytics_core::{
	AnonymousId, BounceState, SessionId, ViewRecord, ViewStats, VisitRecord,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{KeyValueStore, MemoryStore};

/// Keys used in the tab-scoped and durable stores.
pub mod keys {
	pub const SESSION_ID: &str = "nova-session-id";
	pub const SESSION_START: &str = "nova-session-start";
	pub const PAGE_VIEWS: &str = "nova-page-views";
	pub const BOUNCE_STATE: &str = "nova-bounce-state";
	pub const ANONYMOUS_ID: &str = "nova-anonymous-id";
	pub const WAITLIST_EMAIL: &str = "nova-waitlist-email";
	pub const ATTEMPTED_USER: &str = "nova-attempted-user";
	pub const CURRENT_PAGE: &str = "nova-current-page";

	pub const USER: &str = "nova-user";
	pub const VIEW_STATS: &str = "nova-analytics";
	pub const VIEW_EVENTS: &str = "nova-view-events";
	pub const VISITS: &str = "nova-visits";
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
	username: String,
}

/// Which store a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
	Tab,
	Durable,
}

/// Typed getters and setters over a tab store and a durable store.
#[derive(Clone)]
pub struct TrackerStorage {
	tab: Arc<dyn KeyValueStore>,
	durable: Arc<dyn KeyValueStore>,
}

impl TrackerStorage {
	/// `tab` holds per-tab session state; `durable` is shared by every tab.
	pub fn new(tab: Arc<dyn KeyValueStore>, durable: Arc<dyn KeyValueStore>) -> Self {
		Self { tab, durable }
	}

	/// Both scopes backed by fresh in-memory stores.
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
	}

	fn store(&self, scope: Scope) -> &dyn KeyValueStore {
		match scope {
			Scope::Tab => self.tab.as_ref(),
			Scope::Durable => self.durable.as_ref(),
		}
	}

	fn read_raw(&self, scope: Scope, key: &str) -> Option<String> {
		match self.store(scope).get(key) {
			Ok(value) => value.filter(|v| !v.trim().is_empty()),
			Err(e) => {
				warn!(key, error = %e, "failed to read tracker state");
				None
			}
		}
	}

	fn read_parsed<T>(
		&self,
		scope: Scope,
		key: &str,
		parse: impl FnOnce(&str) -> Option<T>,
	) -> Option<T> {
		let raw = self.read_raw(scope, key)?;
		let parsed = parse(&raw);
		if parsed.is_none() {
			warn!(key, "malformed tracker state, treating as absent");
		}
		parsed
	}

	fn write(&self, scope: Scope, key: &str, value: &str) {
		if let Err(e) = self.store(scope).set(key, value) {
			warn!(key, error = %e, "failed to persist tracker state");
		}
	}

	fn write_json<T: Serialize>(&self, scope: Scope, key: &str, value: &T) {
		match serde_json::to_string(value) {
			Ok(json) => self.write(scope, key, &json),
			Err(e) => warn!(key, error = %e, "failed to encode tracker state"),
		}
	}

	fn delete(&self, scope: Scope, key: &str) {
		if let Err(e) = self.store(scope).remove(key) {
			warn!(key, error = %e, "failed to remove tracker state");
		}
	}

	/// Tab-scoped session id. A value that is not a UUID reads as absent.
	pub fn session_id(&self) -> Option<SessionId> {
		self.read_parsed(Scope::Tab, keys::SESSION_ID, |s| s.parse().ok())
	}

	pub fn set_session_id(&self, id: SessionId) {
		self.write(Scope::Tab, keys::SESSION_ID, &id.to_string());
	}

	/// Session start, stored as epoch milliseconds.
	pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
		self.read_parsed(Scope::Tab, keys::SESSION_START, |s| {
			let millis = s.trim().parse::<i64>().ok()?;
			Utc.timestamp_millis_opt(millis).single()
		})
	}

	pub fn set_session_started_at(&self, at: DateTime<Utc>) {
		self.write(
			Scope::Tab,
			keys::SESSION_START,
			&at.timestamp_millis().to_string(),
		);
	}

	/// Page views seen in this tab's session.
	pub fn page_view_count(&self) -> Option<u32> {
		self.read_parsed(Scope::Tab, keys::PAGE_VIEWS, |s| s.trim().parse().ok())
	}

	pub fn set_page_view_count(&self, count: u32) {
		self.write(Scope::Tab, keys::PAGE_VIEWS, &count.to_string());
	}

	/// Stored as the snake_case state name, e.g. `bounce_reported`.
	pub fn bounce_state(&self) -> Option<BounceState> {
		self.read_parsed(Scope::Tab, keys::BOUNCE_STATE, |s| {
			serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
		})
	}

	pub fn set_bounce_state(&self, state: BounceState) {
		match serde_json::to_value(state) {
			Ok(serde_json::Value::String(s)) => self.write(Scope::Tab, keys::BOUNCE_STATE, &s),
			_ => warn!("failed to encode bounce state"),
		}
	}

	/// Random id minted the first time a tab has no other identity.
	pub fn anonymous_id(&self) -> Option<AnonymousId> {
		self
			.read_raw(Scope::Tab, keys::ANONYMOUS_ID)
			.map(AnonymousId)
	}

	pub fn set_anonymous_id(&self, id: &AnonymousId) {
		self.write(Scope::Tab, keys::ANONYMOUS_ID, id.as_str());
	}

	/// Waitlist email for this tab. Values without `@` read as absent.
	pub fn waitlist_email(&self) -> Option<String> {
		self.read_parsed(Scope::Tab, keys::WAITLIST_EMAIL, |s| {
			s.contains('@').then(|| s.trim().to_string())
		})
	}

	pub fn set_waitlist_email(&self, email: &str) {
		self.write(Scope::Tab, keys::WAITLIST_EMAIL, email);
	}

	/// Username last typed into the auth form in this tab.
	pub fn attempted_username(&self) -> Option<String> {
		self.read_raw(Scope::Tab, keys::ATTEMPTED_USER)
	}

	pub fn set_attempted_username(&self, username: &str) {
		self.write(Scope::Tab, keys::ATTEMPTED_USER, username);
	}

	pub fn clear_attempted_username(&self) {
		self.delete(Scope::Tab, keys::ATTEMPTED_USER);
	}

	/// Durable: survives across tabs, stored as `{"username": "..."}`.
	pub fn authenticated_username(&self) -> Option<String> {
		self.read_parsed(Scope::Durable, keys::USER, |s| {
			serde_json::from_str::<StoredUser>(s)
				.ok()
				.map(|u| u.username)
				.filter(|u| !u.trim().is_empty())
		})
	}

	pub fn set_authenticated_username(&self, username: &str) {
		self.write_json(
			Scope::Durable,
			keys::USER,
			&StoredUser {
				username: username.to_string(),
			},
		);
	}

	pub fn clear_authenticated_username(&self) {
		self.delete(Scope::Durable, keys::USER);
	}

	/// Durable view counters.
	pub fn view_stats(&self) -> Option<ViewStats> {
		self.read_parsed(Scope::Durable, keys::VIEW_STATS, |s| {
			serde_json::from_str(s).ok()
		})
	}

	pub fn set_view_stats(&self, stats: &ViewStats) {
		self.write_json(Scope::Durable, keys::VIEW_STATS, stats);
	}

	/// Durable view records, oldest first.
	pub fn view_records(&self) -> Option<Vec<ViewRecord>> {
		self.read_parsed(Scope::Durable, keys::VIEW_EVENTS, |s| {
			serde_json::from_str(s).ok()
		})
	}

	pub fn set_view_records(&self, records: &[ViewRecord]) {
		self.write_json(Scope::Durable, keys::VIEW_EVENTS, &records);
	}

	/// Signed-in visits, oldest first. Not touched by [`Self::clear_view_log`].
	pub fn visits(&self) -> Option<Vec<VisitRecord>> {
		self.read_parsed(Scope::Durable, keys::VISITS, |s| serde_json::from_str(s).ok())
	}

	pub fn set_visits(&self, visits: &[VisitRecord]) {
		self.write_json(Scope::Durable, keys::VISITS, &visits);
	}

	/// Path of the last page viewed in this tab.
	pub fn current_page(&self) -> Option<String> {
		self.read_raw(Scope::Tab, keys::CURRENT_PAGE)
	}

	pub fn set_current_page(&self, path: &str) {
		self.write(Scope::Tab, keys::CURRENT_PAGE, path);
	}

	/// Removes view counters and records.
	pub fn clear_view_log(&self) {
		self.delete(Scope::Durable, keys::VIEW_STATS);
		self.delete(Scope::Durable, keys::VIEW_EVENTS);
	}
}

impl std::fmt::Debug for TrackerStorage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TrackerStorage").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn storage_with(tab: Arc<MemoryStore>, durable: Arc<MemoryStore>) -> TrackerStorage {
		TrackerStorage::new(tab, durable)
	}

	#[test]
	fn session_fields_roundtrip() {
		let storage = TrackerStorage::in_memory();
		let id = SessionId::new();
		let start = Utc.timestamp_millis_opt(1_740_830_400_123).unwrap();

		storage.set_session_id(id);
		storage.set_session_started_at(start);
		storage.set_page_view_count(3);

		assert_eq!(storage.session_id(), Some(id));
		assert_eq!(storage.session_started_at(), Some(start));
		assert_eq!(storage.page_view_count(), Some(3));
	}

	#[test]
	fn malformed_values_read_as_absent() {
		let tab = Arc::new(MemoryStore::new());
		let durable = Arc::new(MemoryStore::new());
		tab.set(keys::SESSION_ID, "not-a-uuid").unwrap();
		tab.set(keys::SESSION_START, "yesterday").unwrap();
		tab.set(keys::PAGE_VIEWS, "-4").unwrap();
		tab.set(keys::BOUNCE_STATE, "exploded").unwrap();
		tab.set(keys::WAITLIST_EMAIL, "no-at-sign").unwrap();
		durable.set(keys::USER, "{\"username\":").unwrap();
		durable.set(keys::VIEW_STATS, "views=3").unwrap();
		durable.set(keys::VIEW_EVENTS, "{}").unwrap();

		let storage = storage_with(tab, durable);
		assert_eq!(storage.session_id(), None);
		assert_eq!(storage.session_started_at(), None);
		assert_eq!(storage.page_view_count(), None);
		assert_eq!(storage.bounce_state(), None);
		assert_eq!(storage.waitlist_email(), None);
		assert_eq!(storage.authenticated_username(), None);
		assert_eq!(storage.view_stats(), None);
		assert_eq!(storage.view_records(), None);
	}

	#[test]
	fn blank_values_read_as_absent() {
		let tab = Arc::new(MemoryStore::new());
		tab.set(keys::ATTEMPTED_USER, "   ").unwrap();
		tab.set(keys::ANONYMOUS_ID, "").unwrap();
		let storage = storage_with(tab, Arc::new(MemoryStore::new()));

		assert_eq!(storage.attempted_username(), None);
		assert_eq!(storage.anonymous_id(), None);
	}

	#[test]
	fn authenticated_user_is_durable_json() {
		let tab = Arc::new(MemoryStore::new());
		let durable = Arc::new(MemoryStore::new());
		let storage = storage_with(tab.clone(), durable.clone());

		storage.set_authenticated_username("bob");
		assert_eq!(
			durable.get(keys::USER).unwrap().as_deref(),
			Some(r#"{"username":"bob"}"#)
		);
		assert_eq!(tab.get(keys::USER).unwrap(), None);

		// A second tab sharing the durable store sees the same user.
		let other_tab = storage_with(Arc::new(MemoryStore::new()), durable);
		assert_eq!(other_tab.authenticated_username().as_deref(), Some("bob"));

		storage.clear_authenticated_username();
		assert_eq!(other_tab.authenticated_username(), None);
	}

	#[test]
	fn bounce_state_roundtrip() {
		let storage = TrackerStorage::in_memory();
		for state in [
			BounceState::Active,
			BounceState::BounceReported,
			BounceState::Converted,
		] {
			storage.set_bounce_state(state);
			assert_eq!(storage.bounce_state(), Some(state));
		}
	}

	#[test]
	fn view_log_clear_removes_both_keys() {
		let storage = TrackerStorage::in_memory();
		storage.set_view_stats(&ViewStats {
			views: 2,
			visitors: 1,
		});
		storage.set_view_records(&[ViewRecord::new(Utc::now(), "/", "ua", None)]);

		storage.clear_view_log();
		assert_eq!(storage.view_stats(), None);
		assert_eq!(storage.view_records(), None);
	}

	#[test]
	fn visits_are_durable_and_survive_view_log_clear() {
		let durable = Arc::new(MemoryStore::new());
		let storage = storage_with(Arc::new(MemoryStore::new()), durable.clone());
		let visit = VisitRecord {
			username: "bob".to_string(),
			timestamp: Utc.timestamp_millis_opt(1_740_830_400_000).unwrap(),
			page: "/".to_string(),
		};

		storage.set_visits(std::slice::from_ref(&visit));
		storage.clear_view_log();

		let other_tab = storage_with(Arc::new(MemoryStore::new()), durable.clone());
		assert_eq!(other_tab.visits(), Some(vec![visit]));

		durable.set(keys::VISITS, "{\"username\":\"bob\"}").unwrap();
		assert_eq!(storage.visits(), None);
	}

	#[test]
	fn current_page_is_tab_scoped() {
		let durable = Arc::new(MemoryStore::new());
		let storage = storage_with(Arc::new(MemoryStore::new()), durable.clone());
		storage.set_current_page("/team");

		let other_tab = storage_with(Arc::new(MemoryStore::new()), durable);
		assert_eq!(storage.current_page().as_deref(), Some("/team"));
		assert_eq!(other_tab.current_page(), None);
	}

	proptest! {
		#[test]
		fn page_view_count_roundtrip(count in any::<u32>()) {
			let storage = TrackerStorage::in_memory();
			storage.set_page_view_count(count);
			prop_assert_eq!(storage.page_view_count(), Some(count));
		}

		#[test]
		fn garbage_session_start_is_absent(s in "[a-z ]{1,20}") {
			let tab = Arc::new(MemoryStore::new());
			tab.set(keys::SESSION_START, &s).unwrap();
			let storage = storage_with(tab, Arc::new(MemoryStore::new()));
			prop_assert_eq!(storage.session_started_at(), None);
		}
	}
}
