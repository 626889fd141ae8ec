// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local page-view log kept in the durable store.
//!
//! This is the data behind the site's admin dashboard: running view and
//! visitor counters plus a capped list of recent page views.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use nova_analytics_core::{ViewLogExport, ViewRecord, ViewStats, VisitRecord};
use tracing::{debug, warn};

use crate::state::TrackerStorage;

/// Counters and records of page views seen on this device.
pub struct ViewLog {
	storage: TrackerStorage,
	max_records: usize,
	lock: Mutex<()>,
}

impl ViewLog {
	pub fn new(storage: TrackerStorage, max_records: usize) -> Self {
		Self {
			storage,
			max_records: max_records.max(1),
			lock: Mutex::new(()),
		}
	}

	/// Appends a record and bumps the counters. `new_visitor` is true for
	/// the first view of a session.
	pub fn record(&self, record: ViewRecord, new_visitor: bool) {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

		let mut stats = self.storage.view_stats().unwrap_or_default();
		stats.views += 1;
		if new_visitor {
			stats.visitors += 1;
		}

		let mut records = self.storage.view_records().unwrap_or_default();
		while records.len() >= self.max_records {
			let dropped = records.remove(0);
			warn!(
				page = %dropped.page,
				timestamp = %dropped.timestamp,
				"Dropped oldest view record due to log overflow"
			);
		}
		records.push(record);

		self.storage.set_view_stats(&stats);
		self.storage.set_view_records(&records);
		debug!(views = stats.views, visitors = stats.visitors, "view log updated");
	}

	/// Running totals since the last clear.
	pub fn stats(&self) -> ViewStats {
		self.storage.view_stats().unwrap_or_default()
	}

	/// All records, oldest first.
	pub fn records(&self) -> Vec<ViewRecord> {
		self.storage.view_records().unwrap_or_default()
	}

	/// At most `limit` records, newest first.
	pub fn recent(&self, limit: usize) -> Vec<ViewRecord> {
		ViewStats::recent(&self.records(), limit)
	}

	/// Counts for records on the UTC date of `now`.
	pub fn today(&self, now: DateTime<Utc>) -> ViewStats {
		ViewStats::today(&self.records(), now)
	}

	/// Most viewed pages among the kept records, at most `limit`.
	pub fn top_pages(&self, limit: usize) -> Vec<(String, u64)> {
		ViewStats::top_pages(&self.records(), limit)
	}

	/// Appends a signed-in visit, capped like the view records.
	pub fn record_visit(&self, visit: VisitRecord) {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

		let mut visits = self.storage.visits().unwrap_or_default();
		while visits.len() >= self.max_records {
			let dropped = visits.remove(0);
			warn!(
				username = %dropped.username,
				timestamp = %dropped.timestamp,
				"Dropped oldest visit due to log overflow"
			);
		}
		debug!(username = %visit.username, page = %visit.page, "visit recorded");
		visits.push(visit);
		self.storage.set_visits(&visits);
	}

	/// Signed-in visits, oldest first.
	pub fn visits(&self) -> Vec<VisitRecord> {
		self.storage.visits().unwrap_or_default()
	}

	/// Snapshot of counters and records, stamped with `now`.
	pub fn export(&self, now: DateTime<Utc>) -> ViewLogExport {
		ViewLogExport {
			stats: self.stats(),
			events: self.records(),
			exported_at: now,
		}
	}

	/// Deletes counters and records. Visits are kept.
	pub fn clear(&self) {
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		self.storage.clear_view_log();
		debug!("view log cleared");
	}
}

impl std::fmt::Debug for ViewLog {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ViewLog")
			.field("max_records", &self.max_records)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};

	fn view(ts: DateTime<Utc>, page: &str) -> ViewRecord {
		ViewRecord::new(ts, page, "test-agent", Some("https://ref.example"))
	}

	#[test]
	fn record_updates_counters() {
		let log = ViewLog::new(TrackerStorage::in_memory(), 100);
		let now = Utc::now();

		log.record(view(now, "/"), true);
		log.record(view(now, "/team"), false);

		assert_eq!(
			log.stats(),
			ViewStats {
				views: 2,
				visitors: 1
			}
		);
		assert_eq!(log.records().len(), 2);
		assert_eq!(log.records()[1].page, "/team");
	}

	#[test]
	fn overflow_drops_oldest() {
		let log = ViewLog::new(TrackerStorage::in_memory(), 3);
		let base = Utc::now();
		for i in 0..5 {
			log.record(view(base + Duration::seconds(i), &format!("/p{i}")), false);
		}

		let pages: Vec<_> = log.records().into_iter().map(|r| r.page).collect();
		assert_eq!(pages, vec!["/p2", "/p3", "/p4"]);
		assert_eq!(log.stats().views, 5);
	}

	#[test]
	fn recent_and_today() {
		let log = ViewLog::new(TrackerStorage::in_memory(), 100);
		let now = Utc.with_ymd_and_hms(2025, 3, 2, 10, 0, 0).unwrap();
		log.record(view(now - Duration::days(2), "/old"), true);
		log.record(view(now - Duration::minutes(5), "/"), true);
		log.record(view(now, "/faq"), false);

		let recent = log.recent(2);
		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].page, "/faq");
		assert_eq!(log.today(now).views, 2);
	}

	#[test]
	fn export_and_clear() {
		let log = ViewLog::new(TrackerStorage::in_memory(), 100);
		let now = Utc.with_ymd_and_hms(2025, 3, 2, 10, 0, 0).unwrap();
		log.record(view(now, "/"), true);

		let export = log.export(now);
		assert_eq!(export.stats.views, 1);
		assert_eq!(export.events.len(), 1);
		assert_eq!(export.file_name(), "nova-analytics-2025-03-02.json");

		let json = serde_json::to_value(&export).unwrap();
		assert_eq!(json["events"][0]["referrer"], "https://ref.example");

		log.clear();
		assert_eq!(log.stats(), ViewStats::default());
		assert!(log.records().is_empty());
	}

	#[test]
	fn top_pages_from_kept_records() {
		let log = ViewLog::new(TrackerStorage::in_memory(), 100);
		let now = Utc::now();
		for page in ["/", "/team", "/", "/faq", "/"] {
			log.record(view(now, page), false);
		}

		let top = log.top_pages(2);
		assert_eq!(top, vec![("/".to_string(), 3), ("/team".to_string(), 1)]);
	}

	#[test]
	fn visits_are_capped_and_kept_on_clear() {
		let log = ViewLog::new(TrackerStorage::in_memory(), 2);
		let now = Utc::now();
		for name in ["ann", "bob", "cy"] {
			log.record_visit(VisitRecord {
				username: name.to_string(),
				timestamp: now,
				page: "/".to_string(),
			});
		}
		log.clear();

		let names: Vec<_> = log.visits().into_iter().map(|v| v.username).collect();
		assert_eq!(names, vec!["bob", "cy"]);
	}
}
