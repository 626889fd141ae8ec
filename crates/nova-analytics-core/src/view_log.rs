// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local page-view records and counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Referrer recorded when a page view arrives without one.
pub const DIRECT_REFERRER: &str = "direct";

/// One locally recorded page view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
	pub timestamp: DateTime<Utc>,
	pub page: String,
	pub user_agent: String,
	pub referrer: String,
}

impl ViewRecord {
	pub fn new(
		timestamp: DateTime<Utc>,
		page: impl Into<String>,
		user_agent: impl Into<String>,
		referrer: Option<&str>,
	) -> Self {
		let referrer = referrer
			.filter(|r| !r.trim().is_empty())
			.unwrap_or(DIRECT_REFERRER);
		Self {
			timestamp,
			page: page.into(),
			user_agent: user_agent.into(),
			referrer: referrer.to_string(),
		}
	}
}

/// Running totals kept next to the records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStats {
	#[serde(default)]
	pub views: u64,
	/// Distinct sessions that produced at least one view.
	#[serde(default)]
	pub visitors: u64,
}

impl ViewStats {
	/// Newest-first slice of at most `limit` records.
	pub fn recent(records: &[ViewRecord], limit: usize) -> Vec<ViewRecord> {
		let mut sorted = records.to_vec();
		sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
		sorted.truncate(limit);
		sorted
	}

	/// Totals for records falling on the same UTC date as `now`.
	///
	/// Records do not carry a session, so every view counts as a visitor here.
	pub fn today(records: &[ViewRecord], now: DateTime<Utc>) -> ViewStats {
		let today = now.date_naive();
		let views = records
			.iter()
			.filter(|r| r.timestamp.date_naive() == today)
			.count() as u64;
		ViewStats {
			views,
			visitors: views,
		}
	}

	/// Pages ranked by view count, most viewed first, at most `limit`.
	/// Ties keep the order in which pages were first seen.
	pub fn top_pages(records: &[ViewRecord], limit: usize) -> Vec<(String, u64)> {
		let mut counts: Vec<(String, u64)> = Vec::new();
		let mut index: HashMap<&str, usize> = HashMap::new();
		for record in records {
			match index.get(record.page.as_str()) {
				Some(&i) => counts[i].1 += 1,
				None => {
					index.insert(&record.page, counts.len());
					counts.push((record.page.clone(), 1));
				}
			}
		}
		counts.sort_by(|a, b| b.1.cmp(&a.1));
		counts.truncate(limit);
		counts
	}
}

/// One login, signup, or page view by a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
	pub username: String,
	pub timestamp: DateTime<Utc>,
	pub page: String,
}

/// Snapshot of the local view log, as written by `export`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewLogExport {
	pub stats: ViewStats,
	pub events: Vec<ViewRecord>,
	pub exported_at: DateTime<Utc>,
}

impl ViewLogExport {
	/// Suggested file name, e.g. `nova-analytics-2025-03-01.json`.
	pub fn file_name(&self) -> String {
		format!("nova-analytics-{}.json", self.exported_at.format("%Y-%m-%d"))
	}
}
