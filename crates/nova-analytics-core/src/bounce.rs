// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounce classification.
//!
//! A visit bounces when it saw at most one page and ended inside the bounce
//! window. Two triggers can report it: the tab unloading, and a one-shot
//! timer firing when the window closes. [`BounceState`] makes sure that at
//! most one of them produces a `bounce` event.
//!
//! ```text
//!            second page view
//!   Active ───────────────────────▶ Converted
//!     │
//!     │ timer fires / bounced unload
//!     ▼
//!   BounceReported
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsCoreError;

/// Window within which a single-page visit counts as a bounce.
pub const DEFAULT_BOUNCE_THRESHOLD: Duration = Duration::from_secs(30);

/// Outcome of [`evaluate_bounce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceDecision {
	pub bounced: bool,
	pub elapsed_ms: u64,
	pub page_view_count: u32,
}

/// Classifies a visit: bounced iff `page_view_count <= 1` and less than
/// `threshold` has elapsed since `started_at`.
pub fn evaluate_bounce(
	started_at: DateTime<Utc>,
	page_view_count: u32,
	now: DateTime<Utc>,
	threshold: Duration,
) -> BounceDecision {
	let elapsed_ms = u64::try_from((now - started_at).num_milliseconds()).unwrap_or(0);
	let threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);

	BounceDecision {
		bounced: page_view_count <= 1 && elapsed_ms < threshold_ms,
		elapsed_ms,
		page_view_count,
	}
}

/// What asked for a bounce evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceTrigger {
	/// The tab is closing or navigating away. Best effort.
	Unload,
	/// The bounce window elapsed with the tab still open.
	Timer,
}

impl std::fmt::Display for BounceTrigger {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BounceTrigger::Unload => write!(f, "unload"),
			BounceTrigger::Timer => write!(f, "timer"),
		}
	}
}

impl std::str::FromStr for BounceTrigger {
	type Err = AnalyticsCoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"unload" => Ok(BounceTrigger::Unload),
			"timer" => Ok(BounceTrigger::Timer),
			_ => Err(AnalyticsCoreError::InvalidBounceTrigger(s.to_string())),
		}
	}
}

/// Per-session bounce reporting state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceState {
	#[default]
	Active,
	BounceReported,
	Converted,
}

impl BounceState {
	/// Records a page view. Reaching two views converts an active visit.
	///
	/// Returns true when this call performed the `Active -> Converted`
	/// transition, meaning any pending timer should be cancelled.
	pub fn on_page_view(&mut self, page_view_count: u32) -> bool {
		if *self == BounceState::Active && page_view_count >= 2 {
			*self = BounceState::Converted;
			return true;
		}
		false
	}

	/// Applies a trigger. Returns true when a `bounce` event must be emitted.
	///
	/// The timer fires exactly when the window closes, so it only checks the
	/// page count: reaching it with a single page is the bounce. Unload uses
	/// the full decision. Outside `Active` every trigger is a no-op.
	pub fn on_trigger(&mut self, trigger: BounceTrigger, decision: &BounceDecision) -> bool {
		if *self != BounceState::Active {
			return false;
		}

		let bounced = match trigger {
			BounceTrigger::Timer => decision.page_view_count <= 1,
			BounceTrigger::Unload => decision.bounced,
		};

		if bounced {
			*self = BounceState::BounceReported;
		}
		bounced
	}

	pub fn is_terminal(&self) -> bool {
		*self != BounceState::Active
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;
	use proptest::prelude::*;

	fn at(ms: i64) -> (DateTime<Utc>, DateTime<Utc>) {
		let start = Utc::now();
		(start, start + ChronoDuration::milliseconds(ms))
	}

	#[test]
	fn single_view_just_inside_window_bounces() {
		let (start, now) = at(29_999);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
		assert!(decision.bounced);
		assert_eq!(decision.elapsed_ms, 29_999);
	}

	#[test]
	fn single_view_just_outside_window_does_not_bounce() {
		let (start, now) = at(30_001);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
		assert!(!decision.bounced);
	}

	#[test]
	fn exactly_at_threshold_does_not_bounce() {
		let (start, now) = at(30_000);
		assert!(!evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD).bounced);
	}

	#[test]
	fn second_page_view_suppresses_bounce() {
		let (start, now) = at(5_000);
		assert!(!evaluate_bounce(start, 2, now, DEFAULT_BOUNCE_THRESHOLD).bounced);
	}

	#[test]
	fn zero_views_counts_as_single_page() {
		let (start, now) = at(100);
		assert!(evaluate_bounce(start, 0, now, DEFAULT_BOUNCE_THRESHOLD).bounced);
	}

	#[test]
	fn timer_then_unload_reports_once() {
		let mut state = BounceState::Active;
		let (start, now) = at(30_000);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);

		assert!(state.on_trigger(BounceTrigger::Timer, &decision));
		assert_eq!(state, BounceState::BounceReported);

		let (start, now) = at(1_000);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
		assert!(!state.on_trigger(BounceTrigger::Unload, &decision));
	}

	#[test]
	fn unload_then_timer_reports_once() {
		let mut state = BounceState::Active;
		let (start, now) = at(2_000);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);

		assert!(state.on_trigger(BounceTrigger::Unload, &decision));
		assert!(!state.on_trigger(BounceTrigger::Timer, &decision));
	}

	#[test]
	fn conversion_blocks_both_triggers() {
		let mut state = BounceState::Active;
		assert!(!state.on_page_view(1));
		assert!(state.on_page_view(2));
		assert_eq!(state, BounceState::Converted);
		assert!(!state.on_page_view(3));

		let (start, now) = at(100);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
		assert!(!state.on_trigger(BounceTrigger::Timer, &decision));
		assert!(!state.on_trigger(BounceTrigger::Unload, &decision));
	}

	#[test]
	fn late_unload_without_bounce_stays_active() {
		let mut state = BounceState::Active;
		let (start, now) = at(45_000);
		let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
		assert!(!state.on_trigger(BounceTrigger::Unload, &decision));
		assert!(!state.is_terminal());
	}

	#[test]
	fn trigger_display_parse() {
		assert_eq!("unload".parse::<BounceTrigger>().unwrap(), BounceTrigger::Unload);
		assert_eq!(BounceTrigger::Timer.to_string(), "timer");
		assert!("close".parse::<BounceTrigger>().is_err());
	}

	proptest! {
		#[test]
		fn multi_page_visits_never_bounce(count in 2u32..1000, elapsed in 0i64..120_000) {
			let (start, now) = at(elapsed);
			prop_assert!(!evaluate_bounce(start, count, now, DEFAULT_BOUNCE_THRESHOLD).bounced);
		}

		#[test]
		fn single_page_bounces_iff_inside_window(elapsed in 0i64..120_000) {
			let (start, now) = at(elapsed);
			let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
			prop_assert_eq!(decision.bounced, elapsed < 30_000);
		}

		#[test]
		fn at_most_one_report_per_session(
			triggers in proptest::collection::vec(prop_oneof![Just(BounceTrigger::Unload), Just(BounceTrigger::Timer)], 0..10),
			elapsed in 0i64..60_000,
		) {
			let mut state = BounceState::Active;
			let (start, now) = at(elapsed);
			let decision = evaluate_bounce(start, 1, now, DEFAULT_BOUNCE_THRESHOLD);
			let reports = triggers
				.iter()
				.filter(|t| state.on_trigger(**t, &decision))
				.count();
			prop_assert!(reports <= 1);
		}
	}
}
