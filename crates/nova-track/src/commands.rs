// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use nova_analytics::{AuthMode, FileStore, Tracker, TrackerConfig};

use crate::cli::{props_to_properties, Args, Command};

pub fn build_tracker(args: &Args, config: TrackerConfig) -> Result<Tracker> {
	Tracker::builder()
		.config(config)
		.tab_store(Arc::new(FileStore::new(args.tab_file())))
		.durable_store(Arc::new(FileStore::new(args.durable_file())))
		.build()
		.context("failed to build tracker")
}

/// Runs one command, then waits for its deliveries before returning.
pub async fn run(args: &Args, config: TrackerConfig) -> Result<()> {
	let tracker = build_tracker(args, config)?;
	let result = execute(&tracker, &args.command);
	tracker.shutdown().await;
	result
}

fn execute(tracker: &Tracker, command: &Command) -> Result<()> {
	match command {
		Command::PageView { path, referrer } => {
			tracker.record_page_view_from(path, referrer.as_deref());
			let session = tracker.session();
			info!(path = %path, page_sequence = session.page_view_count, "page view recorded");
		}
		Command::Track { action, props } => {
			tracker.track(action, props_to_properties(props));
		}
		Command::Waitlist { email, source } => {
			tracker.waitlist_signup(email, source);
		}
		Command::Login { username } => authenticate(tracker, AuthMode::Login, username),
		Command::Signup { username } => authenticate(tracker, AuthMode::Signup, username),
		Command::Logout => tracker.logout(),
		Command::Unload => {
			let reported = tracker.on_unload();
			print_json(&json!({
				"bounce_reported": reported,
				"bounce_state": tracker.bounce_state(),
			}))?;
		}
		Command::Session => {
			let session = tracker.session();
			let visitor = tracker.resolve_visitor();
			print_json(&json!({
				"session_id": session.id.to_string(),
				"started_at": session.started_at,
				"page_view_count": session.page_view_count,
				"visitor_id": visitor.distinct_id(),
				"visitor_type": visitor.kind().to_string(),
				"bounce": tracker.evaluate_bounce(),
				"bounce_state": tracker.bounce_state(),
			}))?;
		}
		Command::Stats {
			recent,
			top,
			visits,
		} => {
			let log = tracker.view_log();
			let top_pages: Vec<_> = log
				.top_pages(*top)
				.into_iter()
				.map(|(page, views)| json!({"page": page, "views": views}))
				.collect();
			let mut output = json!({
				"total": log.stats(),
				"today": log.today(Utc::now()),
				"top_pages": top_pages,
			});
			if *recent > 0 {
				output["recent"] = json!(log.recent(*recent));
			}
			if *visits {
				output["visits"] = json!(log.visits());
			}
			print_json(&output)?;
		}
		Command::Export { output } => {
			let export = tracker.view_log().export(Utc::now());
			let path = output
				.clone()
				.unwrap_or_else(|| PathBuf::from(export.file_name()));
			let contents = serde_json::to_string_pretty(&export)?;
			std::fs::write(&path, contents)
				.with_context(|| format!("failed to write {}", path.display()))?;
			info!(path = %path.display(), events = export.events.len(), "view log exported");
		}
		Command::Clear => {
			tracker.view_log().clear();
			info!("view log cleared");
		}
	}
	Ok(())
}

/// Mirrors the auth modal: an attempt, then a successful sign-in.
fn authenticate(tracker: &Tracker, mode: AuthMode, username: &str) {
	tracker.auth_attempt(mode, username);
	tracker.auth_success(mode, username);
}

fn print_json(value: &serde_json::Value) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
