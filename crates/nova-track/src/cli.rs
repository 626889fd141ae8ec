// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use nova_analytics::Properties;

/// Nova analytics tracker - reports landing-site activity for one tab
#[derive(Parser, Debug)]
#[command(name = "nova-track", version, about, long_about = None)]
pub struct Args {
	/// Tab whose session state is used; tabs share only login state
	#[arg(long, global = true, default_value = "default", value_parser = parse_tab)]
	pub tab: String,

	/// Directory holding tab and durable state files
	#[arg(long, global = true, env = "NOVA_STATE_DIR")]
	pub state_dir: Option<PathBuf>,

	/// Path to a custom configuration file
	#[arg(short, long, global = true)]
	pub config: Option<PathBuf>,

	/// Sink endpoint (overrides config and environment)
	#[arg(long, global = true)]
	pub endpoint: Option<String>,

	/// Output logs as JSON
	#[arg(long, global = true)]
	pub log_json: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Record a page view
	PageView {
		path: String,
		/// Where the visitor came from
		#[arg(long)]
		referrer: Option<String>,
	},
	/// Report a named action
	Track {
		action: String,
		/// Event property (repeatable: --prop KEY=VALUE)
		#[arg(long = "prop", value_name = "KEY=VALUE", value_parser = parse_prop)]
		props: Vec<(String, Value)>,
	},
	/// Join the waitlist
	Waitlist {
		email: String,
		#[arg(long, default_value = "hero_section")]
		source: String,
	},
	/// Sign in as a returning user
	Login { username: String },
	/// Sign up as a new user
	Signup { username: String },
	/// Sign out, keeping the waitlist and anonymous identity
	Logout,
	/// Close the tab, reporting a bounce if the visit qualifies
	Unload,
	/// Show the current session and visitor
	Session,
	/// Show local page-view counters
	Stats {
		/// Also list the most recent views
		#[arg(long, default_value = "0")]
		recent: usize,
		/// Number of most viewed pages to show
		#[arg(long, default_value = "5")]
		top: usize,
		/// Also list signed-in visits
		#[arg(long)]
		visits: bool,
	},
	/// Write the local view log to a JSON file
	Export {
		/// Output file (defaults to nova-analytics-<date>.json)
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
	/// Delete the local view log
	Clear,
}

impl Args {
	pub fn state_dir(&self) -> PathBuf {
		self.state_dir
			.clone()
			.or_else(|| dirs::state_dir().map(|d| d.join("nova")))
			.unwrap_or_else(|| std::env::temp_dir().join("nova"))
	}

	pub fn tab_file(&self) -> PathBuf {
		self.state_dir()
			.join("tabs")
			.join(format!("{}.json", self.tab))
	}

	pub fn durable_file(&self) -> PathBuf {
		self.state_dir().join("durable.json")
	}
}

/// Tab names become file names under `<state-dir>/tabs`, so they may not
/// contain path separators or `..`.
pub fn parse_tab(s: &str) -> Result<String, String> {
	let name = s.trim();
	if name.is_empty() {
		return Err("tab name must not be empty".to_string());
	}
	if name.contains(['/', '\\']) || name.contains("..") {
		return Err(format!("invalid tab name {s:?}: no '/', '\\' or '..'"));
	}
	Ok(name.to_string())
}

/// Parses `KEY=VALUE`. The value is taken as JSON when it parses as JSON,
/// otherwise as a plain string.
pub fn parse_prop(s: &str) -> Result<(String, Value), String> {
	let (key, value) = s
		.split_once('=')
		.ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
	let key = key.trim();
	if key.is_empty() {
		return Err(format!("empty property key in {s:?}"));
	}
	let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
	Ok((key.to_string(), value))
}

pub fn props_to_properties(props: &[(String, Value)]) -> Properties {
	props.iter().cloned().collect()
}
