// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! nova-track - drives the Nova analytics tracker from the command line.
//!
//! Each invocation acts as one moment in the life of a browser tab: tab
//! state lives in `<state-dir>/tabs/<tab>.json`, login state shared by all
//! tabs in `<state-dir>/durable.json`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nova_analytics::TrackerConfig;

mod cli;
mod commands;

use cli::Args;

fn init_tracing(json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	if json {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().compact().with_writer(std::io::stderr))
			.init();
	}
}

fn load_config(args: &Args) -> Result<TrackerConfig> {
	let mut config =
		TrackerConfig::load(args.config.as_deref()).context("failed to load tracker config")?;
	if let Some(endpoint) = &args.endpoint {
		config.endpoint = endpoint.clone();
		config.validate().context("invalid --endpoint")?;
	}
	Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.log_json);

	let config = load_config(&args)?;
	debug!(
		tab = %args.tab,
		state_dir = %args.state_dir().display(),
		endpoint = %config.endpoint,
		"starting nova-track"
	);

	commands::run(&args, config).await
}
