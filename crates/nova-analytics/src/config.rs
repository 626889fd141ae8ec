// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracker configuration.
//!
//! Layered in this order, later layers winning:
//!
//! 1. built-in defaults
//! 2. TOML file (`$XDG_CONFIG_HOME/nova/analytics.toml` or an explicit path)
//! 3. environment (`NOVA_ANALYTICS_*`)
//! 4. explicit overrides applied by the caller (CLI flags)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, Result};

pub const ENV_ENDPOINT: &str = "NOVA_ANALYTICS_ENDPOINT";
pub const ENV_ENABLED: &str = "NOVA_ANALYTICS_ENABLED";
pub const ENV_TIMEOUT_SECS: &str = "NOVA_ANALYTICS_TIMEOUT_SECS";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/analytics";

/// Settings for a [`crate::Tracker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
	/// Sink URL events are POSTed to.
	pub endpoint: String,
	/// When false, events are built and logged but never sent.
	pub enabled: bool,
	pub request_timeout_secs: u64,
	pub bounce_threshold_ms: u64,
	/// Cap on locally kept page-view records.
	pub max_view_records: usize,
	/// Client user agent stored in local view records.
	pub user_agent: String,
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_string(),
			enabled: true,
			request_timeout_secs: 10,
			bounce_threshold_ms: 30_000,
			max_view_records: 1000,
			user_agent: "unknown".to_string(),
		}
	}
}

impl TrackerConfig {
	/// Parses TOML. Missing keys take their defaults.
	pub fn from_toml_str(s: &str) -> Result<Self> {
		Ok(toml::from_str(s)?)
	}

	/// Reads a TOML file. A missing file yields the defaults.
	pub fn from_file(path: &Path) -> Result<Self> {
		match std::fs::read_to_string(path) {
			Ok(contents) => {
				debug!(path = %path.display(), "loading tracker config");
				Self::from_toml_str(&contents)
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
			Err(source) => Err(AnalyticsError::ConfigRead {
				path: path.display().to_string(),
				source,
			}),
		}
	}

	/// Default config file location, if a config directory can be found.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("nova").join("analytics.toml"))
	}

	/// Defaults, then `path` (or the default file), then the environment.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let mut config = match path.map(Path::to_path_buf).or_else(Self::default_path) {
			Some(p) => Self::from_file(&p)?,
			None => Self::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	/// Applies `NOVA_ANALYTICS_*` overrides looked up through `lookup`.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
		if let Some(endpoint) = lookup(ENV_ENDPOINT) {
			self.endpoint = endpoint;
		}
		if let Some(enabled) = lookup(ENV_ENABLED) {
			self.enabled = parse_bool(&enabled).ok_or_else(|| AnalyticsError::InvalidConfigValue {
				key: ENV_ENABLED.to_string(),
				message: format!("expected a boolean, got {enabled:?}"),
			})?;
		}
		if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
			self.request_timeout_secs =
				timeout
					.trim()
					.parse()
					.map_err(|_| AnalyticsError::InvalidConfigValue {
						key: ENV_TIMEOUT_SECS.to_string(),
						message: format!("expected seconds, got {timeout:?}"),
					})?;
		}
		Ok(())
	}

	/// Checks the endpoint (when enabled) and that durations are non-zero.
	pub fn validate(&self) -> Result<()> {
		if self.enabled {
			validate_endpoint(&self.endpoint)?;
		}
		if self.request_timeout_secs == 0 {
			return Err(AnalyticsError::InvalidConfigValue {
				key: "request_timeout_secs".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		if self.bounce_threshold_ms == 0 {
			return Err(AnalyticsError::InvalidConfigValue {
				key: "bounce_threshold_ms".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn bounce_threshold(&self) -> Duration {
		Duration::from_millis(self.bounce_threshold_ms)
	}
}

pub(crate) fn validate_endpoint(endpoint: &str) -> Result<reqwest::Url> {
	let url = reqwest::Url::parse(endpoint)
		.map_err(|_| AnalyticsError::InvalidEndpoint(endpoint.to_string()))?;
	match url.scheme() {
		"http" | "https" => Ok(url),
		_ => Err(AnalyticsError::InvalidEndpoint(endpoint.to_string())),
	}
}

fn parse_bool(s: &str) -> Option<bool> {
	match s.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn defaults_are_valid() {
		let config = TrackerConfig::default();
		config.validate().unwrap();
		assert_eq!(config.bounce_threshold(), Duration::from_secs(30));
		assert_eq!(config.request_timeout(), Duration::from_secs(10));
	}

	#[test]
	fn partial_toml_keeps_defaults() {
		let config = TrackerConfig::from_toml_str(
			r#"
endpoint = "https://nova.example/api/analytics"
max_view_records = 50
"#,
		)
		.unwrap();
		assert_eq!(config.endpoint, "https://nova.example/api/analytics");
		assert_eq!(config.max_view_records, 50);
		assert_eq!(config.bounce_threshold_ms, 30_000);
		assert!(config.enabled);
	}

	#[test]
	fn bad_toml_is_an_error() {
		let err = TrackerConfig::from_toml_str("endpoint = [").unwrap_err();
		assert!(matches!(err, AnalyticsError::ConfigParse(_)));
	}

	#[test]
	fn missing_file_yields_defaults() {
		let temp_dir = tempfile::tempdir().unwrap();
		let config = TrackerConfig::from_file(&temp_dir.path().join("analytics.toml")).unwrap();
		assert_eq!(config, TrackerConfig::default());
	}

	#[test]
	fn file_is_read() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("analytics.toml");
		std::fs::write(&path, "enabled = false\nuser_agent = \"nova-test\"\n").unwrap();

		let config = TrackerConfig::from_file(&path).unwrap();
		assert!(!config.enabled);
		assert_eq!(config.user_agent, "nova-test");
	}

	#[test]
	fn env_overrides_file_values() {
		let mut config = TrackerConfig::default();
		config
			.apply_env(env(&[
				(ENV_ENDPOINT, "https://sink.example/track"),
				(ENV_ENABLED, "off"),
				(ENV_TIMEOUT_SECS, "3"),
			]))
			.unwrap();
		assert_eq!(config.endpoint, "https://sink.example/track");
		assert!(!config.enabled);
		assert_eq!(config.request_timeout_secs, 3);
	}

	#[test]
	fn env_rejects_garbage() {
		let mut config = TrackerConfig::default();
		let err = config
			.apply_env(env(&[(ENV_TIMEOUT_SECS, "soon")]))
			.unwrap_err();
		assert!(matches!(err, AnalyticsError::InvalidConfigValue { .. }));

		let err = config
			.apply_env(env(&[(ENV_ENABLED, "maybe")]))
			.unwrap_err();
		assert!(matches!(err, AnalyticsError::InvalidConfigValue { .. }));
	}

	#[test]
	fn validate_rejects_non_http_endpoint() {
		let config = TrackerConfig {
			endpoint: "ftp://nova.example/analytics".to_string(),
			..Default::default()
		};
		assert!(matches!(
			config.validate(),
			Err(AnalyticsError::InvalidEndpoint(_))
		));

		let disabled = TrackerConfig {
			enabled: false,
			..config
		};
		disabled.validate().unwrap();
	}

	#[test]
	fn validate_rejects_zero_durations() {
		let config = TrackerConfig {
			bounce_threshold_ms: 0,
			..Default::default()
		};
		assert!(config.validate().is_err());
	}
}
