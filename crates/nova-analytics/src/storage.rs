// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! String key-value stores backing the tracker's persisted state.
//!
//! A tracker uses two of them: a tab-scoped store (what a browser keeps in
//! session storage) and a durable one shared by every tab.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("storage I/O error at {path}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to encode store contents: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Minimal key-value interface the tracker persists through.
pub trait KeyValueStore: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
	fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
	fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process store. State lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
		Ok(entries.get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
		entries.insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
		entries.remove(key);
		Ok(())
	}
}

/// Store persisted as a single JSON object file.
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename. A missing or unparseable file reads as empty.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStore {
	/// Store backed by the JSON file at `path`. Nothing is created until the
	/// first write; parent directories are created then.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			write_lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_error(&self, source: std::io::Error) -> StorageError {
		StorageError::Io {
			path: self.path.display().to_string(),
			source,
		}
	}

	fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
		let contents = match std::fs::read_to_string(&self.path) {
			Ok(c) => c,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
			Err(e) => return Err(self.io_error(e)),
		};

		match serde_json::from_str(&contents) {
			Ok(map) => Ok(map),
			Err(e) => {
				warn!(path = %self.path.display(), error = %e, "store file is corrupt, treating as empty");
				Ok(BTreeMap::new())
			}
		}
	}

	fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
		}

		let json = serde_json::to_string_pretty(entries)?;
		let tmp = self.path.with_extension("json.tmp");
		std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
		std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

		debug!(path = %self.path.display(), keys = entries.len(), "store file written");
		Ok(())
	}

	fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
		let mut entries = self.load()?;
		f(&mut entries);
		self.save(&entries)
	}
}

impl KeyValueStore for FileStore {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.load()?.remove(key))
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.update(|entries| {
			entries.insert(key.to_string(), value.to_string());
		})
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.update(|entries| {
			entries.remove(key);
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_store_set_get_remove() {
		let store = MemoryStore::new();
		assert_eq!(store.get("nova-user").unwrap(), None);

		store.set("nova-user", r#"{"username":"bob"}"#).unwrap();
		assert_eq!(
			store.get("nova-user").unwrap().as_deref(),
			Some(r#"{"username":"bob"}"#)
		);

		store.remove("nova-user").unwrap();
		assert_eq!(store.get("nova-user").unwrap(), None);
	}

	#[test]
	fn file_store_persists_across_instances() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("tabs").join("default.json");

		let store = FileStore::new(&path);
		store.set("nova-session-id", "abc").unwrap();
		store.set("nova-page-views", "2").unwrap();
		assert!(path.exists());

		let reopened = FileStore::new(&path);
		assert_eq!(reopened.get("nova-session-id").unwrap().as_deref(), Some("abc"));
		assert_eq!(reopened.get("nova-page-views").unwrap().as_deref(), Some("2"));

		reopened.remove("nova-session-id").unwrap();
		assert_eq!(store.get("nova-session-id").unwrap(), None);
	}

	#[test]
	fn missing_file_reads_empty() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().join("absent.json"));
		assert_eq!(store.get("anything").unwrap(), None);
	}

	#[test]
	fn corrupt_file_reads_empty_and_is_replaced_on_write() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("durable.json");
		std::fs::write(&path, "{not json").unwrap();

		let store = FileStore::new(&path);
		assert_eq!(store.get("nova-user").unwrap(), None);

		store.set("nova-user", "x").unwrap();
		assert_eq!(store.get("nova-user").unwrap().as_deref(), Some("x"));
	}
}
