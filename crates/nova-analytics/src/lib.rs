// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session and event tracker SDK for the Nova landing site.
//!
//! A [`Tracker`] is built once per page (one per browser tab) and handed to
//! whatever needs to report actions. It keeps the tab's session and visitor
//! identity in a pair of [`KeyValueStore`]s, enriches every event with them,
//! and delivers events to an [`EventSink`] without ever blocking the caller
//! or surfacing delivery errors.
//!
//! # Example
//!
//! ```ignore
//! use nova_analytics::{Properties, Tracker, TrackerConfig};
//!
//! let tracker = Tracker::builder()
//!     .config(TrackerConfig::default())
//!     .build()?;
//!
//! tracker.record_page_view("/");
//! tracker.track(
//!     "navigation_click",
//!     Properties::new().insert("section", "features"),
//! );
//! tracker.waitlist_signup("x@y.com", "hero_section");
//!
//! // Tab closing
//! tracker.on_unload();
//! tracker.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod properties;
pub mod sink;
pub mod state;
pub mod storage;
pub mod tracker;
pub mod view_log;

pub use config::TrackerConfig;
pub use error::{AnalyticsError, Result};
pub use identity::AuthMode;
pub use properties::Properties;
pub use sink::{EventSink, HttpSink, LogSink, NoopSink};
pub use state::TrackerStorage;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use tracker::{Tracker, TrackerBuilder};
pub use view_log::ViewLog;

pub use nova_analytics_core::{
	names, BounceDecision, BounceState, BounceTrigger, Event, Session, SessionId, SinkPayload,
	ViewLogExport, ViewRecord, ViewStats, Visitor, VisitorKind,
};
