// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Nova session and event tracking.
//!
//! This crate holds the pure data model shared by the tracker SDK:
//!
//! - [`Session`] and [`SessionId`]: the per-tab browsing context
//! - [`Visitor`]: the resolved identity an event is attributed to
//! - [`Event`] and [`SinkPayload`]: event records and their wire shape
//! - [`bounce`]: bounce classification and the bounce state machine
//! - [`view_log`]: local page-view records and counters
//!
//! Nothing in here performs I/O.

pub mod bounce;
pub mod error;
pub mod event;
pub mod session;
pub mod view_log;
pub mod visitor;

pub use bounce::{
	evaluate_bounce, BounceDecision, BounceState, BounceTrigger, DEFAULT_BOUNCE_THRESHOLD,
};
pub use error::{AnalyticsCoreError, Result};
pub use event::{names, Event, SinkPayload, SinkResponse};
pub use session::{Session, SessionId};
pub use view_log::{ViewLogExport, ViewRecord, ViewStats, VisitRecord};
pub use visitor::{AnonymousId, Visitor, VisitorKind};
