// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The session and event tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nova_analytics_core::event::format_timestamp;
use nova_analytics_core::{
	evaluate_bounce, names, AnonymousId, BounceDecision, BounceState, BounceTrigger, Event, Session,
	SessionId, ViewRecord, VisitRecord, Visitor,
};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{AnalyticsError, Result};
use crate::properties::Properties;
use crate::sink::{EventSink, HttpSink, LogSink};
use crate::state::TrackerStorage;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::view_log::ViewLog;

/// Builder for constructing a [`Tracker`].
pub struct TrackerBuilder {
	config: TrackerConfig,
	tab_store: Option<Arc<dyn KeyValueStore>>,
	durable_store: Option<Arc<dyn KeyValueStore>>,
	sink: Option<Arc<dyn EventSink>>,
}

impl TrackerBuilder {
	/// Starts from the default config and in-memory stores.
	pub fn new() -> Self {
		Self {
			config: TrackerConfig::default(),
			tab_store: None,
			durable_store: None,
			sink: None,
		}
	}

	/// Replaces the whole config. Validated in [`Self::build`].
	pub fn config(mut self, config: TrackerConfig) -> Self {
		self.config = config;
		self
	}

	/// Store scoped to one tab. Defaults to a fresh [`MemoryStore`].
	pub fn tab_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.tab_store = Some(store);
		self
	}

	/// Store shared by all tabs. Defaults to a fresh [`MemoryStore`].
	pub fn durable_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.durable_store = Some(store);
		self
	}

	/// Overrides the sink. Without one, an [`HttpSink`] for the configured
	/// endpoint is used. Ignored when tracking is disabled, where every
	/// event goes to a [`LogSink`].
	pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.sink = Some(sink);
		self
	}

	/// Builds the tracker. Must be called from within a Tokio runtime.
	///
	/// A restored single-page session that has not reported a bounce gets
	/// its bounce timer back for whatever is left of the window, or reports
	/// the bounce right away if the window already closed.
	pub fn build(self) -> Result<Tracker> {
		self.config.validate()?;
		let runtime = Handle::try_current().map_err(|_| AnalyticsError::NoRuntime)?;

		let sink: Arc<dyn EventSink> = match (self.config.enabled, self.sink) {
			(false, _) => Arc::new(LogSink),
			(true, Some(sink)) => sink,
			(true, None) => Arc::new(HttpSink::from_config(&self.config)?),
		};

		let storage = TrackerStorage::new(
			self
				.tab_store
				.unwrap_or_else(|| Arc::new(MemoryStore::new())),
			self
				.durable_store
				.unwrap_or_else(|| Arc::new(MemoryStore::new())),
		);

		let bounce = BounceGuard {
			state: storage.bounce_state().unwrap_or_default(),
			timer: None,
		};
		let view_log = ViewLog::new(storage.clone(), self.config.max_view_records);

		info!(
			endpoint = %self.config.endpoint,
			enabled = self.config.enabled,
			"Analytics tracker initialized"
		);

		let tracker = Tracker {
			inner: Arc::new(TrackerInner {
				config: self.config,
				storage,
				sink,
				runtime,
				session_lock: Mutex::new(()),
				bounce: Mutex::new(bounce),
				in_flight: Mutex::new(Vec::new()),
				view_log,
				shut_down: AtomicBool::new(false),
			}),
		};
		tracker.resume_bounce_timer();
		Ok(tracker)
	}
}

impl Default for TrackerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct BounceGuard {
	state: BounceState,
	timer: Option<JoinHandle<()>>,
}

struct TrackerInner {
	config: TrackerConfig,
	storage: TrackerStorage,
	sink: Arc<dyn EventSink>,
	runtime: Handle,
	/// Serializes session creation and page-view counting.
	session_lock: Mutex<()>,
	/// Always taken after `session_lock`, never before.
	bounce: Mutex<BounceGuard>,
	in_flight: Mutex<Vec<JoinHandle<()>>>,
	view_log: ViewLog,
	shut_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn or_unknown(s: &str) -> &str {
	let trimmed = s.trim();
	if trimmed.is_empty() {
		names::UNKNOWN
	} else {
		trimmed
	}
}

/// Reports user actions for one tab.
///
/// Cheap to clone; clones share state. Every reporting method returns
/// immediately: delivery happens on the runtime the tracker was built in
/// and failures are only logged.
#[derive(Clone)]
pub struct Tracker {
	inner: Arc<TrackerInner>,
}

impl Tracker {
	/// Shorthand for [`TrackerBuilder::new`].
	pub fn builder() -> TrackerBuilder {
		TrackerBuilder::new()
	}

	/// The validated config this tracker was built with.
	pub fn config(&self) -> &TrackerConfig {
		&self.inner.config
	}

	/// Typed view of the tab and durable stores.
	pub fn storage(&self) -> &TrackerStorage {
		&self.inner.storage
	}

	/// Local page-view log backing the admin counters.
	pub fn view_log(&self) -> &ViewLog {
		&self.inner.view_log
	}

	/// Returns this tab's session id, creating the session on first call.
	pub fn get_or_create_session_id(&self) -> SessionId {
		self.session().id
	}

	/// Returns the current session, creating it on first call.
	pub fn session(&self) -> Session {
		let _guard = lock(&self.inner.session_lock);
		self.load_or_start_session(Utc::now())
	}

	fn load_or_start_session(&self, now: DateTime<Utc>) -> Session {
		let storage = &self.inner.storage;

		if let Some(id) = storage.session_id() {
			let started_at = storage.session_started_at().unwrap_or_else(|| {
				storage.set_session_started_at(now);
				now
			});
			let page_view_count = storage.page_view_count().unwrap_or_else(|| {
				storage.set_page_view_count(0);
				0
			});
			return Session {
				id,
				started_at,
				page_view_count,
			};
		}

		let session = Session::start(now);
		storage.set_session_id(session.id);
		storage.set_session_started_at(session.started_at);
		storage.set_page_view_count(0);
		self.reset_bounce();

		debug!(session_id = %session.id, "Started new session");
		session
	}

	fn reset_bounce(&self) {
		let mut guard = lock(&self.inner.bounce);
		if let Some(timer) = guard.timer.take() {
			timer.abort();
		}
		guard.state = BounceState::Active;
		self.inner.storage.set_bounce_state(BounceState::Active);
	}

	/// Resolves the strongest visitor identity persisted for this tab,
	/// minting an anonymous id if there is nothing at all.
	pub fn resolve_visitor(&self) -> Visitor {
		let storage = &self.inner.storage;
		let authenticated = storage.authenticated_username();
		let attempted = storage.attempted_username();
		let waitlist_email = storage.waitlist_email();
		let anonymous_id = storage.anonymous_id();

		Visitor::resolve(
			authenticated.as_deref(),
			attempted.as_deref(),
			waitlist_email.as_deref(),
			anonymous_id.as_ref(),
		)
		.unwrap_or_else(|| {
			let anonymous_id = AnonymousId::new();
			storage.set_anonymous_id(&anonymous_id);
			debug!(anonymous_id = %anonymous_id, "Created anonymous visitor");
			Visitor::Anonymous { anonymous_id }
		})
	}

	/// Records one navigation to `path`.
	pub fn record_page_view(&self, path: &str) {
		self.record_page_view_from(path, None);
	}

	/// Records one navigation to `path`, arriving from `referrer`.
	pub fn record_page_view_from(&self, path: &str, referrer: Option<&str>) {
		let now = Utc::now();
		let path = or_unknown(path);

		let session = {
			let _guard = lock(&self.inner.session_lock);
			let mut session = self.load_or_start_session(now);
			session.page_view_count = session.page_view_count.saturating_add(1);
			self.inner
				.storage
				.set_page_view_count(session.page_view_count);
			session
		};
		self.inner.storage.set_current_page(path);
		let first_view = session.page_view_count == 1;

		self.update_bounce_on_page_view(&session, now);

		let record = ViewRecord::new(now, path, &self.inner.config.user_agent, referrer);
		let referrer = record.referrer.clone();
		self.inner.view_log.record(record, first_view);

		let mut properties = Map::new();
		properties.insert("path".to_string(), Value::String(path.to_string()));
		properties.insert(
			"page_sequence".to_string(),
			Value::from(session.page_view_count),
		);
		properties.insert("referrer".to_string(), Value::String(referrer));

		let visitor = self.resolve_visitor();
		if let Visitor::Authenticated { username } = &visitor {
			self.record_visit(username, path, now);
		}
		self.dispatch(Event::new(
			names::PAGE_VIEW,
			session.id,
			visitor,
			properties,
			now,
		));
	}

	fn update_bounce_on_page_view(&self, session: &Session, now: DateTime<Utc>) {
		let mut guard = lock(&self.inner.bounce);

		if guard.state.on_page_view(session.page_view_count) {
			if let Some(timer) = guard.timer.take() {
				timer.abort();
			}
			self.inner.storage.set_bounce_state(guard.state);
			debug!(session_id = %session.id, "Visit converted, bounce timer cancelled");
			return;
		}

		if guard.state == BounceState::Active
			&& guard.timer.is_none()
			&& session.page_view_count == 1
		{
			let remaining = self.bounce_window_left(session, now);
			guard.timer = Some(self.spawn_bounce_timer(remaining));
			debug!(
				session_id = %session.id,
				fires_in_ms = remaining.as_millis() as u64,
				"Bounce timer armed"
			);
		}
	}

	fn bounce_window_left(&self, session: &Session, now: DateTime<Utc>) -> Duration {
		let elapsed = Duration::from_millis(session.elapsed_ms(now));
		self.inner.config.bounce_threshold().saturating_sub(elapsed)
	}

	/// Re-arms the bounce timer for a single-page session restored from the
	/// tab store. Only a first page view arms it otherwise.
	fn resume_bounce_timer(&self) {
		let now = Utc::now();
		let session = {
			let _guard = lock(&self.inner.session_lock);
			let storage = &self.inner.storage;
			match (
				storage.session_id(),
				storage.session_started_at(),
				storage.page_view_count(),
			) {
				(Some(id), Some(started_at), Some(1)) => Session {
					id,
					started_at,
					page_view_count: 1,
				},
				_ => return,
			}
		};

		let remaining = self.bounce_window_left(&session, now);
		if remaining.is_zero() {
			if lock(&self.inner.bounce).state == BounceState::Active {
				debug!(session_id = %session.id, "Bounce window closed while away");
				self.handle_bounce_trigger(BounceTrigger::Timer);
			}
			return;
		}

		let mut guard = lock(&self.inner.bounce);
		if guard.state == BounceState::Active && guard.timer.is_none() {
			guard.timer = Some(self.spawn_bounce_timer(remaining));
			debug!(
				session_id = %session.id,
				fires_in_ms = remaining.as_millis() as u64,
				"Bounce timer resumed"
			);
		}
	}

	fn spawn_bounce_timer(&self, delay: Duration) -> JoinHandle<()> {
		let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
		self.inner.runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			if let Some(inner) = weak.upgrade() {
				Tracker { inner }.handle_bounce_trigger(BounceTrigger::Timer);
			}
		})
	}

	/// Reports a named action with free-form properties.
	///
	/// `waitlist_signup` with an `email`, and `auth_attempt` / `auth_success`
	/// with a `username`, update the persisted visitor before the event is
	/// built, so the event already carries the new identity.
	pub fn track(&self, action: &str, properties: impl Into<Properties>) {
		let now = Utc::now();
		let action = or_unknown(action);
		let properties = properties.into();

		self.apply_identity(action, &properties);

		let session_id = self.get_or_create_session_id();
		let visitor = self.resolve_visitor();

		let mut properties = properties.into_map();
		properties.insert(
			"action_timestamp".to_string(),
			Value::String(format_timestamp(now)),
		);

		self.dispatch(Event::new(action, session_id, visitor, properties, now));
	}

	fn apply_identity(&self, action: &str, properties: &Properties) {
		let storage = &self.inner.storage;
		match action {
			names::WAITLIST_SIGNUP => match properties.get_str("email") {
				Some(email) if email.contains('@') => storage.set_waitlist_email(email),
				Some(email) => warn!(email, "Ignoring waitlist email without '@'"),
				None => {}
			},
			names::AUTH_ATTEMPT => {
				if let Some(username) = properties.get_str("username") {
					storage.set_attempted_username(username);
				}
			}
			names::AUTH_SUCCESS => {
				if let Some(username) = properties.get_str("username") {
					storage.set_authenticated_username(username);
					let page = storage.current_page();
					let page = page.as_deref().unwrap_or(names::UNKNOWN);
					self.record_visit(username, page, Utc::now());
				}
			}
			_ => {}
		}
	}

	fn record_visit(&self, username: &str, page: &str, now: DateTime<Utc>) {
		self.inner.view_log.record_visit(VisitRecord {
			username: username.to_string(),
			timestamp: now,
			page: page.to_string(),
		});
	}

	/// Classifies the current visit without reporting anything.
	pub fn evaluate_bounce(&self) -> BounceDecision {
		let session = self.session();
		evaluate_bounce(
			session.started_at,
			session.page_view_count,
			Utc::now(),
			self.inner.config.bounce_threshold(),
		)
	}

	/// Where this session is in bounce reporting.
	pub fn bounce_state(&self) -> BounceState {
		lock(&self.inner.bounce).state
	}

	/// Call when the tab is closing or navigating away. Cancels the bounce
	/// timer and reports a bounce if the visit qualifies and none was
	/// reported yet. Returns true if a `bounce` event was emitted.
	pub fn on_unload(&self) -> bool {
		self.handle_bounce_trigger(BounceTrigger::Unload)
	}

	fn handle_bounce_trigger(&self, trigger: BounceTrigger) -> bool {
		let now = Utc::now();
		let session = self.session();
		let decision = evaluate_bounce(
			session.started_at,
			session.page_view_count,
			now,
			self.inner.config.bounce_threshold(),
		);

		let emit = {
			let mut guard = lock(&self.inner.bounce);
			// The timer task runs this itself; only unload cancels it.
			if let Some(timer) = guard.timer.take() {
				if trigger == BounceTrigger::Unload {
					timer.abort();
				}
			}
			let emit = guard.state.on_trigger(trigger, &decision);
			if emit {
				self.inner.storage.set_bounce_state(guard.state);
			}
			emit
		};

		if !emit {
			debug!(session_id = %session.id, %trigger, bounced = decision.bounced, "No bounce reported");
			return false;
		}

		let mut properties = Map::new();
		properties.insert("trigger".to_string(), Value::String(trigger.to_string()));
		properties.insert("time_on_page_ms".to_string(), Value::from(decision.elapsed_ms));
		properties.insert(
			"page_view_count".to_string(),
			Value::from(decision.page_view_count),
		);
		properties.insert(
			"threshold_ms".to_string(),
			Value::from(self.inner.config.bounce_threshold_ms),
		);

		debug!(session_id = %session.id, %trigger, "Reporting bounce");
		let visitor = self.resolve_visitor();
		self.dispatch(Event::new(names::BOUNCE, session.id, visitor, properties, now));
		true
	}

	fn dispatch(&self, event: Event) {
		if self.inner.shut_down.load(Ordering::SeqCst) {
			warn!(event = %event.name, "Tracker shut down, dropping event");
			return;
		}

		debug!(
			event = %event.name,
			session_id = %event.session_id,
			visitor_type = %event.visitor.kind(),
			"Dispatching analytics event"
		);

		let payload = event.to_payload();
		let sink = Arc::clone(&self.inner.sink);
		let handle = self.inner.runtime.spawn(async move {
			match sink.send(&payload).await {
				Ok(()) => debug!(event = %payload.event, "Analytics event delivered"),
				Err(e) => warn!(event = %payload.event, error = %e, "Failed to deliver analytics event"),
			}
		});

		let mut in_flight = lock(&self.inner.in_flight);
		in_flight.retain(|h| !h.is_finished());
		in_flight.push(handle);
	}

	/// Waits for every delivery dispatched so far to finish.
	pub async fn flush(&self) {
		loop {
			let handles = std::mem::take(&mut *lock(&self.inner.in_flight));
			if handles.is_empty() {
				break;
			}
			for handle in handles {
				if let Err(e) = handle.await {
					if !e.is_cancelled() {
						warn!(error = %e, "Analytics delivery task failed");
					}
				}
			}
		}
	}

	/// Cancels the bounce timer, waits for in-flight deliveries, and drops
	/// any event reported afterwards. Does not count as an unload.
	pub async fn shutdown(&self) {
		if let Some(timer) = lock(&self.inner.bounce).timer.take() {
			timer.abort();
		}
		self.flush().await;
		self.inner.shut_down.store(true, Ordering::SeqCst);
		info!("Analytics tracker shut down");
	}

	/// True once [`Self::shutdown`] has completed.
	pub fn is_shut_down(&self) -> bool {
		self.inner.shut_down.load(Ordering::SeqCst)
	}
}

impl std::fmt::Debug for Tracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tracker")
			.field("config", &self.inner.config)
			.finish_non_exhaustive()
	}
}
