//! The map lifecycle state machine.
//!
//! [`LifecycleController`] is synchronous: triggers come in through
//! [`LifecycleController::apply`], which may ask the caller to fetch, and fetch
//! results come back through [`LifecycleController::complete_fetch`]. The
//! async plumbing lives in [`crate::driver`].

use foundation::{HandleId, SessionClock, SessionKey};
use runtime::{EventBus, Metrics};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::dataset::{DataOrigin, Dataset, Fetched};
use crate::factory::{RenderBackend, RenderError, RenderResourceHandle, ResourceFactory};
use crate::fallback::FallbackProvider;
use crate::side_channel::GlobalScope;
use crate::signals::Visibility;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unmounted,
    Preparing,
    Ready,
    Error,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Unmounted => "unmounted",
            LifecycleState::Preparing => "preparing",
            LifecycleState::Ready => "ready",
            LifecycleState::Error => "error",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can move the controller: the four page operations plus
/// external signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Mount,
    Unmount,
    Clear,
    Refresh,
    VisibilityChanged(Visibility),
    /// The page is going away. Detaches the controller for good.
    Teardown,
}

impl Trigger {
    pub fn parse(word: &str) -> Option<Trigger> {
        Some(match word {
            "mount" => Trigger::Mount,
            "unmount" => Trigger::Unmount,
            "clear" => Trigger::Clear,
            "refresh" => Trigger::Refresh,
            "visible" => Trigger::VisibilityChanged(Visibility::Visible),
            "hidden" => Trigger::VisibilityChanged(Visibility::Hidden),
            "teardown" => Trigger::Teardown,
            _ => return None,
        })
    }
}

/// What the caller must do after [`LifecycleController::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Idle,
    /// Start a fetch tagged with this session.
    Fetch(SessionKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The result belonged to a superseded session and was dropped.
    Stale { session: SessionKey },
    Ready { handle: HandleId, origin: DataOrigin },
    Failed(String),
}

/// Why the controller sits in [`LifecycleState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    /// No data and no fallback. A visibility change may retry.
    Fetch,
    /// The backend failed to build the instance.
    Backend,
    /// The region is owned by another instance. Only unmount then mount recovers.
    Conflict,
}

impl ErrorCause {
    fn from_render(err: &RenderError) -> Self {
        match err {
            RenderError::Conflict { .. } => ErrorCause::Conflict,
            RenderError::Scope(_) | RenderError::Backend(_) => ErrorCause::Backend,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ErrorCause::Fetch => "fetch failed",
            ErrorCause::Backend => "render backend failed",
            ErrorCause::Conflict => "resource conflict",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Inline message shown on the map page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusLine {
    fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Diagnostics snapshot, as shown in the page's debug panel.
#[derive(Debug, Clone, PartialEq)]
pub struct MapStatus {
    pub state: LifecycleState,
    pub session: SessionKey,
    pub sites: usize,
    pub features: usize,
    pub origin: Option<DataOrigin>,
    pub status: Option<StatusLine>,
    pub handle: Option<HandleId>,
    pub ready: bool,
    pub first_site: Option<String>,
}

pub struct LifecycleController<B: RenderBackend> {
    config: ControllerConfig,
    factory: ResourceFactory<B>,
    fallback: Option<Box<dyn FallbackProvider>>,
    clock: SessionClock,
    session: SessionKey,
    state: LifecycleState,
    handle: Option<RenderResourceHandle>,
    dataset: Option<Dataset>,
    origin: Option<DataOrigin>,
    status: Option<StatusLine>,
    error_cause: Option<ErrorCause>,
    ready: bool,
    detached: bool,
    events: EventBus,
    metrics: Metrics,
}

impl<B: RenderBackend> LifecycleController<B> {
    pub fn new(
        config: ControllerConfig,
        backend: B,
        scope: impl GlobalScope + 'static,
        fallback: impl FallbackProvider + 'static,
    ) -> Self {
        let fallback: Option<Box<dyn FallbackProvider>> = if config.fallback_enabled {
            Some(Box::new(fallback))
        } else {
            None
        };
        Self {
            config,
            factory: ResourceFactory::new(backend, scope),
            fallback,
            clock: SessionClock::new(),
            session: SessionKey::NONE,
            state: LifecycleState::Unmounted,
            handle: None,
            dataset: None,
            origin: None,
            status: None,
            error_cause: None,
            ready: false,
            detached: false,
            events: EventBus::new(),
            metrics: Metrics::new(),
        }
    }

    /// Replace the session clock, e.g. with [`SessionClock::counting`].
    pub fn with_clock(mut self, clock: SessionClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn apply(&mut self, trigger: Trigger) -> Directive {
        if self.detached {
            self.ignore(trigger, "controller is detached");
            return Directive::Idle;
        }

        use LifecycleState::*;
        match (trigger, self.state) {
            (Trigger::Mount, Unmounted) => self.begin(trigger),
            (Trigger::Mount, Error) => {
                self.ignore(trigger, "unmount before mounting again");
                Directive::Idle
            }
            (Trigger::Mount, _) => {
                self.ignore(trigger, "already mounted");
                Directive::Idle
            }
            (Trigger::Refresh, Ready | Preparing) => self.begin(trigger),
            (Trigger::Refresh, _) => {
                self.ignore(trigger, "nothing to refresh");
                Directive::Idle
            }
            (Trigger::VisibilityChanged(Visibility::Visible), Error)
                if self.error_cause == Some(ErrorCause::Conflict) =>
            {
                self.ignore(trigger, "unmount before mounting again");
                Directive::Idle
            }
            (Trigger::VisibilityChanged(Visibility::Visible), Ready | Preparing | Error) => {
                self.begin(trigger)
            }
            (Trigger::VisibilityChanged(_), _) => {
                self.ignore(trigger, "no recovery needed");
                Directive::Idle
            }
            (Trigger::Clear, _) => {
                self.reset(trigger, None);
                Directive::Idle
            }
            (Trigger::Unmount, _) => {
                self.reset(
                    trigger,
                    Some(StatusLine::new(StatusLevel::Info, "map unmounted")),
                );
                Directive::Idle
            }
            (Trigger::Teardown, _) => {
                self.reset(trigger, None);
                self.detached = true;
                info!(session = %self.session, "lifecycle controller detached");
                Directive::Idle
            }
        }
    }

    /// Apply a fetch result. Results from any session but the current one,
    /// or arriving outside `Preparing`, are dropped.
    pub fn complete_fetch(&mut self, fetched: Fetched) -> Completion {
        if self.detached
            || fetched.session != self.session
            || self.state != LifecycleState::Preparing
        {
            debug!(
                stale = %fetched.session,
                current = %self.session,
                state = %self.state,
                "dropping stale fetch result"
            );
            self.metrics.inc("stale_results");
            self.events.emit(
                fetched.session,
                "stale",
                format!("fetch result dropped (current {})", self.session),
            );
            return Completion::Stale {
                session: fetched.session,
            };
        }

        let (dataset, origin) = match fetched.result {
            Ok(dataset) => (dataset, DataOrigin::Live),
            Err(err) => {
                warn!(session = %self.session, %err, "dataset fetch failed");
                match self.fallback.as_ref().and_then(|f| f.provide()) {
                    Some(sample) => {
                        self.metrics.inc("fallback_used");
                        self.events.emit(self.session, "fallback", err.to_string());
                        self.status = Some(StatusLine::new(
                            StatusLevel::Warning,
                            format!("using sample data ({err})"),
                        ));
                        (sample, DataOrigin::Fallback)
                    }
                    None => {
                        let message = format!("failed to load map data: {err}");
                        self.fail(ErrorCause::Fetch, message.clone());
                        return Completion::Failed(message);
                    }
                }
            }
        };

        let options = self.config.view_options();
        let created = self
            .factory
            .create(&self.config.region, options, &dataset, self.session);
        match created {
            Ok(handle) => {
                let id = handle.id();
                self.metrics.inc("handles_created");
                self.sync_live_gauge();
                if origin == DataOrigin::Live {
                    self.status = Some(StatusLine::new(
                        StatusLevel::Info,
                        format!(
                            "loaded {} sites and {} districts",
                            dataset.sites.len(),
                            dataset.features.len()
                        ),
                    ));
                }
                self.handle = Some(handle);
                self.dataset = Some(dataset);
                self.origin = Some(origin);
                self.transition(LifecycleState::Ready, "fetch complete");
                Completion::Ready { handle: id, origin }
            }
            Err(err) => {
                error!(session = %self.session, %err, "render resource creation failed");
                let message = err.to_string();
                self.fail(ErrorCause::from_render(&err), message.clone());
                Completion::Failed(message)
            }
        }
    }

    /// Drain readiness notices from the factory. Only the notice for the
    /// current handle and session marks the view ready.
    pub fn deliver_ready(&mut self) -> bool {
        let current = self.handle.as_ref().map(RenderResourceHandle::id);
        let mut marked = false;
        for notice in self.factory.take_ready() {
            if Some(notice.handle) == current && notice.session == self.session && !self.ready {
                self.ready = true;
                marked = true;
                self.events
                    .emit(notice.session, "ready", format!("handle {} ready", notice.handle));
            } else {
                debug!(handle = %notice.handle, session = %notice.session, "dropping stale ready notice");
            }
        }
        marked
    }

    fn begin(&mut self, trigger: Trigger) -> Directive {
        self.release_handle();
        self.error_cause = None;
        self.dataset = None;
        self.origin = None;
        self.session = self.clock.next();
        self.status = Some(StatusLine::new(StatusLevel::Info, "loading map data"));
        self.transition(LifecycleState::Preparing, trigger_name(trigger));
        Directive::Fetch(self.session)
    }

    fn reset(&mut self, trigger: Trigger, status: Option<StatusLine>) {
        self.release_handle();
        self.error_cause = None;
        self.dataset = None;
        self.origin = None;
        self.session = self.clock.next();
        self.status = status;
        self.transition(LifecycleState::Unmounted, trigger_name(trigger));
    }

    fn fail(&mut self, cause: ErrorCause, message: String) {
        self.release_handle();
        self.dataset = None;
        self.origin = None;
        self.error_cause = Some(cause);
        self.status = Some(StatusLine::new(StatusLevel::Error, message));
        self.transition(LifecycleState::Error, cause.as_str());
    }

    fn release_handle(&mut self) {
        self.ready = false;
        if self.factory.destroy(self.handle.take()) {
            self.metrics.inc("handles_destroyed");
        }
        // Also covers an instance the factory still holds for this region
        // without a handle on our side.
        if self.factory.destroy_region(&self.config.region) {
            self.metrics.inc("handles_destroyed");
        }
        self.sync_live_gauge();
    }

    fn sync_live_gauge(&mut self) {
        self.metrics
            .set_gauge("live_handles", self.factory.live_count() as i64);
    }

    fn transition(&mut self, to: LifecycleState, cause: &str) {
        let from = self.state;
        self.state = to;
        if from == to && to != LifecycleState::Preparing {
            return;
        }
        info!(session = %self.session, %from, %to, cause, "map lifecycle transition");
        self.events
            .emit(self.session, "transition", format!("{from} -> {to} ({cause})"));
    }

    fn ignore(&mut self, trigger: Trigger, reason: &str) {
        debug!(?trigger, state = %self.state, reason, "trigger ignored");
        self.events.emit(
            self.session,
            "ignored",
            format!("{} in {}: {reason}", trigger_name(trigger), self.state),
        );
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn session(&self) -> SessionKey {
        self.session
    }

    pub fn handle_id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(RenderResourceHandle::id)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn origin(&self) -> Option<DataOrigin> {
        self.origin
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    pub fn error_cause(&self) -> Option<ErrorCause> {
        self.error_cause
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn factory(&self) -> &ResourceFactory<B> {
        &self.factory
    }

    pub fn map_status(&self) -> MapStatus {
        let dataset = self.dataset.as_ref();
        MapStatus {
            state: self.state,
            session: self.session,
            sites: dataset.map_or(0, |d| d.sites.len()),
            features: dataset.map_or(0, |d| d.features.len()),
            origin: self.origin,
            status: self.status.clone(),
            handle: self.handle_id(),
            ready: self.ready,
            first_site: dataset
                .and_then(|d| d.sites.first())
                .map(|s| s.name.clone()),
        }
    }
}

fn trigger_name(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Mount => "mount",
        Trigger::Unmount => "unmount",
        Trigger::Clear => "clear",
        Trigger::Refresh => "refresh",
        Trigger::VisibilityChanged(Visibility::Visible) => "visible",
        Trigger::VisibilityChanged(Visibility::Hidden) => "hidden",
        Trigger::Teardown => "teardown",
    }
}
