//! Page-level signals (tab visibility, page hide) turned into controller triggers.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::controller::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSignal {
    Visibility(Visibility),
    /// Navigation away or unload.
    PageHide,
}

impl ExternalSignal {
    pub fn trigger(self) -> Trigger {
        match self {
            ExternalSignal::Visibility(v) => Trigger::VisibilityChanged(v),
            ExternalSignal::PageHide => Trigger::Teardown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalKind {
    VisibilityChange,
    PageHide,
}

impl SignalKind {
    pub const ALL: [SignalKind; 2] = [SignalKind::VisibilityChange, SignalKind::PageHide];

    /// DOM event name.
    pub fn event_name(self) -> &'static str {
        match self {
            SignalKind::VisibilityChange => "visibilitychange",
            SignalKind::PageHide => "pagehide",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

pub type SignalSink = Rc<dyn Fn(ExternalSignal)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    UnknownListener(ListenerId),
    Host(String),
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::UnknownListener(id) => write!(f, "listener {} is not registered", id.0),
            SignalError::Host(msg) => write!(f, "listener registration failed: {msg}"),
        }
    }
}

impl std::error::Error for SignalError {}

/// Where listeners are registered (the browser document, or a test double).
pub trait SignalSource {
    fn listen(&mut self, kind: SignalKind, sink: SignalSink) -> Result<ListenerId, SignalError>;

    /// Removing an id twice is an error; [`SignalAdapter`] never does.
    fn unlisten(&mut self, id: ListenerId) -> Result<(), SignalError>;
}

/// Owns the page's signal listeners for the lifetime of one map page.
pub struct SignalAdapter<S: SignalSource> {
    source: S,
    listeners: Vec<ListenerId>,
}

impl<S: SignalSource> SignalAdapter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            listeners: Vec::new(),
        }
    }

    /// Register one listener per [`SignalKind`]. A second call while attached
    /// is a no-op. On failure, anything registered so far is removed again.
    pub fn attach(&mut self, sink: SignalSink) -> Result<(), SignalError> {
        if !self.listeners.is_empty() {
            return Ok(());
        }
        for kind in SignalKind::ALL {
            match self.source.listen(kind, sink.clone()) {
                Ok(id) => self.listeners.push(id),
                Err(err) => {
                    self.detach();
                    return Err(err);
                }
            }
        }
        debug!(listeners = self.listeners.len(), "signal listeners attached");
        Ok(())
    }

    /// Deregister every listener. Returns how many were removed; calling again
    /// removes nothing.
    pub fn detach(&mut self) -> usize {
        let count = self.listeners.len();
        for id in self.listeners.drain(..) {
            if let Err(err) = self.source.unlisten(id) {
                warn!(%err, "failed to remove signal listener");
            }
        }
        if count > 0 {
            debug!(count, "signal listeners detached");
        }
        count
    }

    pub fn is_attached(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: SignalSource> Drop for SignalAdapter<S> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    listeners: BTreeMap<ListenerId, (SignalKind, SignalSink)>,
    removals: usize,
}

/// Signal source driven by hand: the CLI and tests fire signals with [`emit`].
///
/// Clones share listeners.
///
/// [`emit`]: ManualSignals::emit
#[derive(Default, Clone)]
pub struct ManualSignals {
    state: Rc<RefCell<ManualState>>,
}

impl ManualSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to every listener registered for its kind.
    pub fn emit(&self, signal: ExternalSignal) -> usize {
        let kind = match signal {
            ExternalSignal::Visibility(_) => SignalKind::VisibilityChange,
            ExternalSignal::PageHide => SignalKind::PageHide,
        };
        let sinks: Vec<SignalSink> = self
            .state
            .borrow()
            .listeners
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, sink)| sink.clone())
            .collect();
        for sink in &sinks {
            sink(signal);
        }
        sinks.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn removals(&self) -> usize {
        self.state.borrow().removals
    }
}

impl SignalSource for ManualSignals {
    fn listen(&mut self, kind: SignalKind, sink: SignalSink) -> Result<ListenerId, SignalError> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = ListenerId(state.next_id);
        state.listeners.insert(id, (kind, sink));
        Ok(id)
    }

    fn unlisten(&mut self, id: ListenerId) -> Result<(), SignalError> {
        let mut state = self.state.borrow_mut();
        if state.listeners.remove(&id).is_none() {
            return Err(SignalError::UnknownListener(id));
        }
        state.removals += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{ExternalSignal, ManualSignals, SignalAdapter, SignalSource, Visibility};
    use crate::controller::Trigger;

    fn recording() -> (Rc<RefCell<Vec<Trigger>>>, super::SignalSink) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: super::SignalSink =
            Rc::new(move |signal: ExternalSignal| sink_seen.borrow_mut().push(signal.trigger()));
        (seen, sink)
    }

    #[test]
    fn signals_map_to_triggers() {
        let signals = ManualSignals::new();
        let (seen, sink) = recording();
        let mut adapter = SignalAdapter::new(signals.clone());
        adapter.attach(sink).expect("attach");
        assert_eq!(signals.listener_count(), 2);

        signals.emit(ExternalSignal::Visibility(Visibility::Hidden));
        signals.emit(ExternalSignal::Visibility(Visibility::Visible));
        signals.emit(ExternalSignal::PageHide);
        assert_eq!(
            *seen.borrow(),
            vec![
                Trigger::VisibilityChanged(Visibility::Hidden),
                Trigger::VisibilityChanged(Visibility::Visible),
                Trigger::Teardown,
            ]
        );
    }

    #[test]
    fn detach_removes_each_listener_exactly_once() {
        let signals = ManualSignals::new();
        let (_, sink) = recording();
        let mut adapter = SignalAdapter::new(signals.clone());
        adapter.attach(sink.clone()).expect("attach");
        adapter.attach(sink).expect("second attach is a no-op");
        assert_eq!(signals.listener_count(), 2);

        assert_eq!(adapter.detach(), 2);
        assert_eq!(adapter.detach(), 0);
        drop(adapter);
        assert_eq!(signals.listener_count(), 0);
        assert_eq!(signals.removals(), 2);
    }

    #[test]
    fn dropping_the_adapter_detaches() {
        let signals = ManualSignals::new();
        let (seen, sink) = recording();
        {
            let mut adapter = SignalAdapter::new(signals.clone());
            adapter.attach(sink).expect("attach");
        }
        assert_eq!(signals.listener_count(), 0);
        assert_eq!(signals.emit(ExternalSignal::PageHide), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn unknown_listener_is_reported() {
        let mut signals = ManualSignals::new();
        assert!(signals.unlisten(super::ListenerId(42)).is_err());
    }
}
