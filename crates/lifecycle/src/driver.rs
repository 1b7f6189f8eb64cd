//! Async driver around [`LifecycleController`].
//!
//! A [`MapSession`] runs every trigger on a single-threaded [`Executor`]:
//! apply the trigger, wait out the settle delay, fetch, then hand the result
//! back. The controller decides whether a late result still counts, so any
//! number of dispatches may be in flight at once.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use runtime::{Elapsed, Executor, with_timeout};
use tracing::debug;

use crate::controller::{
    Completion, Directive, LifecycleController, LifecycleState, MapStatus, Trigger,
};
use crate::dataset::{DatasetFetcher, FetchError, Fetched};
use crate::factory::RenderBackend;
use crate::signals::{ExternalSignal, SignalAdapter, SignalError, SignalSink, SignalSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The trigger needed no fetch; the state after applying it.
    Idle(LifecycleState),
    /// A newer trigger took over before this one fetched.
    Superseded(foundation::SessionKey),
    Completed(Completion),
}

trait Listeners {
    fn detach(&mut self) -> usize;
}

impl<S: SignalSource> Listeners for SignalAdapter<S> {
    fn detach(&mut self) -> usize {
        SignalAdapter::detach(self)
    }
}

/// Runs after every dispatch, however it was started.
pub type DispatchObserver<B> = Rc<dyn Fn(&LifecycleController<B>, &Outcome)>;

pub struct MapSession<B: RenderBackend> {
    controller: Rc<RefCell<LifecycleController<B>>>,
    fetcher: Rc<DatasetFetcher>,
    executor: Rc<dyn Executor>,
    listeners: Rc<RefCell<Option<Box<dyn Listeners>>>>,
    observer: Rc<RefCell<Option<DispatchObserver<B>>>>,
}

impl<B: RenderBackend> Clone for MapSession<B> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            fetcher: self.fetcher.clone(),
            executor: self.executor.clone(),
            listeners: self.listeners.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<B: RenderBackend + 'static> MapSession<B> {
    pub fn new(
        controller: LifecycleController<B>,
        fetcher: DatasetFetcher,
        executor: Rc<dyn Executor>,
    ) -> Self {
        Self {
            controller: Rc::new(RefCell::new(controller)),
            fetcher: Rc::new(fetcher),
            executor,
            listeners: Rc::new(RefCell::new(None)),
            observer: Rc::new(RefCell::new(None)),
        }
    }

    /// Install the observer notified after each dispatch, replacing any previous one.
    pub fn on_dispatched(&self, observer: impl Fn(&LifecycleController<B>, &Outcome) + 'static) {
        *self.observer.borrow_mut() = Some(Rc::new(observer));
    }

    /// Run one trigger to completion.
    pub async fn dispatch(&self, trigger: Trigger) -> Outcome {
        let outcome = self.run(trigger).await;
        let observer = self.observer.borrow().clone();
        if let Some(observer) = observer {
            observer(&*self.controller.borrow(), &outcome);
        }
        outcome
    }

    async fn run(&self, trigger: Trigger) -> Outcome {
        let directive = self.controller.borrow_mut().apply(trigger);
        if trigger == Trigger::Teardown {
            self.detach_signals();
        }
        let Directive::Fetch(session) = directive else {
            return Outcome::Idle(self.state());
        };

        let (settle, timeout) = {
            let controller = self.controller.borrow();
            let config = controller.config();
            (config.settle_delay, config.fetch_timeout)
        };
        self.executor.pause(settle).await;
        if self.controller.borrow().session() != session {
            debug!(%session, "superseded before fetching");
            return Outcome::Superseded(session);
        }

        let fetched =
            match with_timeout(self.executor.as_ref(), timeout, self.fetcher.fetch(session)).await
            {
                Ok(fetched) => fetched,
                Err(Elapsed(after)) => Fetched {
                    session,
                    result: Err(FetchError::TimedOut {
                        after_ms: after.as_millis() as u64,
                    }),
                },
            };

        let completion = self.controller.borrow_mut().complete_fetch(fetched);
        if matches!(completion, Completion::Ready { .. }) {
            // Readiness is never reported in the same turn as creation.
            self.executor.pause(Duration::ZERO).await;
            self.controller.borrow_mut().deliver_ready();
        }
        Outcome::Completed(completion)
    }

    /// Fire-and-forget [`dispatch`](Self::dispatch) on the executor.
    pub fn trigger(&self, trigger: Trigger) {
        let session = self.clone();
        self.executor.spawn(Box::pin(async move {
            session.dispatch(trigger).await;
        }));
    }

    /// Sink that feeds external signals into [`trigger`](Self::trigger).
    pub fn sink(&self) -> SignalSink {
        let session = self.clone();
        Rc::new(move |signal: ExternalSignal| session.trigger(signal.trigger()))
    }

    /// Register page signal listeners on `source`. They are removed when a
    /// teardown is dispatched.
    pub fn attach_signals<S: SignalSource + 'static>(&self, source: S) -> Result<(), SignalError> {
        let mut adapter = SignalAdapter::new(source);
        adapter.attach(self.sink())?;
        if let Some(mut previous) = self.listeners.borrow_mut().replace(Box::new(adapter)) {
            previous.detach();
        }
        Ok(())
    }

    pub fn signals_attached(&self) -> bool {
        self.listeners.borrow().is_some()
    }

    fn detach_signals(&self) {
        let taken = self.listeners.borrow_mut().take();
        if let Some(mut listeners) = taken {
            listeners.detach();
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.borrow().state()
    }

    pub fn map_status(&self) -> MapStatus {
        self.controller.borrow().map_status()
    }

    pub fn with_controller<R>(&self, f: impl FnOnce(&LifecycleController<B>) -> R) -> R {
        f(&*self.controller.borrow())
    }

    pub fn with_controller_mut<R>(&self, f: impl FnOnce(&mut LifecycleController<B>) -> R) -> R {
        f(&mut *self.controller.borrow_mut())
    }
}
