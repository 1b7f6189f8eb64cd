//! Creation and teardown of the render resource bound to a view region.

use std::collections::{BTreeMap, VecDeque};

use formats::GeoPoint;
use foundation::{HandleAllocator, HandleId, SessionKey};
use tracing::{debug, error};

use crate::dataset::Dataset;
use crate::side_channel::{GlobalMutation, GlobalScope, ScopeError, SideChannel};

/// Identifier of the screen region (container element) a resource renders into.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewRegion(String);

impl ViewRegion {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ViewRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewOptions {
    pub center: GeoPoint,
    pub zoom: u8,
}

/// Everything a backend needs to build one instance.
#[derive(Debug, Clone, Copy)]
pub struct Blueprint<'a> {
    pub region: &'a ViewRegion,
    pub options: ViewOptions,
    pub dataset: &'a Dataset,
}

/// The third-party rendering library.
///
/// Backends describe the global state they need through [`RenderBackend::globals`]
/// instead of touching the document themselves; the factory applies and later
/// reverts that list.
pub trait RenderBackend {
    type Instance;

    fn globals(&self, blueprint: &Blueprint<'_>) -> Vec<GlobalMutation>;

    fn construct(&mut self, blueprint: &Blueprint<'_>) -> Result<Self::Instance, String>;

    fn release(&mut self, instance: Self::Instance);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A live instance already owns the region. `holder` is `None` when the
    /// owner is not one of ours.
    Conflict {
        region: String,
        holder: Option<HandleId>,
    },
    Scope(ScopeError),
    Backend(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Conflict {
                region,
                holder: Some(id),
            } => write!(f, "map container {region:?} already initialized by {id}"),
            RenderError::Conflict {
                region,
                holder: None,
            } => write!(f, "map container {region:?} already initialized"),
            RenderError::Scope(err) => write!(f, "{err}"),
            RenderError::Backend(msg) => write!(f, "map backend failed: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Ownership token for the live instance in one region.
///
/// Not `Clone`: holding the handle is what entitles the holder to destroy it.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderResourceHandle {
    id: HandleId,
    region: ViewRegion,
}

impl RenderResourceHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn region(&self) -> &ViewRegion {
        &self.region
    }
}

/// Readiness report for a created handle. Delivered at most once, never
/// synchronously from `create`, and never for a handle destroyed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyNotice {
    pub handle: HandleId,
    pub session: SessionKey,
}

struct LiveResource<I> {
    id: HandleId,
    instance: I,
    side_channel: SideChannel,
}

pub struct ResourceFactory<B: RenderBackend> {
    backend: B,
    scope: Box<dyn GlobalScope>,
    allocator: HandleAllocator,
    slots: BTreeMap<ViewRegion, u32>,
    live: BTreeMap<ViewRegion, LiveResource<B::Instance>>,
    pending_ready: VecDeque<ReadyNotice>,
}

impl<B: RenderBackend> ResourceFactory<B> {
    pub fn new(backend: B, scope: impl GlobalScope + 'static) -> Self {
        Self {
            backend,
            scope: Box::new(scope),
            allocator: HandleAllocator::new(),
            slots: BTreeMap::new(),
            live: BTreeMap::new(),
            pending_ready: VecDeque::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Build a new instance in `region`.
    ///
    /// Fails with [`RenderError::Conflict`] while a live handle exists for the
    /// region, or when the document reports the container as taken. On any
    /// failure, global mutations applied so far are rolled back.
    pub fn create(
        &mut self,
        region: &ViewRegion,
        options: ViewOptions,
        dataset: &Dataset,
        session: SessionKey,
    ) -> Result<RenderResourceHandle, RenderError> {
        if let Some(existing) = self.live.get(region) {
            error!(%region, holder = %existing.id, "create attempted while a handle is live");
            return Err(RenderError::Conflict {
                region: region.to_string(),
                holder: Some(existing.id),
            });
        }

        let blueprint = Blueprint {
            region,
            options,
            dataset,
        };
        let mut side_channel = SideChannel::new();
        for mutation in self.backend.globals(&blueprint) {
            if let Err(err) = side_channel.register(self.scope.as_mut(), mutation) {
                side_channel.unwind(self.scope.as_mut());
                return Err(match err {
                    ScopeError::ContainerClaimed { region } => RenderError::Conflict {
                        region,
                        holder: None,
                    },
                    other => RenderError::Scope(other),
                });
            }
        }

        let instance = match self.backend.construct(&blueprint) {
            Ok(instance) => instance,
            Err(msg) => {
                side_channel.unwind(self.scope.as_mut());
                return Err(RenderError::Backend(msg));
            }
        };

        let slot = match self.slots.get(region) {
            Some(slot) => *slot,
            None => {
                let slot = self.allocator.add_slot();
                self.slots.insert(region.clone(), slot);
                slot
            }
        };
        let id = self
            .allocator
            .issue(slot)
            .ok_or_else(|| RenderError::Backend(format!("no handle slot for {region}")))?;

        debug!(%region, handle = %id, globals = side_channel.applied().len(), "render resource created");
        self.live.insert(
            region.clone(),
            LiveResource {
                id,
                instance,
                side_channel,
            },
        );
        self.pending_ready.push_back(ReadyNotice {
            handle: id,
            session,
        });

        Ok(RenderResourceHandle {
            id,
            region: region.clone(),
        })
    }

    /// Release the instance behind `handle` and undo its global mutations.
    ///
    /// `None`, or a handle whose instance is already gone, is a no-op.
    /// Returns whether anything was released.
    pub fn destroy(&mut self, handle: Option<RenderResourceHandle>) -> bool {
        let Some(handle) = handle else {
            return false;
        };
        self.release(&handle.region, Some(handle.id))
    }

    /// Release whatever instance occupies `region`, if any.
    pub fn destroy_region(&mut self, region: &ViewRegion) -> bool {
        self.release(region, None)
    }

    fn release(&mut self, region: &ViewRegion, expected: Option<HandleId>) -> bool {
        let matches = match (self.live.get(region), expected) {
            (Some(live), Some(id)) => live.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return false;
        }
        let Some(mut live) = self.live.remove(region) else {
            return false;
        };

        self.backend.release(live.instance);
        let undone = live.side_channel.unwind(self.scope.as_mut());
        self.pending_ready.retain(|n| n.handle != live.id);
        debug!(%region, handle = %live.id, undone, "render resource destroyed");
        true
    }

    /// Drain readiness notices queued since the last call.
    pub fn take_ready(&mut self) -> Vec<ReadyNotice> {
        self.pending_ready.drain(..).collect()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_handle(&self, region: &ViewRegion) -> Option<HandleId> {
        self.live.get(region).map(|l| l.id)
    }
}

#[cfg(test)]
mod tests {
    use foundation::SessionClock;

    use super::{RenderError, ResourceFactory, ViewRegion};
    use crate::config::ControllerConfig;
    use crate::dataset::Dataset;
    use crate::headless::HeadlessBackend;
    use crate::side_channel::MemoryScope;

    fn setup() -> (ResourceFactory<HeadlessBackend>, MemoryScope, HeadlessBackend) {
        let scope = MemoryScope::new();
        let backend = HeadlessBackend::new();
        (
            ResourceFactory::new(backend.clone(), scope.clone()),
            scope,
            backend,
        )
    }

    #[test]
    fn second_create_in_same_region_conflicts() {
        let (mut factory, scope, backend) = setup();
        let region = ViewRegion::new("map");
        let opts = ControllerConfig::default().view_options();
        let mut clock = SessionClock::counting();
        let data = Dataset::default();

        let first = factory
            .create(&region, opts, &data, clock.next())
            .expect("first");
        let err = factory
            .create(&region, opts, &data, clock.next())
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::Conflict {
                region: "map".into(),
                holder: Some(first.id())
            }
        );
        assert_eq!(factory.live_count(), 1);
        assert_eq!(backend.live_count(), 1);
        assert!(scope.is_claimed("map"));
    }

    #[test]
    fn destroy_is_idempotent_and_restores_document() {
        let (mut factory, scope, backend) = setup();
        let region = ViewRegion::new("map");
        let opts = ControllerConfig::default().view_options();
        let session = SessionClock::counting().next();

        let handle = factory
            .create(&region, opts, &Dataset::default(), session)
            .expect("create");
        assert!(!scope.is_pristine());
        assert!(factory.destroy(Some(handle)));
        assert!(scope.is_pristine());
        assert_eq!(backend.live_count(), 0);

        assert!(!factory.destroy(None));
        assert!(!factory.destroy_region(&region));
        assert!(scope.is_pristine());
    }

    #[test]
    fn stale_handle_does_not_destroy_successor() {
        let (mut factory, _scope, _backend) = setup();
        let region = ViewRegion::new("map");
        let opts = ControllerConfig::default().view_options();
        let mut clock = SessionClock::counting();
        let data = Dataset::default();

        let first = factory.create(&region, opts, &data, clock.next()).expect("first");
        let first_id = first.id();
        assert!(factory.destroy_region(&region));
        let second = factory.create(&region, opts, &data, clock.next()).expect("second");
        assert_ne!(first_id, second.id());

        // The first token is already spent; a forged stale one must be refused.
        assert!(!factory.destroy(Some(super::RenderResourceHandle {
            id: first_id,
            region: region.clone(),
        })));
        assert_eq!(factory.live_handle(&region), Some(second.id()));
    }

    #[test]
    fn ready_fires_once_and_not_for_destroyed_handles() {
        let (mut factory, _scope, _backend) = setup();
        let opts = ControllerConfig::default().view_options();
        let mut clock = SessionClock::counting();
        let data = Dataset::default();

        let a = factory
            .create(&ViewRegion::new("a"), opts, &data, clock.next())
            .expect("a");
        let b = factory
            .create(&ViewRegion::new("b"), opts, &data, clock.next())
            .expect("b");
        factory.destroy(Some(a));

        let ready = factory.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].handle, b.id());
        assert!(factory.take_ready().is_empty());
    }

    #[test]
    fn foreign_container_owner_is_a_conflict_and_rolls_back() {
        let (mut factory, scope, backend) = setup();
        scope.claim_externally("map");
        let err = factory
            .create(
                &ViewRegion::new("map"),
                ControllerConfig::default().view_options(),
                &Dataset::default(),
                SessionClock::counting().next(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::Conflict {
                region: "map".into(),
                holder: None
            }
        );
        assert_eq!(backend.live_count(), 0);
        scope.release_externally("map");
        assert!(scope.is_pristine());
    }

    #[test]
    fn backend_failure_rolls_back_globals() {
        let (mut factory, scope, backend) = setup();
        backend.fail_next_construct("webgl unavailable");
        let err = factory
            .create(
                &ViewRegion::new("map"),
                ControllerConfig::default().view_options(),
                &Dataset::default(),
                SessionClock::counting().next(),
            )
            .unwrap_err();
        assert_eq!(err, RenderError::Backend("webgl unavailable".into()));
        assert!(scope.is_pristine());
        assert_eq!(factory.live_count(), 0);
    }
}
