use std::cell::RefCell;
use std::rc::Rc;

use crate::factory::{Blueprint, RenderBackend};
use crate::side_channel::GlobalMutation;

/// What a headless instance was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessInstance {
    pub region: String,
    pub markers: usize,
    pub boundaries: usize,
}

#[derive(Debug, Default)]
struct HeadlessLog {
    live: usize,
    max_live: usize,
    constructed: Vec<HeadlessInstance>,
    released: usize,
    fail_next: Option<String>,
}

/// Render backend that draws nothing and records what it was asked to do.
///
/// Registers the same kind of document-wide state a tile-map library does, so
/// teardown paths are exercised natively. Clones share one log.
#[derive(Debug, Default, Clone)]
pub struct HeadlessBackend {
    log: Rc<RefCell<HeadlessLog>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `construct` fail with `reason`.
    pub fn fail_next_construct(&self, reason: &str) {
        self.log.borrow_mut().fail_next = Some(reason.to_string());
    }

    pub fn live_count(&self) -> usize {
        self.log.borrow().live
    }

    /// Highest number of simultaneously live instances ever observed.
    pub fn max_live(&self) -> usize {
        self.log.borrow().max_live
    }

    pub fn constructed(&self) -> Vec<HeadlessInstance> {
        self.log.borrow().constructed.clone()
    }

    pub fn last_constructed(&self) -> Option<HeadlessInstance> {
        self.log.borrow().constructed.last().cloned()
    }

    pub fn released(&self) -> usize {
        self.log.borrow().released
    }
}

impl RenderBackend for HeadlessBackend {
    type Instance = HeadlessInstance;

    fn globals(&self, blueprint: &Blueprint<'_>) -> Vec<GlobalMutation> {
        vec![
            GlobalMutation::ClaimContainer {
                region: blueprint.region.to_string(),
            },
            GlobalMutation::AddClass {
                target: "body".to_string(),
                class: "map-active".to_string(),
            },
            GlobalMutation::InjectStyle {
                id: format!("{}-style", blueprint.region),
                css: ".map-marker{cursor:pointer}".to_string(),
            },
        ]
    }

    fn construct(&mut self, blueprint: &Blueprint<'_>) -> Result<Self::Instance, String> {
        let mut log = self.log.borrow_mut();
        if let Some(reason) = log.fail_next.take() {
            return Err(reason);
        }
        let instance = HeadlessInstance {
            region: blueprint.region.to_string(),
            markers: blueprint.dataset.sites.len(),
            boundaries: blueprint.dataset.features.len(),
        };
        log.live += 1;
        log.max_live = log.max_live.max(log.live);
        log.constructed.push(instance.clone());
        Ok(instance)
    }

    fn release(&mut self, _instance: Self::Instance) {
        let mut log = self.log.borrow_mut();
        log.live = log.live.saturating_sub(1);
        log.released += 1;
    }
}
