//! Global state a render resource touches outside its own container.
//!
//! Map libraries register document-wide classes, inject stylesheets and tag
//! their container as initialized. Every such change goes through a
//! [`SideChannel`], which records it so teardown can undo exactly what was done,
//! newest first.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalMutation {
    /// Tag a view region as owned by a live instance.
    ClaimContainer { region: String },
    /// Add a class to a shared element (`"body"`, `"html"` or an element id).
    AddClass { target: String, class: String },
    /// Insert a `<style>` element with the given id.
    InjectStyle { id: String, css: String },
    /// Append a child element to `parent`.
    AppendNode {
        parent: String,
        id: String,
        tag: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    ContainerClaimed { region: String },
    MissingTarget { target: String },
    Host(String),
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::ContainerClaimed { region } => {
                write!(f, "map container {region:?} is already initialized")
            }
            ScopeError::MissingTarget { target } => write!(f, "element {target:?} not found"),
            ScopeError::Host(msg) => write!(f, "document error: {msg}"),
        }
    }
}

impl std::error::Error for ScopeError {}

/// The shared document (or a stand-in for it).
pub trait GlobalScope {
    fn apply(&mut self, mutation: &GlobalMutation) -> Result<(), ScopeError>;

    /// Undo an applied mutation. Targets that have since disappeared are ignored.
    fn revert(&mut self, mutation: &GlobalMutation);
}

/// Journal of mutations applied for one resource.
#[derive(Debug, Default)]
pub struct SideChannel {
    applied: Vec<GlobalMutation>,
}

impl SideChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `mutation` and record it. Nothing is recorded if the scope refuses.
    pub fn register(
        &mut self,
        scope: &mut dyn GlobalScope,
        mutation: GlobalMutation,
    ) -> Result<(), ScopeError> {
        scope.apply(&mutation)?;
        self.applied.push(mutation);
        Ok(())
    }

    /// Revert everything recorded, newest first. Returns how many were undone.
    pub fn unwind(&mut self, scope: &mut dyn GlobalScope) -> usize {
        let count = self.applied.len();
        while let Some(mutation) = self.applied.pop() {
            scope.revert(&mutation);
        }
        count
    }

    pub fn applied(&self) -> &[GlobalMutation] {
        &self.applied
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    claimed: BTreeSet<String>,
    classes: BTreeMap<String, BTreeSet<String>>,
    styles: BTreeMap<String, String>,
    nodes: BTreeMap<String, String>,
    reverts: Vec<GlobalMutation>,
}

/// In-memory document used natively and in tests.
///
/// Clones share state, so a test can keep one to inspect what the factory did.
#[derive(Debug, Default, Clone)]
pub struct MemoryScope {
    inner: Rc<RefCell<ScopeState>>,
}

impl MemoryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another component having initialized `region` already.
    pub fn claim_externally(&self, region: &str) {
        self.inner.borrow_mut().claimed.insert(region.to_string());
    }

    pub fn release_externally(&self, region: &str) {
        self.inner.borrow_mut().claimed.remove(region);
    }

    pub fn is_claimed(&self, region: &str) -> bool {
        self.inner.borrow().claimed.contains(region)
    }

    pub fn has_class(&self, target: &str, class: &str) -> bool {
        self.inner
            .borrow()
            .classes
            .get(target)
            .is_some_and(|set| set.contains(class))
    }

    pub fn style_count(&self) -> usize {
        self.inner.borrow().styles.len()
    }

    pub fn node_count(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    /// No claims, classes, styles or nodes remain.
    pub fn is_pristine(&self) -> bool {
        let s = self.inner.borrow();
        s.claimed.is_empty()
            && s.classes.values().all(BTreeSet::is_empty)
            && s.styles.is_empty()
            && s.nodes.is_empty()
    }

    /// Every reverted mutation, in the order reverts happened.
    pub fn reverts(&self) -> Vec<GlobalMutation> {
        self.inner.borrow().reverts.clone()
    }
}

impl GlobalScope for MemoryScope {
    fn apply(&mut self, mutation: &GlobalMutation) -> Result<(), ScopeError> {
        let mut s = self.inner.borrow_mut();
        match mutation {
            GlobalMutation::ClaimContainer { region } => {
                if !s.claimed.insert(region.clone()) {
                    return Err(ScopeError::ContainerClaimed {
                        region: region.clone(),
                    });
                }
            }
            GlobalMutation::AddClass { target, class } => {
                s.classes
                    .entry(target.clone())
                    .or_default()
                    .insert(class.clone());
            }
            GlobalMutation::InjectStyle { id, css } => {
                s.styles.insert(id.clone(), css.clone());
            }
            GlobalMutation::AppendNode { id, tag, .. } => {
                s.nodes.insert(id.clone(), tag.clone());
            }
        }
        Ok(())
    }

    fn revert(&mut self, mutation: &GlobalMutation) {
        let mut s = self.inner.borrow_mut();
        match mutation {
            GlobalMutation::ClaimContainer { region } => {
                s.claimed.remove(region);
            }
            GlobalMutation::AddClass { target, class } => {
                if let Some(set) = s.classes.get_mut(target) {
                    set.remove(class);
                }
            }
            GlobalMutation::InjectStyle { id, .. } => {
                s.styles.remove(id);
            }
            GlobalMutation::AppendNode { id, .. } => {
                s.nodes.remove(id);
            }
        }
        s.reverts.push(mutation.clone());
    }
}
