//! Browser document bindings: the global scope a map instance mutates and the
//! page signals that drive recovery.

use lifecycle::{
    ExternalSignal, GlobalMutation, GlobalScope, ListenerId, ScopeError, SignalError, SignalKind,
    SignalSink, SignalSource, Visibility,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, EventTarget, VisibilityState};

const OWNER_ATTR: &str = "data-map-owner";

fn host_err(err: JsValue) -> ScopeError {
    ScopeError::Host(format!("{err:?}"))
}

pub fn document() -> Result<Document, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("no window"))?
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))
}

/// [`GlobalScope`] over the live page.
pub struct DocumentScope {
    document: Document,
}

impl DocumentScope {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn target(&self, target: &str) -> Result<Element, ScopeError> {
        let found = match target {
            "body" => self.document.body().map(Element::from),
            "html" => self.document.document_element(),
            id => self.document.get_element_by_id(id),
        };
        found.ok_or_else(|| ScopeError::MissingTarget {
            target: target.to_string(),
        })
    }

    fn remove_by_id(&self, id: &str) {
        if let Some(el) = self.document.get_element_by_id(id) {
            el.remove();
        }
    }
}

impl GlobalScope for DocumentScope {
    fn apply(&mut self, mutation: &GlobalMutation) -> Result<(), ScopeError> {
        match mutation {
            GlobalMutation::ClaimContainer { region } => {
                let el = self.target(region)?;
                if el.has_attribute(OWNER_ATTR) {
                    return Err(ScopeError::ContainerClaimed {
                        region: region.clone(),
                    });
                }
                el.set_attribute(OWNER_ATTR, "lifecycle").map_err(host_err)
            }
            GlobalMutation::AddClass { target, class } => {
                self.target(target)?.class_list().add_1(class).map_err(host_err)
            }
            GlobalMutation::InjectStyle { id, css } => {
                let head: Element = match self.document.head() {
                    Some(head) => head.into(),
                    None => self.target("html")?,
                };
                let style = self.document.create_element("style").map_err(host_err)?;
                style.set_id(id);
                style.set_text_content(Some(css));
                head.append_child(&style).map(|_| ()).map_err(host_err)
            }
            GlobalMutation::AppendNode { parent, id, tag } => {
                let parent = self.target(parent)?;
                let node = self.document.create_element(tag).map_err(host_err)?;
                node.set_id(id);
                parent.append_child(&node).map(|_| ()).map_err(host_err)
            }
        }
    }

    fn revert(&mut self, mutation: &GlobalMutation) {
        match mutation {
            GlobalMutation::ClaimContainer { region } => {
                if let Some(el) = self.document.get_element_by_id(region) {
                    let _ = el.remove_attribute(OWNER_ATTR);
                }
            }
            GlobalMutation::AddClass { target, class } => {
                if let Ok(el) = self.target(target) {
                    let _ = el.class_list().remove_1(class);
                }
            }
            GlobalMutation::InjectStyle { id, .. } | GlobalMutation::AppendNode { id, .. } => {
                self.remove_by_id(id)
            }
        }
    }
}

struct Registered {
    id: ListenerId,
    kind: SignalKind,
    target: EventTarget,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

/// `visibilitychange` on the document and `pagehide` on the window.
#[derive(Default)]
pub struct DocumentSignals {
    next_id: u64,
    registered: Vec<Registered>,
}

impl DocumentSignals {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalSource for DocumentSignals {
    fn listen(&mut self, kind: SignalKind, sink: SignalSink) -> Result<ListenerId, SignalError> {
        let host = |e: JsValue| SignalError::Host(format!("{e:?}"));
        let window = web_sys::window().ok_or_else(|| SignalError::Host("no window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| SignalError::Host("no document".into()))?;

        let (target, callback): (EventTarget, Closure<dyn FnMut(web_sys::Event)>) = match kind {
            SignalKind::VisibilityChange => {
                let doc = document.clone();
                let cb = Closure::new(move |_event: web_sys::Event| {
                    let visibility = match doc.visibility_state() {
                        VisibilityState::Visible => Visibility::Visible,
                        _ => Visibility::Hidden,
                    };
                    sink(ExternalSignal::Visibility(visibility));
                });
                (document.into(), cb)
            }
            SignalKind::PageHide => {
                let cb = Closure::new(move |_event: web_sys::Event| {
                    sink(ExternalSignal::PageHide);
                });
                (window.into(), cb)
            }
        };

        target
            .add_event_listener_with_callback(kind.event_name(), callback.as_ref().unchecked_ref())
            .map_err(host)?;

        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.registered.push(Registered {
            id,
            kind,
            target,
            callback,
        });
        Ok(id)
    }

    fn unlisten(&mut self, id: ListenerId) -> Result<(), SignalError> {
        let index = self
            .registered
            .iter()
            .position(|r| r.id == id)
            .ok_or(SignalError::UnknownListener(id))?;
        let entry = self.registered.swap_remove(index);
        entry
            .target
            .remove_event_listener_with_callback(
                entry.kind.event_name(),
                entry.callback.as_ref().unchecked_ref(),
            )
            .map_err(|e| SignalError::Host(format!("{e:?}")))
    }
}
