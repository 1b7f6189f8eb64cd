//! Browser binding for the map page.
//!
//! JavaScript calls [`open_map`] once the container element exists, then the
//! four page operations. Tab visibility and `pagehide` are wired up
//! automatically and go through the same trigger path. A page restored from
//! the back/forward cache after `pagehide` is reopened on `pageshow`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

use lifecycle::{
    ControllerConfig, DatasetFetcher, LifecycleController, MapSession, SampleDataset, StatusLevel,
    Trigger, ViewRegion,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

mod canvas;
mod dom;
mod net;

use canvas::CanvasBackend;
use dom::{DocumentScope, DocumentSignals, document};
use net::{BrowserExecutor, GlooSource};

static PANIC_HOOK_SET: OnceLock<()> = OnceLock::new();

thread_local! {
    static STATE: RefCell<Option<MapSession<CanvasBackend>>> = const { RefCell::new(None) };
    /// Region and API base of the last [`open_map`], cleared by [`close_map`].
    static REOPEN: RefCell<Option<(String, String)>> = const { RefCell::new(None) };
    static PAGESHOW: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
}

/// Safe TLS access helper that returns a default on teardown instead of panicking.
fn with_state<F, R>(f: F) -> R
where
    F: FnOnce(&RefCell<Option<MapSession<CanvasBackend>>>) -> R,
    R: Default,
{
    STATE.try_with(f).unwrap_or_default()
}

fn current_session() -> Option<MapSession<CanvasBackend>> {
    with_state(|state| state.borrow().clone())
}

fn live_session() -> Option<MapSession<CanvasBackend>> {
    current_session().filter(|s| !s.with_controller(|c| c.is_detached()))
}

/// Forget the stored session once its controller has been torn down.
fn drop_detached_session() {
    with_state(|state| {
        let mut state = state.borrow_mut();
        if state
            .as_ref()
            .is_some_and(|s| s.with_controller(|c| c.is_detached()))
        {
            *state = None;
        }
    });
}

fn init_panic_hook() {
    PANIC_HOOK_SET.get_or_init(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = info.to_string();
            web_sys::console::error_1(&JsValue::from_str(&msg));
        }));
    });
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    init_panic_hook();
    Ok(())
}

/// Mirror the controller's status line to the console and to `#<region>-status`.
fn report(controller: &LifecycleController<CanvasBackend>) {
    let region = &controller.config().region;
    let status = controller.status();
    let text = status.map(|s| s.text.as_str()).unwrap_or("");
    match status.map(|s| s.level) {
        Some(StatusLevel::Error) => web_sys::console::error_1(&JsValue::from_str(text)),
        Some(StatusLevel::Warning) => web_sys::console::warn_1(&JsValue::from_str(text)),
        Some(StatusLevel::Info) => web_sys::console::log_1(&JsValue::from_str(text)),
        None => {}
    }
    if let Ok(doc) = document() {
        if let Some(el) = doc.get_element_by_id(&format!("{region}-status")) {
            el.set_text_content(Some(text));
        }
    }
}

fn run(trigger: Trigger) {
    let Some(session) = current_session() else {
        web_sys::console::warn_1(&JsValue::from_str("map page is not open"));
        return;
    };
    spawn_local(async move {
        session.dispatch(trigger).await;
    });
}

fn install_pageshow() -> Result<(), JsValue> {
    if PAGESHOW.with(|slot| slot.borrow().is_some()) {
        return Ok(());
    }
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let callback = Closure::<dyn FnMut(web_sys::Event)>::new(|_event: web_sys::Event| {
        if live_session().is_some() {
            return;
        }
        let Some((region, api_base)) = REOPEN.with(|r| r.borrow().clone()) else {
            return;
        };
        if let Err(err) = open_map(&region, &api_base) {
            web_sys::console::error_1(&err);
        }
    });
    window.add_event_listener_with_callback("pageshow", callback.as_ref().unchecked_ref())?;
    PAGESHOW.with(|slot| *slot.borrow_mut() = Some(callback));
    Ok(())
}

/// Create the controller for the element `region_id` and mount it.
#[wasm_bindgen]
pub fn open_map(region_id: &str, api_base: &str) -> Result<(), JsValue> {
    if live_session().is_some() {
        return Ok(());
    }
    let config = ControllerConfig {
        region: ViewRegion::new(region_id),
        ..ControllerConfig::default()
    };
    let controller = LifecycleController::new(
        config,
        CanvasBackend,
        DocumentScope::new(document()?),
        SampleDataset,
    );
    let session = MapSession::new(
        controller,
        DatasetFetcher::new(Rc::new(GlooSource::new(api_base))),
        Rc::new(BrowserExecutor),
    );
    // Signal-driven dispatches report here too; a pagehide teardown also
    // releases the stored session so the page can be opened again.
    session.on_dispatched(|controller, _| {
        report(controller);
        if controller.is_detached() {
            drop_detached_session();
        }
    });
    session
        .attach_signals(DocumentSignals::new())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    install_pageshow()?;

    REOPEN.with(|r| *r.borrow_mut() = Some((region_id.to_string(), api_base.to_string())));
    with_state(|state| *state.borrow_mut() = Some(session));
    run(Trigger::Mount);
    Ok(())
}

#[wasm_bindgen]
pub fn mount_map() {
    run(Trigger::Mount);
}

#[wasm_bindgen]
pub fn unmount_map() {
    run(Trigger::Unmount);
}

#[wasm_bindgen]
pub fn clear_map() {
    run(Trigger::Clear);
}

#[wasm_bindgen]
pub fn refresh_map() {
    run(Trigger::Refresh);
}

/// Tear the page down: release the map and remove every listener.
#[wasm_bindgen]
pub fn close_map() {
    REOPEN.with(|r| r.borrow_mut().take());
    let Some(session) = with_state(|state| state.borrow_mut().take()) else {
        return;
    };
    spawn_local(async move {
        session.dispatch(Trigger::Teardown).await;
    });
}

/// Debug panel contents as JSON.
#[wasm_bindgen]
pub fn map_status() -> String {
    let Some(session) = current_session() else {
        return "null".to_string();
    };
    let status = session.map_status();
    serde_json::json!({
        "state": status.state.as_str(),
        "session": status.session.get(),
        "sites": status.sites,
        "features": status.features,
        "origin": status.origin.map(|o| format!("{o:?}").to_lowercase()),
        "status": status.status.map(|s| s.text),
        "handle": status.handle.map(|h| h.to_string()),
        "ready": status.ready,
        "firstSite": status.first_site,
    })
    .to_string()
}
