//! Lifecycle control for the interactive map view.
//!
//! The [`LifecycleController`] owns the only render resource bound to a view
//! region. Manual operations (mount, unmount, clear, refresh) and external
//! signals (tab visibility, page hide) enter through the same trigger path, and
//! every asynchronous result is tagged with the [`SessionKey`] it was started
//! under so late arrivals are dropped instead of applied.
//!
//! [`SessionKey`]: foundation::SessionKey

pub mod config;
pub mod controller;
pub mod dataset;
pub mod driver;
pub mod factory;
pub mod fallback;
pub mod headless;
#[cfg(not(target_arch = "wasm32"))]
pub mod http;
pub mod side_channel;
pub mod signals;

pub use config::*;
pub use controller::*;
pub use dataset::*;
pub use driver::*;
pub use factory::*;
pub use fallback::*;
pub use headless::*;
pub use side_channel::*;
pub use signals::*;
