pub mod event_bus;
pub mod executor;
pub mod metrics;

pub use event_bus::*;
pub use executor::*;
pub use metrics::*;
