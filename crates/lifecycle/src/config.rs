use std::time::Duration;

use formats::GeoPoint;

use crate::factory::{ViewOptions, ViewRegion};

/// Tunables for one map view.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub region: ViewRegion,
    pub center: GeoPoint,
    pub zoom: u8,
    /// Substitute the built-in sample dataset when a fetch fails.
    pub fallback_enabled: bool,
    /// Pause between tearing down a resource and starting the next generation.
    pub settle_delay: Duration,
    /// `None` waits on a fetch indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            region: ViewRegion::new("map"),
            // Jharkhand, roughly centered on Ranchi.
            center: GeoPoint::new(85.2799, 23.6102),
            zoom: 7,
            fallback_enabled: true,
            settle_delay: Duration::from_millis(50),
            fetch_timeout: None,
        }
    }
}

impl ControllerConfig {
    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            center: self.center,
            zoom: self.zoom,
        }
    }
}
