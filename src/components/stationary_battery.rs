//! Stationary batteries: grid-side storage, not attached to a vehicle.

use crate::battery::Battery;

/// A battery attached directly to a grid connector rather than a vehicle.
///
/// Strategies treat it as a load that can be positive (charging, drawing
/// from the grid) or negative (discharging, feeding the grid).
#[derive(Debug, Clone)]
pub struct StationaryBattery {
    pub parent_grid_connector: String,
    pub battery: Battery,
}

impl StationaryBattery {
    pub fn new(parent_grid_connector: impl Into<String>, battery: Battery) -> Self {
        Self {
            parent_grid_connector: parent_grid_connector.into(),
            battery,
        }
    }
}
