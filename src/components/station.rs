//! Charging stations: the per-vehicle interface below a grid connector.

/// Occupancy state of a charging station.
#[derive(Debug, Clone, PartialEq)]
pub enum StationState {
    Free,
    Occupied(String),
}

/// A single charging point attached to a grid connector.
#[derive(Debug, Clone)]
pub struct ChargingStation {
    /// Id of the owning [`super::grid_connector::GridConnector`].
    pub parent_grid_connector: String,
    /// Maximum power this station can deliver, in kW.
    pub max_power: f32,
    /// Minimum power below which the station refuses to charge at all.
    pub min_power: f32,
    /// Power assigned by the strategy for the current interval.
    pub current_power: f32,
    pub state: StationState,
}

impl ChargingStation {
    pub fn new(parent_grid_connector: impl Into<String>, max_power: f32, min_power: f32) -> Self {
        assert!(max_power >= 0.0, "station max_power must be non-negative");
        assert!(
            min_power >= 0.0 && min_power <= max_power,
            "station min_power must be in [0, max_power]"
        );
        Self {
            parent_grid_connector: parent_grid_connector.into(),
            max_power,
            min_power,
            current_power: 0.0,
            state: StationState::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self.state, StationState::Free)
    }

    pub fn occupant(&self) -> Option<&str> {
        match &self.state {
            StationState::Occupied(id) => Some(id.as_str()),
            StationState::Free => None,
        }
    }

    pub fn occupy(&mut self, vehicle_id: impl Into<String>) {
        self.state = StationState::Occupied(vehicle_id.into());
    }

    pub fn free(&mut self) {
        self.state = StationState::Free;
        self.current_power = 0.0;
    }
}
