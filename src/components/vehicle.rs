//! Vehicle state and lifecycle transitions.

use chrono::{DateTime, FixedOffset};

use crate::battery::Battery;

/// Where a vehicle currently is: parked at a station, or away driving.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleState {
    /// Connected to the named charging station.
    Connected(String),
    /// Away from any station, with an optional estimated return time.
    Away(Option<DateTime<FixedOffset>>),
}

/// A single fleet vehicle: its type reference, its battery, and its
/// connection lifecycle.
#[derive(Debug, Clone)]
pub struct Vehicle {
    /// Name of the [`super::vehicle_type::VehicleType`] this vehicle is.
    pub vehicle_type: String,
    /// The vehicle's own battery.
    pub battery: Battery,
    /// Current connection state.
    pub state: VehicleState,
    /// When the vehicle is expected to next leave its station, if known.
    pub estimated_time_of_departure: Option<DateTime<FixedOffset>>,
    /// Target SoC to reach before departure.
    pub desired_soc: f32,
    /// Optional externally-set per-interval target power (used by the
    /// schedule strategy family).
    pub schedule: Option<f32>,
}

impl Vehicle {
    pub fn new(
        vehicle_type: impl Into<String>,
        battery: Battery,
        connected_charging_station: Option<String>,
        estimated_time_of_departure: Option<DateTime<FixedOffset>>,
        desired_soc: f32,
    ) -> Self {
        assert!(
            (0.0..=1.0).contains(&desired_soc),
            "desired_soc must be in [0, 1]"
        );
        let state = match connected_charging_station {
            Some(cs) => VehicleState::Connected(cs),
            None => VehicleState::Away(None),
        };
        Self {
            vehicle_type: vehicle_type.into(),
            battery,
            state,
            estimated_time_of_departure,
            desired_soc,
            schedule: None,
        }
    }

    /// The station this vehicle is currently connected to, if any.
    pub fn connected_station(&self) -> Option<&str> {
        match &self.state {
            VehicleState::Connected(cs) => Some(cs.as_str()),
            VehicleState::Away(_) => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, VehicleState::Connected(_))
    }

    /// Applies an arrival event: attaches to `station`, updates the
    /// departure estimate and desired SoC, and applies `soc_delta` (the
    /// signed energy change from driving while away).
    ///
    /// `soc_delta` is expected to be `<= 0`. If the resulting SoC would
    /// go negative and `allow_negative_soc` is false, it is clamped to
    /// zero; the caller (the stepper) is responsible for surfacing the
    /// negative-SoC condition per the configured policy before calling
    /// this with a clamp decision already made.
    pub fn arrive(
        &mut self,
        station: impl Into<String>,
        estimated_time_of_departure: Option<DateTime<FixedOffset>>,
        desired_soc: Option<f32>,
        soc_delta: f32,
        allow_negative_soc: bool,
    ) {
        let new_soc = self.battery.soc + soc_delta;
        self.battery.soc = if allow_negative_soc {
            new_soc.min(1.0)
        } else {
            new_soc.clamp(0.0, 1.0)
        };
        self.state = VehicleState::Connected(station.into());
        self.estimated_time_of_departure = estimated_time_of_departure;
        if let Some(soc) = desired_soc {
            self.desired_soc = soc;
        }
    }

    /// Applies a departure event: detaches from its station, recording
    /// an estimated return time if known.
    pub fn depart(&mut self, estimated_time_of_arrival: Option<DateTime<FixedOffset>>) {
        self.state = VehicleState::Away(estimated_time_of_arrival);
        self.estimated_time_of_departure = None;
    }
}
