//! The mutable view over scenario state a strategy receives for one
//! interval.
//!
//! `World` borrows out of [`crate::scenario::Scenario`] rather than being
//! owned by it, so a strategy step can mutate components without the
//! scenario itself needing strategy-specific accessors.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

use crate::components::{
    ChargingStation, GridConnector, Photovoltaic, StationaryBattery, Vehicle, VehicleType,
};
use crate::events::EventQueue;

pub struct World<'a> {
    pub vehicle_types: &'a BTreeMap<String, VehicleType>,
    pub vehicles: &'a mut BTreeMap<String, Vehicle>,
    pub stations: &'a mut BTreeMap<String, ChargingStation>,
    pub grid_connectors: &'a mut BTreeMap<String, GridConnector>,
    pub stationary_batteries: &'a mut BTreeMap<String, StationaryBattery>,
    pub pvs: &'a BTreeMap<String, Photovoltaic>,
    /// Read-only look-ahead for strategies that need upcoming signals
    /// (e.g. balanced-market's price horizon): events already visible
    /// (`signal_time <= current_time`) whether or not yet active.
    pub events: &'a EventQueue,
    pub current_time: DateTime<FixedOffset>,
    pub step_index: usize,
    pub dt_hours: f32,
}

impl<'a> World<'a> {
    /// The vehicle type backing `vehicle`, looked up by name.
    pub fn vehicle_type_of(&self, vehicle: &Vehicle) -> &VehicleType {
        self.vehicle_types
            .get(&vehicle.vehicle_type)
            .expect("vehicle references a vehicle_type validated at scenario load")
    }

    /// Ids of vehicles currently connected to a station attached to `gc`,
    /// in lexicographic order (the crate's fixed iteration-order
    /// convention).
    pub fn connected_vehicles_at(&self, gc: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .vehicles
            .iter()
            .filter(|(_, v)| {
                v.connected_station()
                    .and_then(|cs| self.stations.get(cs))
                    .map(|s| s.parent_grid_connector == gc)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of stationary batteries attached to `gc`, in lexicographic order.
    pub fn stationary_batteries_at(&self, gc: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .stationary_batteries
            .iter()
            .filter(|(_, b)| b.parent_grid_connector == gc)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// All grid connector ids, in lexicographic order.
    pub fn grid_connector_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.grid_connectors.keys().cloned().collect();
        ids.sort();
        ids
    }
}
