//! Typed scenario entities: vehicles, stations, grid connectors,
//! stationary batteries and PV, each referenced by a string id and owned
//! by the [`crate::scenario::Scenario`] arena.

pub mod grid_connector;
pub mod pv;
pub mod station;
pub mod stationary_battery;
pub mod vehicle;
pub mod vehicle_type;

pub use grid_connector::{Cost, GridConnector, VoltageLevel};
pub use pv::Photovoltaic;
pub use station::{ChargingStation, StationState};
pub use stationary_battery::StationaryBattery;
pub use vehicle::{Vehicle, VehicleState};
pub use vehicle_type::VehicleType;
