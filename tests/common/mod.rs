//! Shared fixtures for the end-to-end scenario tests.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, TimeZone};

use spice_ev::battery::Battery;
use spice_ev::components::{ChargingStation, Cost, GridConnector, Vehicle, VehicleType, VoltageLevel};
use spice_ev::curve::LoadingCurve;
use spice_ev::events::EventQueue;
use spice_ev::scenario::{NegativeSocPolicy, Scenario};
use spice_ev::strategy::Strategy;

/// Midnight UTC on an arbitrary fixed date, used as every scenario's start time.
pub fn t(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 1, hour, minute, 0)
        .unwrap()
}

/// An everyday EV: a 50 kWh e-Golf-like vehicle type with a flat 22 kW
/// charging curve, 95% round-trip efficiency.
pub fn e_golf() -> VehicleType {
    VehicleType::new(50.0, 18.0, LoadingCurve::constant(22.0), 0.0, false, 0.0, 0.0, 0.95)
}

/// A 70 kWh V2G-capable Sprinter-like van: `discharge_limit=0.5`,
/// `v2g_power_factor=0.5`, flat 11 kW curve.
pub fn v2g_sprinter() -> VehicleType {
    VehicleType::new(70.0, 20.0, LoadingCurve::constant(11.0), 0.0, true, 0.5, 0.5, 0.95)
}

/// Builds a one-vehicle, one-station, one-GC `Scenario` ready to `run()`.
#[allow(clippy::too_many_arguments)]
pub fn single_vehicle_scenario(
    vehicle_type: VehicleType,
    soc: f32,
    desired_soc: f32,
    estimated_time_of_departure: Option<DateTime<FixedOffset>>,
    station_max_power: f32,
    gc_max_power: Option<f32>,
    gc_cost: Cost,
    strategy: Strategy,
    interval_minutes: u32,
    n_intervals: u32,
) -> Scenario {
    let mut vehicle_types = BTreeMap::new();
    vehicle_types.insert("vt1".to_string(), vehicle_type.clone());

    let mut vehicles = BTreeMap::new();
    vehicles.insert(
        "car1".to_string(),
        Vehicle::new(
            "vt1",
            Battery::new(vehicle_type.capacity_kwh, soc, vehicle_type.battery_efficiency, vehicle_type.charging_curve.clone(), false),
            Some("cs1".to_string()),
            estimated_time_of_departure,
            desired_soc,
        ),
    );

    let mut stations = BTreeMap::new();
    stations.insert("cs1".to_string(), ChargingStation::new("gc1", station_max_power, 0.0));
    stations.get_mut("cs1").unwrap().occupy("car1".to_string());

    let mut grid_connectors = BTreeMap::new();
    let mut gc = GridConnector::new(gc_max_power, VoltageLevel::LowVoltage);
    gc.set_cost(gc_cost);
    grid_connectors.insert("gc1".to_string(), gc);

    Scenario::new(
        vehicle_types,
        vehicles,
        stations,
        grid_connectors,
        BTreeMap::new(),
        BTreeMap::new(),
        EventQueue::new(),
        strategy,
        t(0, 0),
        interval_minutes,
        n_intervals,
        NegativeSocPolicy::Abort,
    )
}

/// Builds a two-vehicle, two-station, shared-GC `Scenario` (the GC-cap
/// contention case).
pub fn two_vehicle_shared_gc_scenario(
    vehicle_type: VehicleType,
    soc_each: f32,
    desired_soc: f32,
    station_max_power: f32,
    gc_max_power: f32,
    strategy: Strategy,
    interval_minutes: u32,
    n_intervals: u32,
) -> Scenario {
    let mut vehicle_types = BTreeMap::new();
    vehicle_types.insert("vt1".to_string(), vehicle_type.clone());

    let mut vehicles = BTreeMap::new();
    for (car, cs) in [("car1", "cs1"), ("car2", "cs2")] {
        vehicles.insert(
            car.to_string(),
            Vehicle::new(
                "vt1",
                Battery::new(vehicle_type.capacity_kwh, soc_each, vehicle_type.battery_efficiency, vehicle_type.charging_curve.clone(), false),
                Some(cs.to_string()),
                None,
                desired_soc,
            ),
        );
    }

    let mut stations = BTreeMap::new();
    for (cs, car) in [("cs1", "car1"), ("cs2", "car2")] {
        let mut station = ChargingStation::new("gc1", station_max_power, 0.0);
        station.occupy(car.to_string());
        stations.insert(cs.to_string(), station);
    }

    let mut grid_connectors = BTreeMap::new();
    let mut gc = GridConnector::new(Some(gc_max_power), VoltageLevel::LowVoltage);
    gc.set_cost(Cost::Fixed(0.3));
    grid_connectors.insert("gc1".to_string(), gc);

    Scenario::new(
        vehicle_types,
        vehicles,
        stations,
        grid_connectors,
        BTreeMap::new(),
        BTreeMap::new(),
        EventQueue::new(),
        strategy,
        t(0, 0),
        interval_minutes,
        n_intervals,
        NegativeSocPolicy::Abort,
    )
}

