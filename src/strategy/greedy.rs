//! The greedy strategy: charge every vehicle as fast as it is allowed to
//! until it reaches its desired SoC.

use crate::strategy::base::{clamp_power, distribute_surplus};
use crate::strategy::{Overload, StepReport};
use crate::world::World;

/// Price (in the scenario's cost unit) at or below which Greedy will keep
/// charging a vehicle past its desired SoC — i.e. only when energy is
/// free or the grid operator is effectively paying for consumption.
pub const PRICE_THRESHOLD: f32 = 0.0;

#[derive(Debug, Clone, Default)]
pub struct GreedyStrategy;

impl GreedyStrategy {
    pub fn step(&mut self, world: &mut World) -> StepReport {
        let mut overloads = Vec::new();
        for gc in world.grid_connector_ids() {
            self.step_gc(world, &gc);
            if let Some(overload) = check_overload(world, &gc) {
                overloads.push(overload);
            }
        }
        StepReport { overloads }
    }

    /// Entry point for other strategies that fall back to plain greedy
    /// charging on a single grid connector (e.g. flex-window when a
    /// connector carries no window mask).
    pub(crate) fn step_gc_pub(&mut self, world: &mut World, gc: &str) {
        self.step_gc(world, gc);
    }

    fn step_gc(&mut self, world: &mut World, gc: &str) {
        let mut candidates = world.connected_vehicles_at(gc);
        let current_load = world
            .grid_connectors
            .get(gc)
            .map(|g| g.current_load())
            .unwrap_or(0.0);
        let price = world
            .grid_connectors
            .get(gc)
            .map(|g| g.cost.evaluate(current_load))
            .unwrap_or(0.0);
        let surplus_present = world
            .grid_connectors
            .get(gc)
            .map(|g| g.current_load() < 0.0)
            .unwrap_or(false);
        let allow_exceed = price <= PRICE_THRESHOLD || surplus_present;

        candidates.sort_by(|a, b| {
            let va = &world.vehicles[a];
            let vb = &world.vehicles[b];
            let below_a = va.battery.soc < va.desired_soc;
            let below_b = vb.battery.soc < vb.desired_soc;
            below_b
                .cmp(&below_a)
                .then_with(|| match (va.estimated_time_of_departure, vb.estimated_time_of_departure) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
        });

        for vehicle_id in candidates {
            let vehicle_type_name = world.vehicles[&vehicle_id].vehicle_type.clone();
            let soc = world.vehicles[&vehicle_id].battery.soc;
            let desired = world.vehicles[&vehicle_id].desired_soc;
            if soc >= desired && !allow_exceed {
                continue;
            }
            let station_id = match world.vehicles[&vehicle_id].connected_station() {
                Some(s) => s.to_string(),
                None => continue,
            };
            let vehicle_type = world.vehicle_types[&vehicle_type_name].clone();
            let requested = vehicle_type.charging_curve.power_at(soc);
            let gc_headroom = world.grid_connectors[gc].headroom(None);
            let power = {
                let station = &world.stations[&station_id];
                clamp_power(requested, station, &vehicle_type, soc, gc_headroom)
            };
            if power <= 0.0 {
                continue;
            }
            let dt = world.dt_hours;
            let (actual, _) = world
                .vehicles
                .get_mut(&vehicle_id)
                .expect("candidate vehicle exists")
                .battery
                .load(power, dt);
            if actual > 0.0 {
                world
                    .stations
                    .get_mut(&station_id)
                    .expect("station exists")
                    .current_power += actual;
                world
                    .grid_connectors
                    .get_mut(gc)
                    .expect("gc exists")
                    .add_load(format!("cs:{station_id}"), actual);
            }
        }

        distribute_surplus(world, gc);
    }
}

pub(crate) fn check_overload(world: &World, gc: &str) -> Option<Overload> {
    let connector = world.grid_connectors.get(gc)?;
    let max = connector.max_power?;
    let load = connector.current_load();
    if load > max + crate::battery::EPS {
        Some(Overload {
            grid_connector: gc.to_string(),
            load_kw: load,
            max_kw: max,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::Battery;
    use crate::components::{ChargingStation, Cost, GridConnector, Vehicle, VehicleType, VoltageLevel};
    use crate::curve::LoadingCurve;
    use std::collections::BTreeMap;

    fn world_fixture() -> (
        BTreeMap<String, VehicleType>,
        BTreeMap<String, Vehicle>,
        BTreeMap<String, ChargingStation>,
        BTreeMap<String, GridConnector>,
        BTreeMap<String, crate::components::StationaryBattery>,
        BTreeMap<String, crate::components::Photovoltaic>,
    ) {
        let mut vehicle_types = BTreeMap::new();
        vehicle_types.insert(
            "e_golf".to_string(),
            VehicleType::new(50.0, 18.0, LoadingCurve::constant(22.0), 0.0, false, 0.0, 0.0, 0.95),
        );
        let vehicles = BTreeMap::new();
        let mut stations = BTreeMap::new();
        stations.insert("cs1".to_string(), ChargingStation::new("gc1", 22.0, 0.0));
        let mut grid_connectors = BTreeMap::new();
        let mut gc = GridConnector::new(Some(100.0), VoltageLevel::LowVoltage);
        gc.set_cost(Cost::Fixed(0.3));
        grid_connectors.insert("gc1".to_string(), gc);
        (
            vehicle_types,
            vehicles,
            stations,
            grid_connectors,
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn single_vehicle_greedy_no_load_reaches_expected_soc() {
        let (vehicle_types, mut vehicles, mut stations, mut grid_connectors, mut sb, pvs) =
            world_fixture();
        vehicles.insert(
            "car1".to_string(),
            Vehicle::new(
                "e_golf",
                Battery::new(50.0, 0.5, 0.95, LoadingCurve::constant(22.0), false),
                Some("cs1".to_string()),
                None,
                0.8,
            ),
        );
        let events = crate::events::EventQueue::new();
        let mut world = World {
            vehicle_types: &vehicle_types,
            vehicles: &mut vehicles,
            stations: &mut stations,
            grid_connectors: &mut grid_connectors,
            stationary_batteries: &mut sb,
            pvs: &pvs,
            events: &events,
            current_time: chrono::Utc::now().into(),
            step_index: 0,
            dt_hours: 0.25,
        };
        let mut strategy = GreedyStrategy;
        let report = strategy.step(&mut world);
        assert!(report.overloads.is_empty());
        let soc = world.vehicles["car1"].battery.soc;
        // 22 kW for 0.25h at eta=0.95 stored on a 50kWh battery from 0.5
        let expected = 0.5 + (22.0_f32.min(22.0) * 0.25 * 0.95) / 50.0;
        assert!((soc - expected).abs() < 1e-4);
    }

    #[test]
    fn gc_cap_splits_between_two_vehicles() {
        let (vehicle_types, mut vehicles, mut stations, mut grid_connectors, mut sb, pvs) =
            world_fixture();
        stations.insert("cs2".to_string(), ChargingStation::new("gc1", 22.0, 0.0));
        grid_connectors.get_mut("gc1").unwrap().set_max_power(Some(5.0));
        vehicles.insert(
            "car1".to_string(),
            Vehicle::new(
                "e_golf",
                Battery::new(50.0, 0.2, 0.95, LoadingCurve::constant(22.0), false),
                Some("cs1".to_string()),
                None,
                0.8,
            ),
        );
        vehicles.insert(
            "car2".to_string(),
            Vehicle::new(
                "e_golf",
                Battery::new(50.0, 0.2, 0.95, LoadingCurve::constant(22.0), false),
                Some("cs2".to_string()),
                None,
                0.8,
            ),
        );
        let events = crate::events::EventQueue::new();
        let mut world = World {
            vehicle_types: &vehicle_types,
            vehicles: &mut vehicles,
            stations: &mut stations,
            grid_connectors: &mut grid_connectors,
            stationary_batteries: &mut sb,
            pvs: &pvs,
            events: &events,
            current_time: chrono::Utc::now().into(),
            step_index: 0,
            dt_hours: 0.25,
        };
        let mut strategy = GreedyStrategy;
        let report = strategy.step(&mut world);
        assert!(report.overloads.is_empty());
        let total_load = world.grid_connectors["gc1"].current_load();
        assert!(total_load <= 5.0 + 1e-3);
    }
}
