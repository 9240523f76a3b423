//! Distributed: a multi-GC fleet where stations are tagged `depot` or
//! `opp` (opportunity charging) by name suffix. Opportunity stations
//! charge greedily; depot stations are rationed to whichever vehicles
//! are lowest on SoC when physical stations are scarcer than vehicles.

use crate::strategy::balanced::minimal_constant_power;
use crate::strategy::base::{clamp_power, distribute_surplus};
use crate::strategy::greedy::check_overload;
use crate::strategy::StepReport;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StationKind {
    Depot,
    Opportunity,
}

fn station_kind(station_id: &str) -> StationKind {
    if station_id.ends_with("_depot") {
        StationKind::Depot
    } else {
        StationKind::Opportunity
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistributedStrategy;

impl DistributedStrategy {
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

    fn step_gc(&mut self, world: &mut World, gc: &str) {
        let candidates = world.connected_vehicles_at(gc);
        let (opp, depot): (Vec<String>, Vec<String>) = candidates.into_iter().partition(|id| {
            world.vehicles[id]
                .connected_station()
                .map(|cs| station_kind(cs) == StationKind::Opportunity)
                .unwrap_or(true)
        });

        self.charge_greedy(world, gc, &opp);
        self.charge_depot(world, gc, &depot);

        distribute_surplus(world, gc);
    }

    fn charge_greedy(&mut self, world: &mut World, gc: &str, vehicle_ids: &[String]) {
        let mut ordered = vehicle_ids.to_vec();
        ordered.sort_by(|a, b| {
            let va = &world.vehicles[a];
            let vb = &world.vehicles[b];
            let below_a = va.battery.soc < va.desired_soc;
            let below_b = vb.battery.soc < vb.desired_soc;
            below_b.cmp(&below_a)
        });
        for vehicle_id in ordered {
            let vehicle = &world.vehicles[&vehicle_id];
            let soc = vehicle.battery.soc;
            if soc >= vehicle.desired_soc {
                continue;
            }
            let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
            let requested = vt.charging_curve.power_at(soc);
            self.dispatch(world, gc, &vehicle_id, requested);
        }
    }

    /// Rations depot stations: when there are fewer physical depot
    /// stations than vehicles waiting for one, only the lowest-SoC
    /// vehicles (as many as there are reserved slots) charge this
    /// interval, with the remainder held until a slot frees up or they
    /// depart.
    fn charge_depot(&mut self, world: &mut World, gc: &str, vehicle_ids: &[String]) {
        let depot_station_count = world
            .stations
            .iter()
            .filter(|(id, s)| s.parent_grid_connector == gc && station_kind(id) == StationKind::Depot)
            .count();

        let mut ordered = vehicle_ids.to_vec();
        ordered.sort_by(|a, b| {
            world.vehicles[a]
                .battery
                .soc
                .partial_cmp(&world.vehicles[b].battery.soc)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let rationed: Vec<String> = ordered.into_iter().take(depot_station_count).collect();

        for vehicle_id in rationed {
            let vehicle = &world.vehicles[&vehicle_id];
            let soc = vehicle.battery.soc;
            let desired = vehicle.desired_soc;
            if soc >= desired {
                continue;
            }
            let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
            let requested = match vehicle.estimated_time_of_departure {
                Some(departure) => {
                    let standing_hours = (departure - world.current_time).num_seconds() as f32 / 3600.0;
                    if standing_hours <= 0.0 {
                        vt.charging_curve.power_at(soc)
                    } else {
                        minimal_constant_power(soc, desired, vehicle.battery.efficiency, &vt.charging_curve, vehicle.battery.capacity_kwh, standing_hours)
                    }
                }
                None => vt.charging_curve.power_at(soc),
            };
            self.dispatch(world, gc, &vehicle_id, requested);
        }
    }

    fn dispatch(&mut self, world: &mut World, gc: &str, vehicle_id: &str, requested: f32) {
        if requested <= 0.0 {
            return;
        }
        let vehicle = &world.vehicles[vehicle_id];
        let soc = vehicle.battery.soc;
        let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
        let station_id = match vehicle.connected_station() {
            Some(s) => s.to_string(),
            None => return,
        };
        let gc_headroom = world.grid_connectors[gc].headroom(None);
        let power = {
            let station = &world.stations[&station_id];
            clamp_power(requested, station, &vt, soc, gc_headroom)
        };
        if power <= 0.0 {
            return;
        }
        let dt = world.dt_hours;
        let (actual, _) = world
            .vehicles
            .get_mut(vehicle_id)
            .expect("candidate vehicle exists")
            .battery
            .load(power, dt);
        if actual > 0.0 {
            world.stations.get_mut(&station_id).expect("station exists").current_power += actual;
            world
                .grid_connectors
                .get_mut(gc)
                .expect("gc exists")
                .add_load(format!("cs:{station_id}"), actual);
        }
    }
}
