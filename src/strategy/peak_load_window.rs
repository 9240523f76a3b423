//! Peak-load-window: keep power inside designated peak windows below the
//! fixed-load ceiling observed there, falling back to balanced charging
//! outside them.

use crate::strategy::balanced::BalancedStrategy;
use crate::strategy::base::{clamp_power, distribute_surplus};
use crate::strategy::greedy::check_overload;
use crate::strategy::StepReport;
use crate::world::World;

#[derive(Debug, Clone, Default)]
pub struct PeakLoadWindowStrategy;

impl PeakLoadWindowStrategy {
    pub fn step(&mut self, world: &mut World) -> StepReport {
        let mut overloads = Vec::new();
        for gc in world.grid_connector_ids() {
            if world.grid_connectors[&gc].is_peak_window(world.step_index) {
                self.step_gc_in_window(world, &gc);
            } else {
                let mut fallback = BalancedStrategy;
                fallback.step_gc_pub(world, &gc);
            }
            if let Some(overload) = check_overload(world, &gc) {
                overloads.push(overload);
            }
        }
        StepReport { overloads }
    }

    /// Inside a peak window: the ceiling is the non-vehicle load already
    /// present on the connector (fixed load and local generation net),
    /// since that load cannot be shed. Vehicles only draw from whatever
    /// headroom remains below that ceiling, rationed towards whichever
    /// vehicles would otherwise miss their departure target. Stationary
    /// batteries discharge to help hold the ceiling, on the assumption
    /// they refill outside the window once it ends.
    fn step_gc_in_window(&mut self, world: &mut World, gc: &str) {
        let ceiling = world.grid_connectors[gc].current_load().max(0.0);

        // Discharge every stationary battery to push the connector's load
        // below the ceiling, opening headroom for urgent vehicle draws.
        for battery_id in world.stationary_batteries_at(gc) {
            let dt = world.dt_hours;
            let battery = &mut world
                .stationary_batteries
                .get_mut(&battery_id)
                .expect("listed battery exists")
                .battery;
            let available = battery.available_power(dt, 0.0);
            if available <= 0.0 {
                continue;
            }
            let (actual, _) = battery.unload(available, dt, 0.0);
            if actual > 0.0 {
                world
                    .grid_connectors
                    .get_mut(gc)
                    .expect("gc exists")
                    .add_load(format!("battery:{battery_id}"), -actual);
            }
        }

        // Only the energy strictly required to avoid missing a departure
        // is allowed to draw against the ceiling's remaining headroom.
        let mut candidates = world.connected_vehicles_at(gc);
        candidates.sort_by(|a, b| {
            let va = &world.vehicles[a];
            let vb = &world.vehicles[b];
            match (va.estimated_time_of_departure, vb.estimated_time_of_departure) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });

        for vehicle_id in candidates {
            let vehicle = &world.vehicles[&vehicle_id];
            let Some(departure) = vehicle.estimated_time_of_departure else {
                continue;
            };
            if vehicle.battery.soc >= vehicle.desired_soc {
                continue;
            }
            let standing_hours = (departure - world.current_time).num_seconds() as f32 / 3600.0;
            if standing_hours <= world.dt_hours {
                let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
                let soc = vehicle.battery.soc;
                let station_id = match vehicle.connected_station() {
                    Some(s) => s.to_string(),
                    None => continue,
                };
                let connector = &world.grid_connectors[gc];
                let window_headroom = (ceiling - connector.current_load()).max(0.0);
                let gc_headroom = connector.headroom(None).min(window_headroom);
                let requested = vt.charging_curve.power_at(soc);
                let power = {
                    let station = &world.stations[&station_id];
                    clamp_power(requested, station, &vt, soc, gc_headroom)
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
                    world.stations.get_mut(&station_id).expect("station exists").current_power += actual;
                    world
                        .grid_connectors
                        .get_mut(gc)
                        .expect("gc exists")
                        .add_load(format!("cs:{station_id}"), actual);
                }
            }
        }

        distribute_surplus(world, gc);
    }
}
