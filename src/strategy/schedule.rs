//! The schedule strategy: follow a grid connector's externally supplied
//! per-interval target power, distributed over the fleet either
//! collectively or individually.

use chrono::{NaiveTime, Timelike};

use crate::strategy::balanced::{minimal_constant_power, BalancedStrategy};
use crate::strategy::base::{clamp_power, distribute_surplus, v2g_discharge_power};
use crate::strategy::greedy::check_overload;
use crate::strategy::StepReport;
use crate::world::World;

/// A recurring daily window during which every vehicle on this schedule
/// is expected to be present (e.g. a depot's overnight core time).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreStandingTime {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl CoreStandingTime {
    /// Whether `time`'s time-of-day falls inside the window. Windows that
    /// wrap past midnight (`start > end`) are supported.
    pub fn contains(&self, time: chrono::DateTime<chrono::FixedOffset>) -> bool {
        let t = time.time();
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    /// Hours remaining until the window's end, from `time`'s time-of-day.
    pub fn hours_until_end(&self, time: chrono::DateTime<chrono::FixedOffset>) -> f32 {
        let t = time.time();
        let end_seconds = self.end.num_seconds_from_midnight() as i64;
        let mut now_seconds = t.num_seconds_from_midnight() as i64;
        if now_seconds > end_seconds {
            now_seconds -= 24 * 3600;
        }
        (end_seconds - now_seconds) as f32 / 3600.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// The GC's target is split across the fleet as one pool.
    Collective,
    /// Each vehicle gets its own share of the target, proportional to
    /// its remaining energy need.
    Individual,
}

#[derive(Debug, Clone)]
pub struct ScheduleStrategy {
    pub mode: ScheduleMode,
    pub core_standing_time: Option<CoreStandingTime>,
}

impl Default for ScheduleStrategy {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::Collective,
            core_standing_time: None,
        }
    }
}

impl ScheduleStrategy {
    pub fn step(&mut self, world: &mut World) -> StepReport {
        let mut overloads = Vec::new();
        for gc in world.grid_connector_ids() {
            let target = world.grid_connectors[&gc].grid_operator_schedule;
            match target {
                None => {
                    tracing::info!(gc = %gc, "schedule: no target set, falling back to balanced");
                    let mut fallback = BalancedStrategy;
                    fallback.step_gc_pub(world, &gc);
                }
                Some(target_kw) => self.step_gc(world, &gc, target_kw),
            }
            if let Some(overload) = check_overload(world, &gc) {
                overloads.push(overload);
            }
        }
        StepReport { overloads }
    }

    fn step_gc(&mut self, world: &mut World, gc: &str, target_kw: f32) {
        let candidates = world.connected_vehicles_at(gc);
        let now = world.current_time;

        let mut wanted: Vec<(String, f32)> = Vec::with_capacity(candidates.len());
        for vehicle_id in &candidates {
            let vehicle = &world.vehicles[vehicle_id];
            if vehicle.battery.soc >= vehicle.desired_soc {
                wanted.push((vehicle_id.clone(), 0.0));
                continue;
            }
            let vt = &world.vehicle_types[&vehicle.vehicle_type];
            let standing_hours = match (vehicle.estimated_time_of_departure, self.core_standing_time) {
                (_, Some(core)) if core.contains(now) => core.hours_until_end(now).max(world.dt_hours),
                (Some(departure), _) => ((departure - now).num_seconds() as f32 / 3600.0).max(0.0),
                (None, None) => 0.0,
            };
            let p = if standing_hours > 0.0 {
                minimal_constant_power(
                    vehicle.battery.soc,
                    vehicle.desired_soc,
                    vehicle.battery.efficiency,
                    &vt.charging_curve,
                    vehicle.battery.capacity_kwh,
                    standing_hours,
                )
            } else {
                vt.charging_curve.power_at(vehicle.battery.soc)
            };
            wanted.push((vehicle_id.clone(), p));
        }

        let allocations = match self.mode {
            ScheduleMode::Collective => {
                let sum: f32 = wanted.iter().map(|(_, p)| *p).sum();
                if sum <= target_kw || sum <= 0.0 {
                    // Under (or meeting) target: deviation is permitted, give
                    // each vehicle what it asked for.
                    wanted
                } else {
                    let scale = target_kw / sum;
                    wanted.into_iter().map(|(id, p)| (id, p * scale)).collect()
                }
            }
            ScheduleMode::Individual => {
                let need_sum: f32 = candidates
                    .iter()
                    .map(|id| {
                        let v = &world.vehicles[id];
                        (v.desired_soc - v.battery.soc).max(0.0)
                    })
                    .sum();
                if need_sum <= 0.0 {
                    wanted.into_iter().map(|(id, _)| (id, 0.0)).collect()
                } else {
                    candidates
                        .iter()
                        .map(|id| {
                            let v = &world.vehicles[id];
                            let need = (v.desired_soc - v.battery.soc).max(0.0);
                            let share = target_kw * need / need_sum;
                            let cap = wanted.iter().find(|(wid, _)| wid == id).map(|(_, p)| *p).unwrap_or(0.0);
                            (id.clone(), share.min(cap))
                        })
                        .collect()
                }
            }
        };

        for (vehicle_id, requested) in allocations {
            if requested <= 0.0 {
                continue;
            }
            let vehicle = &world.vehicles[&vehicle_id];
            let soc = vehicle.battery.soc;
            let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
            let station_id = match vehicle.connected_station() {
                Some(s) => s.to_string(),
                None => continue,
            };
            let gc_headroom = world.grid_connectors[gc].headroom(None);
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

        self.apply_v2g(world, gc, target_kw);
        distribute_surplus(world, gc);
    }

    /// Offers V2G discharge from connected vehicles when the GC is still
    /// above its target after charging allocation (the target itself acts
    /// as the price signal a schedule-driven GC would otherwise carry).
    fn apply_v2g(&mut self, world: &mut World, gc: &str, target_kw: f32) {
        let over_target = world.grid_connectors[gc].current_load() > target_kw;
        if !over_target {
            return;
        }
        let dt = world.dt_hours;
        let now = world.current_time;
        for vehicle_id in world.connected_vehicles_at(gc) {
            let vehicle = &world.vehicles[&vehicle_id];
            let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
            let power = v2g_discharge_power(vehicle, &vt, now, dt, true);
            if power <= 0.0 {
                continue;
            }
            let station_id = match vehicle.connected_station() {
                Some(s) => s.to_string(),
                None => continue,
            };
            let station_max = world.stations.get(&station_id).map(|s| s.max_power).unwrap_or(0.0);
            let power = power.min(station_max);
            if power <= 0.0 {
                continue;
            }
            let (actual, _) = world
                .vehicles
                .get_mut(&vehicle_id)
                .expect("candidate vehicle exists")
                .battery
                .unload(power, dt, vt.discharge_limit);
            if actual > 0.0 {
                world.stations.get_mut(&station_id).expect("station exists").current_power -= actual;
                world
                    .grid_connectors
                    .get_mut(gc)
                    .expect("gc exists")
                    .add_load(format!("cs:{station_id}"), -actual);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::Battery;
    use crate::components::{ChargingStation, Cost, GridConnector, Vehicle, VehicleType, VoltageLevel};
    use crate::curve::LoadingCurve;
    use chrono::{FixedOffset, TimeZone};
    use std::collections::BTreeMap;

    fn t(hour: u32) -> chrono::DateTime<FixedOffset> {
        FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn core_standing_time_wraps_past_midnight() {
        let core = CoreStandingTime {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        assert!(core.contains(t(23)));
        assert!(core.contains(t(2)));
        assert!(!core.contains(t(12)));
    }

    #[test]
    fn collective_mode_scales_down_proportionally_when_oversubscribed() {
        let mut vehicle_types = BTreeMap::new();
        vehicle_types.insert(
            "e_golf".to_string(),
            VehicleType::new(50.0, 18.0, LoadingCurve::constant(22.0), 0.0, false, 0.0, 0.0, 0.95),
        );
        let mut vehicles = BTreeMap::new();
        vehicles.insert(
            "car1".to_string(),
            Vehicle::new("e_golf", Battery::new(50.0, 0.2, 0.95, LoadingCurve::constant(22.0), false), Some("cs1".to_string()), Some(t(1)), 0.8),
        );
        vehicles.insert(
            "car2".to_string(),
            Vehicle::new("e_golf", Battery::new(50.0, 0.2, 0.95, LoadingCurve::constant(22.0), false), Some("cs2".to_string()), Some(t(1)), 0.8),
        );
        let mut stations = BTreeMap::new();
        stations.insert("cs1".to_string(), ChargingStation::new("gc1", 22.0, 0.0));
        stations.insert("cs2".to_string(), ChargingStation::new("gc1", 22.0, 0.0));
        let mut grid_connectors = BTreeMap::new();
        let mut gc = GridConnector::new(Some(100.0), VoltageLevel::LowVoltage);
        gc.set_cost(Cost::Fixed(0.2));
        gc.set_schedule(Some(10.0));
        grid_connectors.insert("gc1".to_string(), gc);
        let mut sb = BTreeMap::new();
        let pvs = BTreeMap::new();
        let events = crate::events::EventQueue::new();

        let mut world = World {
            vehicle_types: &vehicle_types,
            vehicles: &mut vehicles,
            stations: &mut stations,
            grid_connectors: &mut grid_connectors,
            stationary_batteries: &mut sb,
            pvs: &pvs,
            events: &events,
            current_time: t(0),
            step_index: 0,
            dt_hours: 0.25,
        };
        let mut strategy = ScheduleStrategy::default();
        strategy.step(&mut world);
        let total = world.grid_connectors["gc1"].current_load();
        assert!(total <= 10.0 + 1e-2);
    }
}
