//! The time loop: owns every component, applies events, drives the
//! active strategy, and records the resulting time series.
//!
//! A numbered-phase `step` procedure over arena-style string-keyed
//! component maps.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, FixedOffset};

use crate::battery;
use crate::components::{
    ChargingStation, GridConnector, Photovoltaic, StationaryBattery, Vehicle, VehicleType,
};
use crate::error::StepError;
use crate::events::{Event, EventQueue};
use crate::report::{self, StepRecord, Summary, SummaryAccumulator};
use crate::strategy::Strategy;
use crate::world::World;

/// How an arrival `soc_delta` that would drive SoC below zero is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeSocPolicy {
    /// Clamp to zero and record a [`StepError::NegativeSoc`] fault for the step.
    #[default]
    Abort,
    /// Let SoC go negative; no fault recorded.
    Continue,
    /// Clamp to zero silently; no fault recorded.
    Reset,
}

/// Owns the whole scenario: components, events, the active strategy, and
/// the timeline parameters. The sole mutable-state owner; [`World`]
/// borrows out of it for one interval at a time.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub vehicle_types: BTreeMap<String, VehicleType>,
    pub vehicles: BTreeMap<String, Vehicle>,
    pub stations: BTreeMap<String, ChargingStation>,
    pub grid_connectors: BTreeMap<String, GridConnector>,
    pub stationary_batteries: BTreeMap<String, StationaryBattery>,
    pub pvs: BTreeMap<String, Photovoltaic>,
    pub events: EventQueue,
    pub strategy: Strategy,
    pub start_time: DateTime<FixedOffset>,
    pub interval_minutes: u32,
    pub n_intervals: u32,
    pub negative_soc_policy: NegativeSocPolicy,
    /// Per-interval rows recorded by the most recent [`Self::run`] call.
    pub records: Vec<StepRecord>,
    current_time: DateTime<FixedOffset>,
    step_index: u32,
    /// Most recently signalled fixed-load value per grid connector per
    /// named source; held constant across steps until overwritten.
    fixed_loads: BTreeMap<String, BTreeMap<String, f32>>,
    /// Same as `fixed_loads` for local generation (PV), held as the
    /// non-negative generated power; entered as negative load.
    local_generation: BTreeMap<String, BTreeMap<String, f32>>,
    /// Dedup set for the "warn once per (component, kind)" non-convergence
    /// policy.
    warned: HashSet<(String, &'static str)>,
}

impl Scenario {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vehicle_types: BTreeMap<String, VehicleType>,
        vehicles: BTreeMap<String, Vehicle>,
        stations: BTreeMap<String, ChargingStation>,
        grid_connectors: BTreeMap<String, GridConnector>,
        stationary_batteries: BTreeMap<String, StationaryBattery>,
        pvs: BTreeMap<String, Photovoltaic>,
        events: EventQueue,
        strategy: Strategy,
        start_time: DateTime<FixedOffset>,
        interval_minutes: u32,
        n_intervals: u32,
        negative_soc_policy: NegativeSocPolicy,
    ) -> Self {
        assert!(interval_minutes > 0, "interval_minutes must be positive");
        Self {
            vehicle_types,
            vehicles,
            stations,
            grid_connectors,
            stationary_batteries,
            pvs,
            events,
            strategy,
            start_time,
            interval_minutes,
            n_intervals,
            negative_soc_policy,
            records: Vec::new(),
            current_time: start_time,
            step_index: 0,
            fixed_loads: BTreeMap::new(),
            local_generation: BTreeMap::new(),
            warned: HashSet::new(),
        }
    }

    pub fn dt_hours(&self) -> f32 {
        self.interval_minutes as f32 / 60.0
    }

    /// Warns once per `(component, kind)` pair across the whole run,
    /// matching the "no spam on repeated identical non-convergence"
    /// policy.
    fn warn_once(&mut self, component: &str, kind: &'static str, message: &str) {
        if self.warned.insert((component.to_string(), kind)) {
            tracing::warn!(component, kind, "{message}");
        }
    }

    /// Runs every remaining interval, returning the aggregated summary.
    /// Per-interval rows accumulate in [`Self::records`] as a side effect,
    /// for callers that also want the persisted time series.
    pub fn run(&mut self) -> Summary {
        let mut faults = Vec::new();
        let mut acc = SummaryAccumulator::new(&self.vehicles, &self.grid_connectors);
        for _ in 0..self.n_intervals {
            let (record, step_faults) = self.step();
            faults.extend(step_faults);
            acc.record_step(self.dt_hours(), &self.vehicles, &self.grid_connectors);
            self.records.push(record);
        }
        acc.finish(faults)
    }

    /// Runs one interval: advance time, apply events, compute baseline
    /// load, dispatch the strategy (which integrates battery energy
    /// inline as it allocates), resolve any overload, and record the row.
    pub fn step(&mut self) -> (StepRecord, Vec<StepError>) {
        let mut faults = Vec::new();
        let step = self.step_index;

        // 1. advance current time by one interval
        self.current_time = self.start_time
            + Duration::minutes(self.interval_minutes as i64 * (step as i64 + 1));

        // 2. apply every event that has started and isn't yet consumed
        for idx in self.events.active_indices_at(self.current_time) {
            if let Some(event) = self.events.get(idx).cloned() {
                self.apply_event(&event, step, &mut faults);
            }
            self.events.consume(idx);
        }

        for gc in self.grid_connectors.values_mut() {
            gc.clear();
        }

        // 3. baseline load: held fixed-load and local-generation values
        for (gc_id, named) in &self.fixed_loads {
            if let Some(gc) = self.grid_connectors.get_mut(gc_id) {
                for (name, kw) in named {
                    gc.add_load(format!("fixed:{name}"), *kw);
                }
            }
        }
        for (gc_id, named) in &self.local_generation {
            if let Some(gc) = self.grid_connectors.get_mut(gc_id) {
                for (name, kw) in named {
                    gc.add_load(format!("pv:{name}"), -*kw);
                }
            }
        }

        // 4 & 5. strategy dispatch (integrates battery energy as it allocates)
        let dt_hours = self.dt_hours();
        let mut world = World {
            vehicle_types: &self.vehicle_types,
            vehicles: &mut self.vehicles,
            stations: &mut self.stations,
            grid_connectors: &mut self.grid_connectors,
            stationary_batteries: &mut self.stationary_batteries,
            pvs: &self.pvs,
            events: &self.events,
            current_time: self.current_time,
            step_index: step as usize,
            dt_hours,
        };
        let report = self.strategy.step(&mut world);

        // 6. resolve any grid connector left over limit, recompute, record
        for overload in &report.overloads {
            if let Some(fault) = self.resolve_overload(&overload.grid_connector, step) {
                faults.push(fault);
            }
        }

        let record = self.record_step(step);
        self.step_index += 1;
        (record, faults)
    }

    fn apply_event(&mut self, event: &Event, step: u32, faults: &mut Vec<StepError>) {
        match event {
            Event::Arrival {
                vehicle,
                station,
                soc_delta,
                estimated_time_of_departure,
                desired_soc,
                ..
            } => {
                if !self.stations.contains_key(station) {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "station",
                        id: station.clone(),
                    });
                    return;
                }
                let Some(v) = self.vehicles.get(vehicle) else {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "vehicle",
                        id: vehicle.clone(),
                    });
                    return;
                };
                let projected = v.battery.soc + soc_delta;
                let allow_negative = self.negative_soc_policy == NegativeSocPolicy::Continue;
                if projected < 0.0 && self.negative_soc_policy == NegativeSocPolicy::Abort {
                    faults.push(StepError::NegativeSoc {
                        vehicle: vehicle.clone(),
                        step,
                        soc: projected,
                    });
                }
                if let Some(v) = self.vehicles.get_mut(vehicle) {
                    v.arrive(
                        station.clone(),
                        *estimated_time_of_departure,
                        *desired_soc,
                        *soc_delta,
                        allow_negative,
                    );
                }
                if let Some(s) = self.stations.get_mut(station) {
                    s.occupy(vehicle.clone());
                }
            }
            Event::Departure {
                vehicle,
                estimated_time_of_arrival,
                ..
            } => {
                let Some(v) = self.vehicles.get_mut(vehicle) else {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "vehicle",
                        id: vehicle.clone(),
                    });
                    return;
                };
                let cs = v.connected_station().map(|s| s.to_string());
                v.depart(*estimated_time_of_arrival);
                if let Some(cs) = cs {
                    if let Some(s) = self.stations.get_mut(&cs) {
                        s.free();
                    }
                }
            }
            Event::FixedLoadUpdate {
                grid_connector,
                name,
                power_kw,
                ..
            } => {
                if !self.grid_connectors.contains_key(grid_connector) {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "grid_connector",
                        id: grid_connector.clone(),
                    });
                    return;
                }
                self.fixed_loads
                    .entry(grid_connector.clone())
                    .or_default()
                    .insert(name.clone(), *power_kw);
            }
            Event::LocalGenerationUpdate {
                grid_connector,
                name,
                power_kw,
                ..
            } => {
                if !self.grid_connectors.contains_key(grid_connector) {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "grid_connector",
                        id: grid_connector.clone(),
                    });
                    return;
                }
                self.local_generation
                    .entry(grid_connector.clone())
                    .or_default()
                    .insert(name.clone(), *power_kw);
            }
            Event::GridOperatorSignal {
                grid_connector,
                max_power,
                cost,
                charging_windows,
                ..
            } => {
                let Some(gc) = self.grid_connectors.get_mut(grid_connector) else {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "grid_connector",
                        id: grid_connector.clone(),
                    });
                    return;
                };
                if let Some(mp) = max_power {
                    gc.set_max_power(Some(*mp));
                }
                if let Some(c) = cost {
                    gc.set_cost(c.clone());
                }
                if let Some(mask) = charging_windows {
                    gc.set_windows(Some(mask.clone()));
                }
            }
            Event::ScheduleUpdate { target, power_kw, .. } => {
                if let Some(v) = self.vehicles.get_mut(target) {
                    v.schedule = Some(*power_kw);
                } else if let Some(gc) = self.grid_connectors.get_mut(target) {
                    gc.set_schedule(Some(*power_kw));
                } else {
                    faults.push(StepError::UnknownEntity {
                        step,
                        kind: "schedule_target",
                        id: target.clone(),
                    });
                }
            }
        }
    }

    /// Proportionally rolls back `cs:`/`battery:` contributions to a grid
    /// connector left over `max_power`, reversing the corresponding SoC
    /// change on the contributing battery (exact, since energy delivered
    /// by [`battery::Battery::load`]/`unload` is linear in the power
    /// passed to it). Returns a fault if the connector is still over
    /// limit afterwards (fixed load alone exceeds the cap).
    fn resolve_overload(&mut self, gc_id: &str, step: u32) -> Option<StepError> {
        let gc = self.grid_connectors.get(gc_id)?;
        let max = gc.max_power?;
        let load = gc.current_load();
        if load <= max + battery::EPS {
            return None;
        }
        let over = load - max;
        let contributing: Vec<(String, f32)> = gc
            .loads()
            .iter()
            .filter(|(name, v)| **v > 0.0 && (name.starts_with("cs:") || name.starts_with("battery:")))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let positive_total: f32 = contributing.iter().map(|(_, v)| *v).sum();

        if positive_total <= battery::EPS {
            self.warn_once(gc_id, "overload", "fixed load alone exceeds grid connector cap");
            return Some(StepError::UnsatisfiableGridConnector {
                gc: gc_id.to_string(),
                step,
                load,
                max,
            });
        }

        let scale = ((positive_total - over) / positive_total).clamp(0.0, 1.0);
        self.warn_once(gc_id, "overload", "rolling back allocation proportionally to stay within cap");

        let dt_hours = self.dt_hours();
        for (name, value) in &contributing {
            let delta = value * (1.0 - scale);
            if delta <= 0.0 {
                continue;
            }
            if let Some(station_id) = name.strip_prefix("cs:") {
                if let Some(station) = self.stations.get_mut(station_id) {
                    station.current_power -= delta;
                }
                let vehicle_id = self
                    .vehicles
                    .iter()
                    .find(|(_, v)| v.connected_station() == Some(station_id))
                    .map(|(id, _)| id.clone());
                if let Some(vehicle_id) = vehicle_id {
                    if let Some(v) = self.vehicles.get_mut(&vehicle_id) {
                        let energy_removed = delta * dt_hours * v.battery.efficiency;
                        let soc_removed = energy_removed / v.battery.capacity_kwh;
                        v.battery.soc = (v.battery.soc - soc_removed).max(0.0);
                    }
                }
            } else if let Some(battery_id) = name.strip_prefix("battery:") {
                if let Some(sb) = self.stationary_batteries.get_mut(battery_id) {
                    let energy_removed = delta * dt_hours * sb.battery.efficiency;
                    let soc_removed = energy_removed / sb.battery.capacity_kwh;
                    sb.battery.soc = (sb.battery.soc - soc_removed).max(0.0);
                }
            }
            if let Some(gc) = self.grid_connectors.get_mut(gc_id) {
                gc.add_load(name.clone(), -delta);
            }
        }

        let final_load = self.grid_connectors.get(gc_id)?.current_load();
        if final_load > max + battery::EPS {
            Some(StepError::UnsatisfiableGridConnector {
                gc: gc_id.to_string(),
                step,
                load: final_load,
                max,
            })
        } else {
            None
        }
    }

    fn record_step(&self, step: u32) -> StepRecord {
        let mut grid_connectors = BTreeMap::new();
        for (gc_id, gc) in &self.grid_connectors {
            let loads = gc.loads();
            let fixed_load_kw: f32 = loads
                .iter()
                .filter(|(n, _)| n.starts_with("fixed:"))
                .map(|(_, v)| *v)
                .sum();
            let feed_in_kw: f32 = loads
                .iter()
                .filter(|(n, _)| n.starts_with("pv:"))
                .map(|(_, v)| -*v)
                .sum::<f32>()
                .max(0.0);
            let cs_power: BTreeMap<String, f32> = loads
                .iter()
                .filter_map(|(n, v)| n.strip_prefix("cs:").map(|id| (id.to_string(), *v)))
                .collect();
            let load_kw = gc.current_load();
            let surplus_kw = (-load_kw).max(0.0);
            let price = gc.cost.evaluate(load_kw);
            grid_connectors.insert(
                gc_id.clone(),
                report::GcStepRecord {
                    load_kw,
                    fixed_load_kw,
                    feed_in_kw,
                    surplus_kw,
                    cs_power,
                    price,
                    schedule_target: gc.grid_operator_schedule,
                },
            );
        }
        let vehicle_soc = self.vehicles.iter().map(|(id, v)| (id.clone(), v.battery.soc)).collect();
        StepRecord {
            step,
            time: self.current_time,
            grid_connectors,
            vehicle_soc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::Battery;
    use crate::components::{Cost, VoltageLevel};
    use crate::curve::LoadingCurve;
    use crate::strategy::GreedyStrategy;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn single_vehicle_scenario() -> Scenario {
        let mut vehicle_types = BTreeMap::new();
        vehicle_types.insert(
            "e_golf".to_string(),
            VehicleType::new(50.0, 18.0, LoadingCurve::constant(22.0), 0.0, false, 0.0, 0.0, 0.95),
        );
        let mut vehicles = BTreeMap::new();
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
        let mut stations = BTreeMap::new();
        stations.insert("cs1".to_string(), ChargingStation::new("gc1", 22.0, 0.0));
        let mut grid_connectors = BTreeMap::new();
        let mut gc = GridConnector::new(Some(100.0), VoltageLevel::LowVoltage);
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
            Strategy::Greedy(GreedyStrategy),
            t(0, 0),
            15,
            4,
            NegativeSocPolicy::default(),
        )
    }

    #[test]
    fn stepping_advances_time_by_one_interval() {
        let mut s = single_vehicle_scenario();
        let (record, faults) = s.step();
        assert!(faults.is_empty());
        assert_eq!(record.time, t(0, 15));
        assert_eq!(record.step, 0);
    }

    #[test]
    fn vehicle_charges_each_step_under_greedy() {
        let mut s = single_vehicle_scenario();
        let summary = s.run();
        assert!(summary.faults.is_empty());
        assert_eq!(s.records.len(), 4);
        let soc = s.vehicles["car1"].battery.soc;
        assert!(soc > 0.5);
    }

    #[test]
    fn arrival_event_applies_soc_delta_and_occupies_station() {
        let mut s = single_vehicle_scenario();
        s.vehicles.get_mut("car1").unwrap().depart(None);
        s.stations.get_mut("cs1").unwrap().free();
        s.events.push(Event::Arrival {
            signal_time: t(0, 15),
            start_time: t(0, 15),
            vehicle: "car1".to_string(),
            station: "cs1".to_string(),
            soc_delta: -0.2,
            estimated_time_of_departure: Some(t(2, 0)),
            desired_soc: Some(0.9),
        });
        let (_, faults) = s.step();
        assert!(faults.is_empty());
        let v = &s.vehicles["car1"];
        assert!((v.battery.soc - 0.3).abs() < 1e-4);
        assert_eq!(v.connected_station(), Some("cs1"));
        assert_eq!(v.desired_soc, 0.9);
    }

    #[test]
    fn arrival_below_zero_soc_is_clamped_and_faults_under_abort_policy() {
        let mut s = single_vehicle_scenario();
        s.vehicles.get_mut("car1").unwrap().battery.soc = 0.1;
        s.vehicles.get_mut("car1").unwrap().depart(None);
        s.stations.get_mut("cs1").unwrap().free();
        s.events.push(Event::Arrival {
            signal_time: t(0, 15),
            start_time: t(0, 15),
            vehicle: "car1".to_string(),
            station: "cs1".to_string(),
            soc_delta: -0.5,
            estimated_time_of_departure: None,
            desired_soc: None,
        });
        let (_, faults) = s.step();
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], StepError::NegativeSoc { .. }));
        assert_eq!(s.vehicles["car1"].battery.soc, 0.0);
    }

    #[test]
    fn overload_from_fixed_load_alone_is_unsatisfiable() {
        let mut s = single_vehicle_scenario();
        s.grid_connectors.get_mut("gc1").unwrap().set_max_power(Some(5.0));
        s.events.push(Event::FixedLoadUpdate {
            signal_time: t(0, 0),
            start_time: t(0, 0),
            grid_connector: "gc1".to_string(),
            name: "house".to_string(),
            power_kw: 9.0,
        });
        let (_, faults) = s.step();
        assert!(faults.iter().any(|f| matches!(f, StepError::UnsatisfiableGridConnector { .. })));
    }

    #[test]
    fn unknown_vehicle_in_event_is_reported_not_fatal() {
        let mut s = single_vehicle_scenario();
        s.events.push(Event::Departure {
            signal_time: t(0, 15),
            start_time: t(0, 15),
            vehicle: "ghost".to_string(),
            estimated_time_of_arrival: None,
        });
        let (_, faults) = s.step();
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], StepError::UnknownEntity { .. }));
    }
}
