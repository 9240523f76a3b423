//! The balanced strategy: binary-search the minimal constant power that
//! reaches a vehicle's desired SoC exactly by departure.

use crate::battery::{EPS, ITERATIONS};
use crate::strategy::base::{clamp_power, distribute_surplus, VehicleOrder};
use crate::strategy::greedy::check_overload;
use crate::strategy::StepReport;
use crate::world::World;

#[derive(Debug, Clone, Default)]
pub struct BalancedStrategy;

impl BalancedStrategy {
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

    /// Entry point for other strategies that fall back to plain balanced
    /// charging on a single grid connector (e.g. balanced-market when a
    /// connector carries no visible price signal).
    pub(crate) fn step_gc_pub(&mut self, world: &mut World, gc: &str) {
        self.step_gc(world, gc);
    }

    fn step_gc(&mut self, world: &mut World, gc: &str) {
        let candidates = world.connected_vehicles_at(gc);

        // Phase 1: compute each vehicle's minimal constant power, without
        // yet touching its battery (the search is read-only per candidate).
        let mut wanted: Vec<(String, f32)> = Vec::with_capacity(candidates.len());
        for vehicle_id in &candidates {
            let vehicle = &world.vehicles[vehicle_id];
            let Some(departure) = vehicle.estimated_time_of_departure else {
                // No known departure: fall back to requesting the curve
                // peak, same as Greedy would for this vehicle.
                let vt = &world.vehicle_types[&vehicle.vehicle_type];
                wanted.push((vehicle_id.clone(), vt.charging_curve.power_at(vehicle.battery.soc)));
                continue;
            };
            let standing_hours = (departure - world.current_time).num_seconds() as f32 / 3600.0;
            if standing_hours <= 0.0 || vehicle.battery.soc >= vehicle.desired_soc {
                wanted.push((vehicle_id.clone(), 0.0));
                continue;
            }
            let vt = &world.vehicle_types[&vehicle.vehicle_type];
            let p_star = minimal_constant_power(
                vehicle.battery.soc,
                vehicle.desired_soc,
                vehicle.battery.efficiency,
                &vt.charging_curve,
                vehicle.battery.capacity_kwh,
                standing_hours,
            );
            wanted.push((vehicle_id.clone(), p_star));
        }

        // Ordering for proportional reduction under GC contention: serve
        // earliest-departing vehicles first; whoever is left unmet when
        // headroom runs out is reduced (in effect, served last).
        let priority: Vec<(&str, &crate::components::Vehicle)> = candidates
            .iter()
            .map(|id| (id.as_str(), &world.vehicles[id]))
            .collect();
        let order = crate::strategy::base::order_vehicles(&priority, VehicleOrder::EarliestLeaveFirst);

        for vehicle_id in &order {
            let requested = wanted
                .iter()
                .find(|(id, _)| id == vehicle_id)
                .map(|(_, p)| *p)
                .unwrap_or(0.0);
            if requested <= 0.0 {
                continue;
            }
            let vehicle = &world.vehicles[vehicle_id];
            let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
            let soc = vehicle.battery.soc;
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
                .get_mut(vehicle_id)
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

/// Binary-searches the smallest constant power `p` such that charging at
/// `p` for `standing_hours` (via [`crate::battery::Battery::soc_after`]-equivalent
/// integration) reaches `desired_soc`, within [`EPS`] and bounded by
/// [`ITERATIONS`].
pub fn minimal_constant_power(
    soc_from: f32,
    desired_soc: f32,
    efficiency: f32,
    curve: &crate::curve::LoadingCurve,
    capacity_kwh: f32,
    standing_hours: f32,
) -> f32 {
    if desired_soc <= soc_from {
        return 0.0;
    }
    let mut lo = 0.0_f32;
    let mut hi = curve.peak_power_kw();
    // If even the curve peak for the whole standing time can't reach the
    // target, offer the peak (best effort) rather than searching forever.
    let reachable_at_peak = curve.soc_after(soc_from, standing_hours, efficiency, hi, capacity_kwh);
    if reachable_at_peak < desired_soc - EPS {
        return hi;
    }
    let mut best = hi;
    for _ in 0..ITERATIONS {
        if (hi - lo).abs() < EPS {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let soc_end = curve.soc_after(soc_from, standing_hours, efficiency, mid, capacity_kwh);
        if soc_end >= desired_soc - EPS {
            best = mid;
            hi = mid;
        } else {
            lo = mid;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::LoadingCurve;

    #[test]
    fn minimal_constant_power_reaches_desired_soc_exactly() {
        let curve = LoadingCurve::constant(11.0);
        let p = minimal_constant_power(0.2, 0.8, 0.95, &curve, 70.0, 6.0);
        let reached = curve.soc_after(0.2, 6.0, 0.95, p, 70.0);
        assert!((reached - 0.8).abs() < 1e-3);
        assert!(p > 0.0 && p <= 11.0);
    }

    #[test]
    fn minimal_constant_power_is_zero_when_already_satisfied() {
        let curve = LoadingCurve::constant(11.0);
        let p = minimal_constant_power(0.9, 0.8, 0.95, &curve, 70.0, 6.0);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn minimal_constant_power_offers_peak_when_unreachable() {
        let curve = LoadingCurve::constant(2.0);
        let p = minimal_constant_power(0.0, 0.99, 0.95, &curve, 70.0, 0.1);
        assert_eq!(p, 2.0);
    }
}
