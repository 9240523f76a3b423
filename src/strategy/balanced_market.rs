//! Balanced-market: charges each vehicle during the cheapest hours of its
//! standing time rather than spreading power evenly across all of it.

use chrono::{DateTime, FixedOffset};

use crate::strategy::balanced::{minimal_constant_power, BalancedStrategy};
use crate::strategy::base::{clamp_power, distribute_surplus, v2g_discharge_power};
use crate::strategy::greedy::check_overload;
use crate::strategy::StepReport;
use crate::world::World;

/// Look-ahead length, in hours, over which price tiers are discretized.
pub const HORIZON_HOURS: f32 = 24.0;

#[derive(Debug, Clone, Default)]
pub struct BalancedMarketStrategy;

impl BalancedMarketStrategy {
    pub fn step(&mut self, world: &mut World) -> StepReport {
        let mut overloads = Vec::new();
        for gc in world.grid_connector_ids() {
            if price_horizon(world, &gc).windows(2).all(|w| (w[0].1 - w[1].1).abs() < 1e-9) {
                // No visible price variation: the preferred signal is
                // absent, fall back to plain balanced charging.
                tracing::info!(gc = %gc, "balanced_market: no price signal, falling back to balanced");
                let mut fallback = BalancedStrategy;
                fallback.step_gc_pub(world, &gc);
            } else {
                self.step_gc(world, &gc);
            }
            if let Some(overload) = check_overload(world, &gc) {
                overloads.push(overload);
            }
        }
        StepReport { overloads }
    }

    fn step_gc(&mut self, world: &mut World, gc: &str) {
        let now = world.current_time;
        let dt = world.dt_hours;
        let horizon = price_horizon(world, gc);

        for vehicle_id in world.connected_vehicles_at(gc) {
            let vehicle = &world.vehicles[&vehicle_id];
            let Some(departure) = vehicle.estimated_time_of_departure else {
                // No known departure: behave like Greedy for this vehicle.
                let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
                let requested = vt.charging_curve.power_at(vehicle.battery.soc);
                charge_vehicle(world, gc, &vehicle_id, requested);
                continue;
            };
            let soc = vehicle.battery.soc;
            let desired = vehicle.desired_soc;
            let vt = world.vehicle_types[&vehicle.vehicle_type].clone();

            if soc >= desired {
                maybe_discharge(world, gc, &vehicle_id, &horizon, now, dt);
                continue;
            }

            let capacity_kwh = vehicle.battery.capacity_kwh;
            let slices = select_cheap_slices(&horizon, now, departure, dt, soc, desired, &vt, capacity_kwh);
            let current_slot_selected = slices.iter().any(|t| *t == now);

            if current_slot_selected {
                let total_hours = slices.len() as f32 * dt;
                let power =
                    minimal_constant_power(soc, desired, vt.battery_efficiency, &vt.charging_curve, vehicle.battery.capacity_kwh, total_hours);
                charge_vehicle(world, gc, &vehicle_id, power);
            } else {
                maybe_discharge(world, gc, &vehicle_id, &horizon, now, dt);
            }
        }

        distribute_surplus(world, gc);
    }
}

fn charge_vehicle(world: &mut World, gc: &str, vehicle_id: &str, requested: f32) {
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

/// Offers a V2G discharge when the current price sits in the expensive
/// tail of the horizon (above its mean) and the vehicle has spare time to
/// refill before departure.
fn maybe_discharge(
    world: &mut World,
    gc: &str,
    vehicle_id: &str,
    horizon: &[(DateTime<FixedOffset>, f32)],
    now: DateTime<FixedOffset>,
    dt: f32,
) {
    let current_price = horizon
        .iter()
        .find(|(t, _)| *t == now)
        .map(|(_, p)| *p)
        .unwrap_or(0.0);
    let mean_price = if horizon.is_empty() {
        0.0
    } else {
        horizon.iter().map(|(_, p)| p).sum::<f32>() / horizon.len() as f32
    };
    let should_discharge = current_price > mean_price;

    let vehicle = &world.vehicles[vehicle_id];
    let vt = world.vehicle_types[&vehicle.vehicle_type].clone();
    let power = v2g_discharge_power(vehicle, &vt, now, dt, should_discharge);
    if power <= 0.0 {
        return;
    }
    let station_id = match vehicle.connected_station() {
        Some(s) => s.to_string(),
        None => return,
    };
    let station_max = world.stations.get(&station_id).map(|s| s.max_power).unwrap_or(0.0);
    let power = power.min(station_max);
    if power <= 0.0 {
        return;
    }
    let (actual, _energy) = world
        .vehicles
        .get_mut(vehicle_id)
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

/// Per-`dt`-sized slice prices over `[now, now + HORIZON_HOURS)`, derived
/// from the grid connector's current cost plus any visible
/// [`crate::events::Event::GridOperatorSignal`] cost changes within the
/// horizon (held constant between changes, per the CSV-style "hold last
/// value" convention).
fn price_horizon(world: &World, gc: &str) -> Vec<(DateTime<FixedOffset>, f32)> {
    let dt = world.dt_hours;
    let now = world.current_time;
    let steps = (HORIZON_HOURS / dt).round().max(1.0) as usize;
    let step_duration = chrono::Duration::seconds((dt * 3600.0) as i64);

    let mut changes: Vec<(DateTime<FixedOffset>, f32)> = world
        .events
        .events_visible_at(now)
        .filter_map(|e| match e {
            crate::events::Event::GridOperatorSignal {
                start_time,
                grid_connector,
                cost: Some(cost),
                ..
            } if grid_connector == gc => Some((*start_time, cost.evaluate(0.0))),
            _ => None,
        })
        .collect();
    changes.sort_by_key(|(t, _)| *t);

    let base_price = world.grid_connectors[gc].cost.evaluate(world.grid_connectors[gc].current_load());
    let mut out = Vec::with_capacity(steps);
    let mut t = now;
    for _ in 0..steps {
        let price = changes
            .iter()
            .rev()
            .find(|(start, _)| *start <= t)
            .map(|(_, p)| *p)
            .unwrap_or(base_price);
        out.push((t, price));
        t += step_duration;
    }
    out
}

/// Selects the time slots (from `horizon`, restricted to `[now, departure)`)
/// with the lowest price, in chronological application order, whose
/// cumulative curve-bounded charge brings `soc` up to `desired_soc`.
fn select_cheap_slices(
    horizon: &[(DateTime<FixedOffset>, f32)],
    now: DateTime<FixedOffset>,
    departure: DateTime<FixedOffset>,
    dt: f32,
    soc: f32,
    desired_soc: f32,
    vt: &crate::components::VehicleType,
    capacity_kwh: f32,
) -> Vec<DateTime<FixedOffset>> {
    let mut candidates: Vec<(DateTime<FixedOffset>, f32)> = horizon
        .iter()
        .filter(|(t, _)| *t >= now && *t < departure)
        .cloned()
        .collect();
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

    let mut selected = Vec::new();
    let mut soc_acc = soc;
    for (t, _) in candidates {
        if soc_acc >= desired_soc - crate::battery::EPS {
            break;
        }
        let slice_power = vt.charging_curve.power_at(soc_acc);
        let energy_kwh = slice_power * dt * vt.battery_efficiency;
        soc_acc = (soc_acc + energy_kwh / capacity_kwh).min(1.0);
        selected.push(t);
    }
    selected.sort();
    selected
}
