//! Per-interval time series and end-of-run summary.
//!
//! One row per interval, an accumulator fed those rows as they're
//! produced, and a CSV writer for the persisted series, indexed by
//! fleet and grid connector rather than a single feeder.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, FixedOffset};

use crate::components::{GridConnector, Vehicle};
use crate::error::{CoreError, StepError};

/// SoC margin below `desired_soc` counted separately for the "comfortably
/// below desired SoC" KPI.
pub const SOC_MARGIN: f32 = 0.05;

/// One grid connector's contribution to a [`StepRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct GcStepRecord {
    pub load_kw: f32,
    pub fixed_load_kw: f32,
    pub feed_in_kw: f32,
    pub surplus_kw: f32,
    pub cs_power: BTreeMap<String, f32>,
    pub price: f32,
    pub schedule_target: Option<f32>,
}

/// One row of the persisted time series.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: u32,
    pub time: DateTime<FixedOffset>,
    pub grid_connectors: BTreeMap<String, GcStepRecord>,
    pub vehicle_soc: BTreeMap<String, f32>,
}

/// Writes the time series as CSV: one row per interval, one
/// `gc:<id>:{load,fixed_load,feed_in,surplus,price,schedule_target}`
/// column group per grid connector, one `cs:<id>:power` column per
/// station, one `vehicle:<id>:soc` column per vehicle.
pub fn write_csv<W: Write>(records: &[StepRecord], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let gc_ids: Vec<String> = {
        let mut ids: Vec<String> = records
            .iter()
            .flat_map(|r| r.grid_connectors.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    };
    let cs_ids: Vec<String> = {
        let mut ids: Vec<String> = records
            .iter()
            .flat_map(|r| r.grid_connectors.values().flat_map(|gc| gc.cs_power.keys().cloned()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    };
    let vehicle_ids: Vec<String> = {
        let mut ids: Vec<String> = records.iter().flat_map(|r| r.vehicle_soc.keys().cloned()).collect();
        ids.sort();
        ids.dedup();
        ids
    };

    let mut header = vec!["timestep".to_string(), "time".to_string()];
    for gc in &gc_ids {
        header.push(format!("gc:{gc}:load_kw"));
        header.push(format!("gc:{gc}:fixed_load_kw"));
        header.push(format!("gc:{gc}:feed_in_kw"));
        header.push(format!("gc:{gc}:surplus_kw"));
        header.push(format!("gc:{gc}:price"));
        header.push(format!("gc:{gc}:schedule_target"));
    }
    for cs in &cs_ids {
        header.push(format!("cs:{cs}:power_kw"));
    }
    for v in &vehicle_ids {
        header.push(format!("vehicle:{v}:soc"));
    }
    wtr.write_record(&header)?;

    for record in records {
        let mut row = vec![record.step.to_string(), record.time.to_rfc3339()];
        for gc in &gc_ids {
            match record.grid_connectors.get(gc) {
                Some(g) => {
                    row.push(format!("{:.4}", g.load_kw));
                    row.push(format!("{:.4}", g.fixed_load_kw));
                    row.push(format!("{:.4}", g.feed_in_kw));
                    row.push(format!("{:.4}", g.surplus_kw));
                    row.push(format!("{:.4}", g.price));
                    row.push(g.schedule_target.map(|v| format!("{v:.4}")).unwrap_or_default());
                }
                None => row.extend(std::iter::repeat(String::new()).take(6)),
            }
        }
        for cs in &cs_ids {
            let power = record
                .grid_connectors
                .values()
                .find_map(|g| g.cs_power.get(cs))
                .copied();
            row.push(power.map(|v| format!("{v:.4}")).unwrap_or_default());
        }
        for v in &vehicle_ids {
            let soc = record.vehicle_soc.get(v).copied();
            row.push(soc.map(|v| format!("{v:.4}")).unwrap_or_default());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the time series to a file at `path`.
pub fn export_csv(records: &[StepRecord], path: impl AsRef<Path>) -> Result<(), CoreError> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    write_csv(records, writer)?;
    Ok(())
}

/// End-of-run KPIs across a fleet of vehicles and a set of grid
/// connectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub drawn_energy_kwh: BTreeMap<String, f32>,
    pub fed_in_energy_kwh: BTreeMap<String, f32>,
    pub peak_import_kw: BTreeMap<String, f32>,
    pub peak_export_kw: BTreeMap<String, f32>,
    pub cost_total: BTreeMap<String, f32>,
    /// Share of simulated intervals each vehicle spent connected, in `[0, 1]`.
    pub standing_time_share: BTreeMap<String, f32>,
    /// SoC-swing approximation of equivalent full charge/discharge cycles.
    pub battery_equivalent_full_cycles: BTreeMap<String, f32>,
    pub times_below_desired_soc: BTreeMap<String, u32>,
    pub times_below_desired_soc_with_margin: BTreeMap<String, u32>,
    /// Fatal-for-the-step conditions collected across the whole run.
    pub faults: Vec<StepError>,
}

impl Summary {
    pub fn is_ok(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Running accumulator fed one interval at a time by
/// [`crate::scenario::Scenario::run`]; re-evaluates cost via Horner's
/// method on each interval's allocated load, per the "cost depends on
/// the allocation, not the request" design note.
#[derive(Debug, Clone)]
pub struct SummaryAccumulator {
    drawn_energy_kwh: BTreeMap<String, f32>,
    fed_in_energy_kwh: BTreeMap<String, f32>,
    peak_import_kw: BTreeMap<String, f32>,
    peak_export_kw: BTreeMap<String, f32>,
    cost_total: BTreeMap<String, f32>,
    connected_steps: BTreeMap<String, u32>,
    soc_swing: BTreeMap<String, f32>,
    last_soc: BTreeMap<String, f32>,
    below_desired: BTreeMap<String, u32>,
    below_desired_margin: BTreeMap<String, u32>,
    total_steps: u32,
}

impl SummaryAccumulator {
    pub fn new(vehicles: &BTreeMap<String, Vehicle>, grid_connectors: &BTreeMap<String, GridConnector>) -> Self {
        let mut last_soc = BTreeMap::new();
        for (id, v) in vehicles {
            last_soc.insert(id.clone(), v.battery.soc);
        }
        let zero_f32: BTreeMap<String, f32> = grid_connectors.keys().map(|id| (id.clone(), 0.0)).collect();
        Self {
            drawn_energy_kwh: zero_f32.clone(),
            fed_in_energy_kwh: zero_f32.clone(),
            peak_import_kw: zero_f32.clone(),
            peak_export_kw: zero_f32.clone(),
            cost_total: zero_f32,
            connected_steps: vehicles.keys().map(|id| (id.clone(), 0)).collect(),
            soc_swing: vehicles.keys().map(|id| (id.clone(), 0.0)).collect(),
            last_soc,
            below_desired: vehicles.keys().map(|id| (id.clone(), 0)).collect(),
            below_desired_margin: vehicles.keys().map(|id| (id.clone(), 0)).collect(),
            total_steps: 0,
        }
    }

    pub fn record_step(
        &mut self,
        dt_hours: f32,
        vehicles: &BTreeMap<String, Vehicle>,
        grid_connectors: &BTreeMap<String, GridConnector>,
    ) {
        self.total_steps += 1;

        for (gc_id, gc) in grid_connectors {
            let load = gc.current_load();
            let energy = load * dt_hours;
            if load > 0.0 {
                *self.drawn_energy_kwh.entry(gc_id.clone()).or_insert(0.0) += energy;
            } else if load < 0.0 {
                *self.fed_in_energy_kwh.entry(gc_id.clone()).or_insert(0.0) += -energy;
            }
            let peak_import = self.peak_import_kw.entry(gc_id.clone()).or_insert(0.0);
            *peak_import = peak_import.max(load.max(0.0));
            let peak_export = self.peak_export_kw.entry(gc_id.clone()).or_insert(0.0);
            *peak_export = peak_export.max((-load).max(0.0));
            let price = gc.cost.evaluate(load);
            *self.cost_total.entry(gc_id.clone()).or_insert(0.0) += price * energy;
        }

        for (vehicle_id, v) in vehicles {
            let soc = v.battery.soc;
            if v.is_connected() {
                *self.connected_steps.entry(vehicle_id.clone()).or_insert(0) += 1;
            }
            let previous = *self.last_soc.get(vehicle_id).unwrap_or(&soc);
            *self.soc_swing.entry(vehicle_id.clone()).or_insert(0.0) += (soc - previous).abs();
            self.last_soc.insert(vehicle_id.clone(), soc);
            if soc < v.desired_soc {
                *self.below_desired.entry(vehicle_id.clone()).or_insert(0) += 1;
            }
            if soc < v.desired_soc - SOC_MARGIN {
                *self.below_desired_margin.entry(vehicle_id.clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn finish(self, faults: Vec<StepError>) -> Summary {
        let total = self.total_steps.max(1) as f32;
        let standing_time_share = self
            .connected_steps
            .iter()
            .map(|(id, count)| (id.clone(), *count as f32 / total))
            .collect();
        let battery_equivalent_full_cycles = self
            .soc_swing
            .iter()
            .map(|(id, swing)| (id.clone(), swing / 2.0))
            .collect();
        Summary {
            drawn_energy_kwh: self.drawn_energy_kwh,
            fed_in_energy_kwh: self.fed_in_energy_kwh,
            peak_import_kw: self.peak_import_kw,
            peak_export_kw: self.peak_export_kw,
            cost_total: self.cost_total,
            standing_time_share,
            battery_equivalent_full_cycles,
            times_below_desired_soc: self.below_desired,
            times_below_desired_soc_with_margin: self.below_desired_margin,
            faults,
        }
    }
}
