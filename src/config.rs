//! Scenario document parsing, validation, and the `ScenarioDocument` →
//! [`Scenario`] build step.
//!
//! Nested `#[derive(Deserialize)] #[serde(default, deny_unknown_fields)]`
//! structs, a `validate() -> Vec<ConfigError>` pass, and `from_*_str`/
//! `from_*_file` constructors build up SpiceEV's nested
//! scenario/components/events document, deserializable from either JSON
//! (the format SpiceEV's own scenario files use) or TOML (local presets).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveTime};
use serde::Deserialize;

use crate::battery::Battery;
use crate::components::{
    ChargingStation, Cost, GridConnector, Photovoltaic, StationaryBattery, Vehicle, VehicleType,
    VoltageLevel,
};
use crate::curve::{CurvePoint, LoadingCurve};
use crate::error::ConfigError;
use crate::events::{Event, EventQueue};
use crate::scenario::{NegativeSocPolicy, Scenario};
use crate::strategy::{
    BalancedMarketStrategy, BalancedStrategy, CoreStandingTime as RuntimeCoreStandingTime,
    DistributedStrategy, FlexSubMode, FlexWindowStrategy, GreedyStrategy, PeakLoadWindowStrategy,
    ScheduleMode, ScheduleStrategy, Strategy,
};

/// Which convention `core_standing_time.full_days` indices follow.
/// Open question resolved by SPEC_FULL.md §9: required explicitly, no
/// implicit default, so a document carrying `full_days` without this
/// fails closed at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayConvention {
    /// `full_days[0]` is Monday, `full_days[6]` is Sunday.
    ZeroBasedMonday,
    /// ISO 8601 weekday numbering: Monday = 1 .. Sunday = 7.
    IsoMonday,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreStandingTimeSpec {
    pub start: (u32, u32),
    pub end: (u32, u32),
    #[serde(default)]
    pub full_days: Option<Vec<u8>>,
    #[serde(default)]
    pub weekday_convention: Option<WeekdayConvention>,
}

impl CoreStandingTimeSpec {
    fn to_runtime(&self) -> Result<RuntimeCoreStandingTime, ConfigError> {
        let start = NaiveTime::from_hms_opt(self.start.0, self.start.1, 0).ok_or_else(|| {
            ConfigError::new("scenario.core_standing_time.start", "not a valid hour:minute")
        })?;
        let end = NaiveTime::from_hms_opt(self.end.0, self.end.1, 0).ok_or_else(|| {
            ConfigError::new("scenario.core_standing_time.end", "not a valid hour:minute")
        })?;
        Ok(RuntimeCoreStandingTime { start, end })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleModeSpec {
    Collective,
    Individual,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexSubModeSpec {
    Greedy,
    Needy,
    Balanced,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum StrategySpec {
    Greedy,
    Balanced,
    BalancedMarket,
    Schedule {
        #[serde(default = "default_schedule_mode")]
        mode: ScheduleModeSpec,
    },
    PeakLoadWindow,
    FlexWindow {
        #[serde(default = "default_flex_sub_mode")]
        sub_mode: FlexSubModeSpec,
    },
    Distributed,
}

fn default_schedule_mode() -> ScheduleModeSpec {
    ScheduleModeSpec::Collective
}

fn default_flex_sub_mode() -> FlexSubModeSpec {
    FlexSubModeSpec::Balanced
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioBlockSpec {
    pub start_time: DateTime<FixedOffset>,
    pub interval_minutes: u32,
    #[serde(default)]
    pub n_intervals: Option<u32>,
    #[serde(default)]
    pub stop_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub core_standing_time: Option<CoreStandingTimeSpec>,
    #[serde(default)]
    pub negative_soc_policy: Option<String>,
    pub strategy: StrategySpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum CostSpec {
    Fixed { value: f32 },
    Polynomial { value: Vec<f32> },
}

impl From<CostSpec> for Cost {
    fn from(spec: CostSpec) -> Self {
        match spec {
            CostSpec::Fixed { value } => Cost::Fixed(value),
            CostSpec::Polynomial { value } => Cost::Polynomial(value),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleTypeSpec {
    pub capacity_kwh: f32,
    #[serde(default)]
    pub mileage_kwh_per_100km: f32,
    /// `(soc, power_kw)` breakpoints, converted to [`CurvePoint`]s at build time.
    pub charging_curve: Vec<(f32, f32)>,
    #[serde(default)]
    pub min_charging_power_frac: f32,
    #[serde(default)]
    pub v2g: bool,
    #[serde(default)]
    pub v2g_power_factor: f32,
    #[serde(default)]
    pub discharge_limit: f32,
    #[serde(default = "default_efficiency")]
    pub battery_efficiency: f32,
}

fn default_efficiency() -> f32 {
    0.95
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleSpec {
    pub vehicle_type: String,
    pub soc: f32,
    #[serde(default)]
    pub connected_charging_station: Option<String>,
    #[serde(default)]
    pub estimated_time_of_departure: Option<DateTime<FixedOffset>>,
    pub desired_soc: f32,
    #[serde(default)]
    pub allow_negative_soc: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChargingStationSpec {
    pub parent_grid_connector: String,
    pub max_power: f32,
    #[serde(default)]
    pub min_power: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConnectorSpec {
    #[serde(default)]
    pub max_power: Option<f32>,
    pub voltage_level: String,
    #[serde(default = "default_cost")]
    pub cost: CostSpec,
    #[serde(default)]
    pub grid_operator_schedule: Option<f32>,
    #[serde(default)]
    pub charging_windows: Option<Vec<bool>>,
    /// Peak-load-window mask, from a separate config than
    /// `charging_windows` and with the opposite (restrict-to-ceiling)
    /// meaning; consumed only by the peak-load-window strategy.
    #[serde(default)]
    pub peak_windows: Option<Vec<bool>>,
}

fn default_cost() -> CostSpec {
    CostSpec::Fixed { value: 0.0 }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationaryBatterySpec {
    pub parent_grid_connector: String,
    pub capacity_kwh: f32,
    pub soc: f32,
    #[serde(default = "default_efficiency")]
    pub efficiency: f32,
    pub max_power_kw: f32,
    #[serde(default)]
    pub allow_negative_soc: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhotovoltaicSpec {
    pub parent_grid_connector: String,
    pub nominal_power_kw: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentsSpec {
    #[serde(default)]
    pub vehicle_types: BTreeMap<String, VehicleTypeSpec>,
    #[serde(default)]
    pub vehicles: BTreeMap<String, VehicleSpec>,
    #[serde(default)]
    pub charging_stations: BTreeMap<String, ChargingStationSpec>,
    #[serde(default)]
    pub grid_connectors: BTreeMap<String, GridConnectorSpec>,
    #[serde(default)]
    pub batteries: BTreeMap<String, StationaryBatterySpec>,
    #[serde(default)]
    pub photovoltaics: BTreeMap<String, PhotovoltaicSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrivalEventSpec {
    #[serde(default)]
    pub signal_time: Option<DateTime<FixedOffset>>,
    pub start_time: DateTime<FixedOffset>,
    pub vehicle: String,
    pub station: String,
    pub soc_delta: f32,
    #[serde(default)]
    pub estimated_time_of_departure: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub desired_soc: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepartureEventSpec {
    #[serde(default)]
    pub signal_time: Option<DateTime<FixedOffset>>,
    pub start_time: DateTime<FixedOffset>,
    pub vehicle: String,
    #[serde(default)]
    pub estimated_time_of_arrival: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadEventSpec {
    #[serde(default)]
    pub signal_time: Option<DateTime<FixedOffset>>,
    pub start_time: DateTime<FixedOffset>,
    pub grid_connector: String,
    pub name: String,
    pub power_kw: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridOperatorSignalEventSpec {
    #[serde(default)]
    pub signal_time: Option<DateTime<FixedOffset>>,
    pub start_time: DateTime<FixedOffset>,
    pub grid_connector: String,
    #[serde(default)]
    pub max_power: Option<f32>,
    #[serde(default)]
    pub cost: Option<CostSpec>,
    #[serde(default)]
    pub charging_windows: Option<Vec<bool>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEventSpec {
    #[serde(default)]
    pub signal_time: Option<DateTime<FixedOffset>>,
    pub start_time: DateTime<FixedOffset>,
    pub target: String,
    pub power_kw: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsSpec {
    #[serde(default)]
    pub arrivals: Vec<ArrivalEventSpec>,
    #[serde(default)]
    pub departures: Vec<DepartureEventSpec>,
    #[serde(default)]
    pub fixed_load: Vec<LoadEventSpec>,
    #[serde(default)]
    pub local_generation: Vec<LoadEventSpec>,
    #[serde(default)]
    pub grid_operator_signals: Vec<GridOperatorSignalEventSpec>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEventSpec>,
}

/// The whole scenario document: timeline parameters, the component
/// catalog, and the event stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDocument {
    pub scenario: ScenarioBlockSpec,
    #[serde(default)]
    pub components: ComponentsSpec,
    #[serde(default)]
    pub events: EventsSpec,
}

impl ScenarioDocument {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let mut value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| ConfigError::new("scenario", format!("invalid JSON: {e}")))?;
        normalize_spaced_keys_json(&mut value);
        serde_json::from_value(value).map_err(|e| ConfigError::new("scenario", format!("{e}")))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut value: toml::Value = toml::from_str(s)
            .map_err(|e| ConfigError::new("scenario", format!("invalid TOML: {e}")))?;
        normalize_spaced_keys_toml(&mut value);
        value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::new("scenario", format!("{e}")))
    }

    /// Loads from `path`, dispatching on its extension (`.json` or `.toml`).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::new("scenario", format!("reading {}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(ConfigError::new(
                "scenario",
                format!("unsupported scenario file extension: {other:?} (expected .json or .toml)"),
            )),
        }
    }

    /// Structural checks beyond what `serde` already enforces: dangling
    /// references between components/events, and the weekday-convention
    /// fail-closed rule.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.scenario.interval_minutes == 0 {
            errors.push(ConfigError::new("scenario.interval_minutes", "must be > 0"));
        }
        if self.scenario.n_intervals.is_none() && self.scenario.stop_time.is_none() {
            errors.push(ConfigError::new(
                "scenario",
                "one of n_intervals or stop_time is required",
            ));
        }
        if let Some(cst) = &self.scenario.core_standing_time {
            if cst.full_days.is_some() && cst.weekday_convention.is_none() {
                errors.push(ConfigError::new(
                    "scenario.core_standing_time.weekday_convention",
                    "required when full_days is present",
                ));
            }
        }

        for (id, gc) in &self.components.grid_connectors {
            if VoltageLevel::parse(&gc.voltage_level).is_none() {
                errors.push(ConfigError::new(
                    format!("components.grid_connectors.{id}.voltage_level"),
                    format!("unrecognised voltage level `{}`", gc.voltage_level),
                ));
            }
        }
        for (id, cs) in &self.components.charging_stations {
            if !self.components.grid_connectors.contains_key(&cs.parent_grid_connector) {
                errors.push(ConfigError::new(
                    format!("components.charging_stations.{id}.parent_grid_connector"),
                    format!("references unknown grid connector `{}`", cs.parent_grid_connector),
                ));
            }
        }
        for (id, b) in &self.components.batteries {
            if !self.components.grid_connectors.contains_key(&b.parent_grid_connector) {
                errors.push(ConfigError::new(
                    format!("components.batteries.{id}.parent_grid_connector"),
                    format!("references unknown grid connector `{}`", b.parent_grid_connector),
                ));
            }
        }
        for (id, pv) in &self.components.photovoltaics {
            if !self.components.grid_connectors.contains_key(&pv.parent_grid_connector) {
                errors.push(ConfigError::new(
                    format!("components.photovoltaics.{id}.parent_grid_connector"),
                    format!("references unknown grid connector `{}`", pv.parent_grid_connector),
                ));
            }
        }
        for (id, v) in &self.components.vehicles {
            if !self.components.vehicle_types.contains_key(&v.vehicle_type) {
                errors.push(ConfigError::new(
                    format!("components.vehicles.{id}.vehicle_type"),
                    format!("references unknown vehicle type `{}`", v.vehicle_type),
                ));
            }
            if let Some(cs) = &v.connected_charging_station {
                if !self.components.charging_stations.contains_key(cs) {
                    errors.push(ConfigError::new(
                        format!("components.vehicles.{id}.connected_charging_station"),
                        format!("references unknown charging station `{cs}`"),
                    ));
                }
            }
        }

        for (i, event) in self.events.arrivals.iter().enumerate() {
            if !self.components.vehicles.contains_key(&event.vehicle) {
                errors.push(ConfigError::new(
                    format!("events.arrivals[{i}].vehicle"),
                    format!("references unknown vehicle `{}`", event.vehicle),
                ));
            }
            if !self.components.charging_stations.contains_key(&event.station) {
                errors.push(ConfigError::new(
                    format!("events.arrivals[{i}].station"),
                    format!("references unknown charging station `{}`", event.station),
                ));
            }
            if event.soc_delta > 0.0 {
                errors.push(ConfigError::new(
                    format!("events.arrivals[{i}].soc_delta"),
                    "must be <= 0 (energy spent while away from the station)",
                ));
            }
        }
        for (i, event) in self.events.departures.iter().enumerate() {
            if !self.components.vehicles.contains_key(&event.vehicle) {
                errors.push(ConfigError::new(
                    format!("events.departures[{i}].vehicle"),
                    format!("references unknown vehicle `{}`", event.vehicle),
                ));
            }
        }
        for (i, event) in self.events.fixed_load.iter().enumerate() {
            if !self.components.grid_connectors.contains_key(&event.grid_connector) {
                errors.push(ConfigError::new(
                    format!("events.fixed_load[{i}].grid_connector"),
                    format!("references unknown grid connector `{}`", event.grid_connector),
                ));
            }
        }
        for (i, event) in self.events.local_generation.iter().enumerate() {
            if !self.components.grid_connectors.contains_key(&event.grid_connector) {
                errors.push(ConfigError::new(
                    format!("events.local_generation[{i}].grid_connector"),
                    format!("references unknown grid connector `{}`", event.grid_connector),
                ));
            }
        }
        for (i, event) in self.events.grid_operator_signals.iter().enumerate() {
            if !self.components.grid_connectors.contains_key(&event.grid_connector) {
                errors.push(ConfigError::new(
                    format!("events.grid_operator_signals[{i}].grid_connector"),
                    format!("references unknown grid connector `{}`", event.grid_connector),
                ));
            }
        }
        for (i, event) in self.events.schedule.iter().enumerate() {
            let known = self.components.vehicles.contains_key(&event.target)
                || self.components.grid_connectors.contains_key(&event.target);
            if !known {
                errors.push(ConfigError::new(
                    format!("events.schedule[{i}].target"),
                    format!("references unknown vehicle or grid connector `{}`", event.target),
                ));
            }
        }

        errors
    }

    /// Builds a runnable [`Scenario`]. Callers should run [`Self::validate`]
    /// first; `build` assumes a valid document and will panic on dangling
    /// references rather than re-checking them.
    pub fn build(&self) -> Result<Scenario, ConfigError> {
        let errors = self.validate();
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        let vehicle_types: BTreeMap<String, VehicleType> = self
            .components
            .vehicle_types
            .iter()
            .map(|(id, spec)| {
                let points = spec
                    .charging_curve
                    .iter()
                    .map(|&(soc, power_kw)| CurvePoint { soc, power_kw })
                    .collect();
                let curve = LoadingCurve::new(points)
                    .map_err(|e| ConfigError::new(format!("components.vehicle_types.{id}.charging_curve"), e))?;
                Ok((
                    id.clone(),
                    VehicleType::new(
                        spec.capacity_kwh,
                        spec.mileage_kwh_per_100km,
                        curve,
                        spec.min_charging_power_frac,
                        spec.v2g,
                        spec.v2g_power_factor,
                        spec.discharge_limit,
                        spec.battery_efficiency,
                    ),
                ))
            })
            .collect::<Result<_, ConfigError>>()?;

        let vehicles: BTreeMap<String, Vehicle> = self
            .components
            .vehicles
            .iter()
            .map(|(id, spec)| {
                let vt = &vehicle_types[&spec.vehicle_type];
                let battery = Battery::new(
                    vt.capacity_kwh,
                    spec.soc,
                    vt.battery_efficiency,
                    vt.charging_curve.clone(),
                    spec.allow_negative_soc,
                );
                (
                    id.clone(),
                    Vehicle::new(
                        spec.vehicle_type.clone(),
                        battery,
                        spec.connected_charging_station.clone(),
                        spec.estimated_time_of_departure,
                        spec.desired_soc,
                    ),
                )
            })
            .collect();

        let mut stations: BTreeMap<String, ChargingStation> = self
            .components
            .charging_stations
            .iter()
            .map(|(id, spec)| {
                (
                    id.clone(),
                    ChargingStation::new(spec.parent_grid_connector.clone(), spec.max_power, spec.min_power),
                )
            })
            .collect();
        for (vehicle_id, spec) in &self.components.vehicles {
            if let Some(cs) = &spec.connected_charging_station {
                if let Some(station) = stations.get_mut(cs) {
                    station.occupy(vehicle_id.clone());
                }
            }
        }

        let grid_connectors: BTreeMap<String, GridConnector> = self
            .components
            .grid_connectors
            .iter()
            .map(|(id, spec)| {
                let voltage_level = VoltageLevel::parse(&spec.voltage_level)
                    .expect("validated above: voltage_level parses");
                let mut gc = GridConnector::new(spec.max_power, voltage_level);
                gc.set_cost(spec.cost.clone().into());
                gc.set_schedule(spec.grid_operator_schedule);
                gc.set_windows(spec.charging_windows.clone());
                gc.set_peak_windows(spec.peak_windows.clone());
                (id.clone(), gc)
            })
            .collect();

        let stationary_batteries: BTreeMap<String, StationaryBattery> = self
            .components
            .batteries
            .iter()
            .map(|(id, spec)| {
                let battery = Battery::new(
                    spec.capacity_kwh,
                    spec.soc,
                    spec.efficiency,
                    LoadingCurve::constant(spec.max_power_kw),
                    spec.allow_negative_soc,
                );
                (id.clone(), StationaryBattery::new(spec.parent_grid_connector.clone(), battery))
            })
            .collect();

        let pvs: BTreeMap<String, Photovoltaic> = self
            .components
            .photovoltaics
            .iter()
            .map(|(id, spec)| {
                (
                    id.clone(),
                    Photovoltaic::new(spec.parent_grid_connector.clone(), spec.nominal_power_kw),
                )
            })
            .collect();

        let mut events = EventQueue::new();
        for e in &self.events.arrivals {
            events.push(Event::Arrival {
                signal_time: e.signal_time.unwrap_or(e.start_time),
                start_time: e.start_time,
                vehicle: e.vehicle.clone(),
                station: e.station.clone(),
                soc_delta: e.soc_delta,
                estimated_time_of_departure: e.estimated_time_of_departure,
                desired_soc: e.desired_soc,
            });
        }
        for e in &self.events.departures {
            events.push(Event::Departure {
                signal_time: e.signal_time.unwrap_or(e.start_time),
                start_time: e.start_time,
                vehicle: e.vehicle.clone(),
                estimated_time_of_arrival: e.estimated_time_of_arrival,
            });
        }
        for e in &self.events.fixed_load {
            events.push(Event::FixedLoadUpdate {
                signal_time: e.signal_time.unwrap_or(e.start_time),
                start_time: e.start_time,
                grid_connector: e.grid_connector.clone(),
                name: e.name.clone(),
                power_kw: e.power_kw,
            });
        }
        for e in &self.events.local_generation {
            events.push(Event::LocalGenerationUpdate {
                signal_time: e.signal_time.unwrap_or(e.start_time),
                start_time: e.start_time,
                grid_connector: e.grid_connector.clone(),
                name: e.name.clone(),
                power_kw: e.power_kw,
            });
        }
        for e in &self.events.grid_operator_signals {
            events.push(Event::GridOperatorSignal {
                signal_time: e.signal_time.unwrap_or(e.start_time),
                start_time: e.start_time,
                grid_connector: e.grid_connector.clone(),
                max_power: e.max_power,
                cost: e.cost.clone().map(Into::into),
                charging_windows: e.charging_windows.clone(),
            });
        }
        for e in &self.events.schedule {
            events.push(Event::ScheduleUpdate {
                signal_time: e.signal_time.unwrap_or(e.start_time),
                start_time: e.start_time,
                target: e.target.clone(),
                power_kw: e.power_kw,
            });
        }

        let core_standing_time = self
            .scenario
            .core_standing_time
            .as_ref()
            .map(CoreStandingTimeSpec::to_runtime)
            .transpose()?;
        let strategy = build_strategy(&self.scenario.strategy, core_standing_time);

        let n_intervals = self.scenario.n_intervals.unwrap_or_else(|| {
            let stop = self
                .scenario
                .stop_time
                .expect("validate() requires n_intervals or stop_time");
            let minutes = (stop - self.scenario.start_time).num_minutes().max(0) as u32;
            minutes / self.scenario.interval_minutes
        });

        let negative_soc_policy = match self.scenario.negative_soc_policy.as_deref() {
            None | Some("abort") => NegativeSocPolicy::Abort,
            Some("continue") => NegativeSocPolicy::Continue,
            Some("reset") => NegativeSocPolicy::Reset,
            Some(other) => {
                return Err(ConfigError::new(
                    "scenario.negative_soc_policy",
                    format!("unknown policy `{other}` (expected abort, continue, or reset)"),
                ))
            }
        };

        Ok(Scenario::new(
            vehicle_types,
            vehicles,
            stations,
            grid_connectors,
            stationary_batteries,
            pvs,
            events,
            strategy,
            self.scenario.start_time,
            self.scenario.interval_minutes,
            n_intervals,
            negative_soc_policy,
        ))
    }
}

fn build_strategy(spec: &StrategySpec, core_standing_time: Option<RuntimeCoreStandingTime>) -> Strategy {
    match spec {
        StrategySpec::Greedy => Strategy::Greedy(GreedyStrategy),
        StrategySpec::Balanced => Strategy::Balanced(BalancedStrategy),
        StrategySpec::BalancedMarket => Strategy::BalancedMarket(BalancedMarketStrategy),
        StrategySpec::Schedule { mode } => Strategy::Schedule(ScheduleStrategy {
            mode: match mode {
                ScheduleModeSpec::Collective => ScheduleMode::Collective,
                ScheduleModeSpec::Individual => ScheduleMode::Individual,
            },
            core_standing_time,
        }),
        StrategySpec::PeakLoadWindow => Strategy::PeakLoadWindow(PeakLoadWindowStrategy),
        StrategySpec::FlexWindow { sub_mode } => Strategy::FlexWindow(FlexWindowStrategy {
            sub_mode: match sub_mode {
                FlexSubModeSpec::Greedy => FlexSubMode::Greedy,
                FlexSubModeSpec::Needy => FlexSubMode::Needy,
                FlexSubModeSpec::Balanced => FlexSubMode::Balanced,
            },
        }),
        StrategySpec::Distributed => Strategy::Distributed(DistributedStrategy),
    }
}

/// Recursively renames the spaced field spellings SpiceEV's Python-era
/// scenario files sometimes carry (`"grid operator schedule"`, `"voltage
/// level"`) to their underscored form, warning once per occurrence.
fn normalize_spaced_keys_json(value: &mut serde_json::Value) {
    const SPACED: [&str; 2] = ["grid operator schedule", "voltage level"];
    match value {
        serde_json::Value::Object(map) => {
            for spaced in SPACED {
                if let Some(v) = map.remove(spaced) {
                    let underscored = spaced.replace(' ', "_");
                    tracing::warn!(field = spaced, replacement = %underscored, "scenario document uses spaced field spelling");
                    map.insert(underscored, v);
                }
            }
            for v in map.values_mut() {
                normalize_spaced_keys_json(v);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                normalize_spaced_keys_json(v);
            }
        }
        _ => {}
    }
}

fn normalize_spaced_keys_toml(value: &mut toml::Value) {
    const SPACED: [&str; 2] = ["grid operator schedule", "voltage level"];
    match value {
        toml::Value::Table(map) => {
            for spaced in SPACED {
                if let Some(v) = map.remove(spaced) {
                    let underscored = spaced.replace(' ', "_");
                    tracing::warn!(field = spaced, replacement = %underscored, "scenario document uses spaced field spelling");
                    map.insert(underscored, v);
                }
            }
            for v in map.values_mut() {
                normalize_spaced_keys_toml(v);
            }
        }
        toml::Value::Array(items) => {
            for v in items {
                normalize_spaced_keys_toml(v);
            }
        }
        _ => {}
    }
}
