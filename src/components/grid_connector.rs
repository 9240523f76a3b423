//! Grid connectors: the shared metered connection point strategies
//! allocate power under.

use std::collections::BTreeMap;

/// A voltage level tag carried for reporting; the core does not model
/// electrical behaviour beyond scalar power, so this is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageLevel {
    ExtraHighVoltage,
    ExtraHighToHighVoltage,
    HighVoltage,
    HighToMediumVoltage,
    MediumVoltage,
    MediumToLowVoltage,
    LowVoltage,
}

impl VoltageLevel {
    /// Parses the scenario-document spelling (`"HV"`, `"MV/LV"`, …).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eHV" => Some(Self::ExtraHighVoltage),
            "eHV/HV" => Some(Self::ExtraHighToHighVoltage),
            "HV" => Some(Self::HighVoltage),
            "HV/MV" => Some(Self::HighToMediumVoltage),
            "MV" => Some(Self::MediumVoltage),
            "MV/LV" => Some(Self::MediumToLowVoltage),
            "LV" => Some(Self::LowVoltage),
            _ => None,
        }
    }
}

/// The price function attached to a grid connector.
#[derive(Debug, Clone, PartialEq)]
pub enum Cost {
    /// A flat price per kWh, independent of load.
    Fixed(f32),
    /// Coefficients `[a0, a1, ...]` of a polynomial in the connector's
    /// current load (kW), evaluated via Horner's method.
    Polynomial(Vec<f32>),
}

impl Cost {
    /// Evaluates the price at the given grid-connector load.
    pub fn evaluate(&self, load_kw: f32) -> f32 {
        match self {
            Cost::Fixed(value) => *value,
            Cost::Polynomial(coeffs) => coeffs
                .iter()
                .rev()
                .fold(0.0, |acc, &c| acc * load_kw + c),
        }
    }
}

/// The shared external meter and power cap for a site.
#[derive(Debug, Clone)]
pub struct GridConnector {
    /// Hard power cap in kW. `None` means unlimited.
    pub max_power: Option<f32>,
    pub voltage_level: VoltageLevel,
    /// Additive named load contributions (fixed loads, local generation,
    /// per-station and per-battery power), summed for [`Self::current_load`].
    current_loads: BTreeMap<String, f32>,
    pub cost: Cost,
    /// Grid-operator target power for this interval, if any.
    pub grid_operator_schedule: Option<f32>,
    /// Per-interval "encouraged" charging window mask, if configured.
    /// Consumed by flex-window: charge opportunistically inside, hold
    /// back outside.
    pub charging_windows: Option<Vec<bool>>,
    /// Per-interval peak-window mask, from a separate config than
    /// [`Self::charging_windows`] and with the opposite meaning:
    /// consumed by peak-load-window to *restrict* power inside these
    /// intervals to the ceiling already present from fixed load.
    pub peak_windows: Option<Vec<bool>>,
}

impl GridConnector {
    pub fn new(max_power: Option<f32>, voltage_level: VoltageLevel) -> Self {
        Self {
            max_power,
            voltage_level,
            current_loads: BTreeMap::new(),
            cost: Cost::Fixed(0.0),
            grid_operator_schedule: None,
            charging_windows: None,
            peak_windows: None,
        }
    }

    /// Adds (or replaces, if called again with the same name within a
    /// step before [`Self::clear`]) a named load contribution. Feed-in
    /// is represented as a negative value.
    pub fn add_load(&mut self, name: impl Into<String>, kw: f32) {
        *self.current_loads.entry(name.into()).or_insert(0.0) += kw;
    }

    /// Clears all named loads, called by the stepper at the start of
    /// each interval before fixed loads and allocations are re-applied.
    pub fn clear(&mut self) {
        self.current_loads.clear();
    }

    /// Total load across all named contributions.
    pub fn current_load(&self) -> f32 {
        self.current_loads.values().sum()
    }

    /// The named load contributions backing [`Self::current_load`], for
    /// reporting (splitting the total into fixed load / feed-in / station
    /// / battery shares by the stepper's naming convention).
    pub fn loads(&self) -> &BTreeMap<String, f32> {
        &self.current_loads
    }

    /// Remaining power budget before `max_power` is hit, optionally
    /// excluding one named contribution (e.g. the vehicle currently
    /// being allocated, so its own prior-this-step contribution doesn't
    /// count against itself).
    pub fn headroom(&self, for_name: Option<&str>) -> f32 {
        let max = match self.max_power {
            Some(m) => m,
            None => return f32::INFINITY,
        };
        let others: f32 = self
            .current_loads
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != for_name)
            .map(|(_, kw)| *kw)
            .sum();
        max - others
    }

    pub fn set_schedule(&mut self, kw: Option<f32>) {
        self.grid_operator_schedule = kw;
    }

    pub fn set_windows(&mut self, mask: Option<Vec<bool>>) {
        self.charging_windows = mask;
    }

    pub fn set_peak_windows(&mut self, mask: Option<Vec<bool>>) {
        self.peak_windows = mask;
    }

    pub fn set_cost(&mut self, cost: Cost) {
        self.cost = cost;
    }

    pub fn set_max_power(&mut self, kw: Option<f32>) {
        self.max_power = kw;
    }

    /// Whether `step` falls inside a configured charging window. Absent
    /// a mask, or past its end, there is no encouragement either way —
    /// callers treat this as "not specially encouraged".
    pub fn is_charging_window(&self, step: usize) -> bool {
        self.charging_windows
            .as_ref()
            .and_then(|mask| mask.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Whether `step` falls inside a configured peak window. Absent a
    /// mask, or past its end, there is no restriction — callers treat
    /// this as "not a peak window".
    pub fn is_peak_window(&self, step: usize) -> bool {
        self.peak_windows
            .as_ref()
            .and_then(|mask| mask.get(step))
            .copied()
            .unwrap_or(false)
    }
}
