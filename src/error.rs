//! Crate-wide error types.

use thiserror::Error;

/// Errors raised while loading or validating a scenario document.
///
/// Carries a dotted field path alongside the constraint that was violated,
/// matching the shape surfaced to callers at the CLI boundary.
#[derive(Debug, Error)]
#[error("config error: {field} — {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g. `"components.vehicles.car_1.vehicle_type"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while stepping a scenario.
///
/// Most of these are *reported*, not fatal: the stepper logs and continues
/// per the recovery policy (a step-local fault never aborts the run). The
/// stepper surfaces fatal-for-the-step conditions as values collected into
/// [`crate::report::Summary::faults`](crate::report::Summary::faults)
/// rather than propagating a `Result::Err` out of `Scenario::run`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    /// A grid connector exceeded `max_power` after strategy allocation and
    /// proportional rollback still leaves it over limit (fixed loads alone
    /// exceed capacity).
    #[error("grid connector `{gc}` unsatisfiable at step {step}: load {load:.3} kW > max {max:.3} kW")]
    UnsatisfiableGridConnector {
        gc: String,
        step: u32,
        load: f32,
        max: f32,
    },
    /// A vehicle's SoC fell below zero on arrival under the `Abort` policy.
    #[error("vehicle `{vehicle}` negative SoC on arrival at step {step}: {soc:.4}")]
    NegativeSoc {
        vehicle: String,
        step: u32,
        soc: f32,
    },
    /// An event referenced an entity that does not exist in the scenario.
    #[error("event at step {step} references unknown {kind} `{id}`")]
    UnknownEntity {
        step: u32,
        kind: &'static str,
        id: String,
    },
}

/// Top-level error type returned by fallible library entry points.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("simulation aborted at step {step}: {source}")]
    Aborted { step: u32, source: StepError },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_field_and_message() {
        let err = ConfigError::new("battery.capacity", "must be > 0");
        let s = err.to_string();
        assert!(s.contains("battery.capacity"));
        assert!(s.contains("must be > 0"));
    }
}
