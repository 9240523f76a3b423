//! Vehicle type catalog entries.

use crate::curve::LoadingCurve;

/// Shared specifications for every vehicle of a given model.
///
/// Referenced by name from [`super::vehicle::Vehicle`] rather than
/// embedded, since a fleet typically has far more vehicles than types.
#[derive(Debug, Clone)]
pub struct VehicleType {
    /// Battery capacity in kWh.
    pub capacity_kwh: f32,
    /// Energy consumption in kWh per 100 km. Scenario-generation only:
    /// the simulation core stores this for passthrough/reporting but
    /// never reads it to change behaviour.
    pub mileage_kwh_per_100km: f32,
    /// SoC-dependent charging power ceiling.
    pub charging_curve: LoadingCurve,
    /// Fraction of the curve's peak power below which the vehicle
    /// refuses to charge at all (station/GC allocation rounds this down
    /// to zero rather than trickle-charging).
    pub min_charging_power_frac: f32,
    /// Whether this vehicle can discharge back through its station.
    pub v2g: bool,
    /// Fraction of the charging curve's power usable for discharge.
    pub v2g_power_factor: f32,
    /// Minimum SoC a V2G discharge may draw the battery down to.
    pub discharge_limit: f32,
    /// Round-trip battery efficiency.
    pub battery_efficiency: f32,
}

impl VehicleType {
    pub fn new(
        capacity_kwh: f32,
        mileage_kwh_per_100km: f32,
        charging_curve: LoadingCurve,
        min_charging_power_frac: f32,
        v2g: bool,
        v2g_power_factor: f32,
        discharge_limit: f32,
        battery_efficiency: f32,
    ) -> Self {
        assert!(capacity_kwh > 0.0, "vehicle type capacity must be positive");
        assert!(
            (0.0..=1.0).contains(&min_charging_power_frac),
            "min_charging_power_frac must be in [0, 1]"
        );
        assert!(
            (0.0..=1.0).contains(&discharge_limit),
            "discharge_limit must be in [0, 1]"
        );
        assert!(
            battery_efficiency > 0.0 && battery_efficiency <= 1.0,
            "battery_efficiency must be in (0, 1]"
        );
        Self {
            capacity_kwh,
            mileage_kwh_per_100km,
            charging_curve,
            min_charging_power_frac,
            v2g,
            v2g_power_factor,
            discharge_limit,
            battery_efficiency,
        }
    }

    /// The refuse-charge threshold in kW for this type's curve.
    pub fn min_charging_power_kw(&self) -> f32 {
        self.charging_curve.peak_power_kw() * self.min_charging_power_frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_charging_power_kw_scales_curve_peak() {
        let vt = VehicleType::new(
            50.0,
            18.0,
            LoadingCurve::constant(22.0),
            0.1,
            false,
            0.0,
            0.0,
            0.95,
        );
        assert!((vt.min_charging_power_kw() - 2.2).abs() < 1e-4);
    }

    #[test]
    #[should_panic]
    fn rejects_non_positive_capacity() {
        VehicleType::new(
            0.0,
            18.0,
            LoadingCurve::constant(22.0),
            0.1,
            false,
            0.0,
            0.0,
            0.95,
        );
    }
}
