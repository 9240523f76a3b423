//! Battery energy storage: SoC-aware charge/discharge integration.
//!
//! Mirrors the loading-curve-bounded charge model used throughout the
//! scenario stepper, but is usable standalone (vehicle batteries and
//! stationary batteries both wrap one of these).

use crate::curve::LoadingCurve;

/// Convergence tolerance for [`Battery::load_iterative`]'s binary search.
pub const EPS: f32 = 1e-5;
/// Maximum bisection steps for [`Battery::load_iterative`].
pub const ITERATIONS: u32 = 12;

/// A chemical energy store bounded by a [`LoadingCurve`].
///
/// # Power convention
///
/// Positive power is always energy flowing *into* the battery ([`Self::load`])
/// or *out of* it ([`Self::unload`]); neither method takes a signed
/// setpoint, keeping charge and discharge as two distinct methods
/// rather than one signed-setpoint method.
#[derive(Debug, Clone)]
pub struct Battery {
    /// Usable capacity in kWh.
    pub capacity_kwh: f32,
    /// State of charge in `[0, 1]`.
    pub soc: f32,
    /// Round-trip efficiency applied symmetrically to charge and discharge.
    pub efficiency: f32,
    /// SoC-dependent power ceiling.
    pub loading_curve: LoadingCurve,
    /// Whether SoC may be driven below zero by an arrival `soc_delta`
    /// rather than clamped (propagated from the owning vehicle/scenario
    /// policy; the battery itself never *produces* negative SoC through
    /// `load`/`unload`).
    pub allow_negative_soc: bool,
}

impl Battery {
    /// Builds a battery, asserting the invariants a scenario file should
    /// already have validated at load time.
    pub fn new(
        capacity_kwh: f32,
        soc: f32,
        efficiency: f32,
        loading_curve: LoadingCurve,
        allow_negative_soc: bool,
    ) -> Self {
        assert!(capacity_kwh > 0.0, "battery capacity must be positive");
        assert!(
            efficiency > 0.0 && efficiency <= 1.0,
            "efficiency must be in (0, 1]"
        );
        let soc = if allow_negative_soc {
            soc.min(1.0)
        } else {
            soc.clamp(0.0, 1.0)
        };
        Self {
            capacity_kwh,
            soc,
            efficiency,
            loading_curve,
            allow_negative_soc,
        }
    }

    /// Charges the battery at up to `power_kw` for `dt_hours`, bounded by
    /// the loading curve at the *starting* SoC and by remaining capacity.
    ///
    /// Returns `(actual_power_kw, energy_delivered_kwh)`, where the energy
    /// figure already accounts for charging losses (it is the amount added
    /// to the battery, not the amount drawn from the grid connector).
    ///
    /// A non-positive `power_kw` is a no-op: negative power on a battery
    /// that is not being charged has no meaning here and simply returns
    /// zero rather than erroring.
    pub fn load(&mut self, power_kw: f32, dt_hours: f32) -> (f32, f32) {
        if power_kw <= 0.0 || dt_hours <= 0.0 {
            return (0.0, 0.0);
        }
        let curve_limit = self.loading_curve.power_at(self.soc);
        let headroom_kwh = (1.0 - self.soc).max(0.0) * self.capacity_kwh;
        let capacity_limit_kw = (headroom_kwh / self.efficiency) / dt_hours;
        let actual_kw = power_kw.min(curve_limit).max(0.0).min(capacity_limit_kw.max(0.0));
        let energy_delivered = actual_kw * dt_hours * self.efficiency;
        self.soc = (self.soc + energy_delivered / self.capacity_kwh).clamp(0.0, 1.0);
        (actual_kw, energy_delivered)
    }

    /// Discharges the battery at up to `power_kw` for `dt_hours`, never
    /// drawing SoC below `target_soc` (the V2G floor, or `0.0` for an
    /// unconstrained discharge).
    ///
    /// Returns `(actual_power_kw, energy_returned_kwh)`, the energy
    /// figure being what reaches the grid connector after discharge
    /// losses.
    pub fn unload(&mut self, power_kw: f32, dt_hours: f32, target_soc: f32) -> (f32, f32) {
        if power_kw <= 0.0 || dt_hours <= 0.0 {
            return (0.0, 0.0);
        }
        let floor = target_soc.clamp(0.0, 1.0);
        let available_kwh = (self.soc - floor).max(0.0) * self.capacity_kwh;
        let max_kw = (available_kwh * self.efficiency) / dt_hours;
        let actual_kw = power_kw.min(max_kw.max(0.0));
        let energy_returned = actual_kw * dt_hours;
        let drawn_from_battery = if self.efficiency > 0.0 {
            energy_returned / self.efficiency
        } else {
            0.0
        };
        self.soc = (self.soc - drawn_from_battery / self.capacity_kwh).clamp(0.0, 1.0);
        (actual_kw, energy_returned)
    }

    /// Charges towards `power_kw` over `dt_hours` using a bounded binary
    /// search instead of the single-segment bound used by [`Self::load`].
    ///
    /// The loading curve's ceiling changes continuously as SoC rises
    /// during the interval, so the largest constant power that can be
    /// sustained for the whole interval without overshooting full SoC is
    /// not available in closed form from a single curve lookup; this
    /// bisects on the delivered power using [`LoadingCurve::soc_after`]
    /// as the forward model, stopping after [`ITERATIONS`] steps or once
    /// the bracket shrinks below [`EPS`].
    pub fn load_iterative(&mut self, power_kw: f32, dt_hours: f32) -> (f32, f32) {
        if power_kw <= 0.0 || dt_hours <= 0.0 {
            return (0.0, 0.0);
        }
        let mut lo = 0.0_f32;
        let mut hi = power_kw.min(self.loading_curve.peak_power_kw().max(power_kw));
        let mut best = lo;
        for _ in 0..ITERATIONS {
            if (hi - lo).abs() < EPS {
                break;
            }
            let mid = 0.5 * (lo + hi);
            let soc_end = self
                .loading_curve
                .soc_after(self.soc, dt_hours, self.efficiency, mid, self.capacity_kwh);
            if soc_end < 1.0 - EPS {
                best = mid;
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let actual_kw = best.min(power_kw);
        let soc_end =
            self.loading_curve
                .soc_after(self.soc, dt_hours, self.efficiency, actual_kw, self.capacity_kwh);
        let energy_delivered = ((soc_end - self.soc) * self.capacity_kwh).max(0.0);
        self.soc = soc_end;
        (actual_kw, energy_delivered)
    }

    /// Power available for discharge over `dt_hours` without dropping
    /// below `target_soc`. Read-only: does not mutate `soc`.
    pub fn available_power(&self, dt_hours: f32, target_soc: f32) -> f32 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        let floor = target_soc.clamp(0.0, 1.0);
        let available_kwh = (self.soc - floor).max(0.0) * self.capacity_kwh;
        (available_kwh * self.efficiency) / dt_hours
    }
}
