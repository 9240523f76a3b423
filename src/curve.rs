//! Piecewise-linear SoC→max-power loading curves.
//!
//! A [`LoadingCurve`] bounds how fast a battery may charge as a function of
//! its current state of charge. Breakpoints are strictly increasing in SoC
//! and cover the full `[0, 1]` range; power is linearly interpolated between
//! them.

use serde::{Deserialize, Serialize};

/// A single (SoC, max power) breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CurvePoint {
    /// State of charge in `[0, 1]`.
    pub soc: f32,
    /// Maximum power at this SoC, in kW (>= 0).
    pub power_kw: f32,
}

/// Piecewise-linear SoC→max-power curve.
///
/// # Examples
///
/// ```
/// use spice_ev::curve::{CurvePoint, LoadingCurve};
///
/// let curve = LoadingCurve::new(vec![
///     CurvePoint { soc: 0.0, power_kw: 22.0 },
///     CurvePoint { soc: 0.8, power_kw: 22.0 },
///     CurvePoint { soc: 1.0, power_kw: 5.0 },
/// ]).unwrap();
///
/// assert_eq!(curve.power_at(0.5), 22.0);
/// assert!(curve.power_at(0.9) < 22.0);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "Vec<CurvePoint>", into = "Vec<CurvePoint>")]
pub struct LoadingCurve {
    points: Vec<CurvePoint>,
}

impl LoadingCurve {
    /// Builds a curve from breakpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than two points are given, SoC is not
    /// strictly increasing, SoC falls outside `[0, 1]` at the endpoints, or
    /// any power is negative.
    pub fn new(points: Vec<CurvePoint>) -> Result<Self, String> {
        if points.len() < 2 {
            return Err("a loading curve needs at least two breakpoints".to_string());
        }
        for w in points.windows(2) {
            if w[1].soc <= w[0].soc {
                return Err("breakpoints must have strictly increasing soc".to_string());
            }
        }
        if points.iter().any(|p| p.power_kw < 0.0) {
            return Err("breakpoint power must be non-negative".to_string());
        }
        if points.first().map(|p| p.soc) != Some(0.0) || points.last().map(|p| p.soc) != Some(1.0)
        {
            return Err("a loading curve must cover the full [0, 1] soc range".to_string());
        }
        Ok(Self { points })
    }

    /// A flat curve of constant power across the whole SoC range.
    pub fn constant(power_kw: f32) -> Self {
        Self {
            points: vec![
                CurvePoint {
                    soc: 0.0,
                    power_kw,
                },
                CurvePoint {
                    soc: 1.0,
                    power_kw,
                },
            ],
        }
    }

    /// Maximum power reachable at `soc` by linear interpolation.
    ///
    /// SoC outside `[0, 1]` clamps to the nearest endpoint's power.
    pub fn power_at(&self, soc: f32) -> f32 {
        if soc <= self.points[0].soc {
            return self.points[0].power_kw;
        }
        let last = self.points.len() - 1;
        if soc >= self.points[last].soc {
            return self.points[last].power_kw;
        }
        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            if soc >= a.soc && soc <= b.soc {
                let frac = (soc - a.soc) / (b.soc - a.soc);
                return a.power_kw + frac * (b.power_kw - a.power_kw);
            }
        }
        unreachable!("soc within [0,1] must fall in some segment")
    }

    /// Returns a new curve with every breakpoint's power capped at
    /// `upper_power_kw`.
    pub fn clamp(&self, upper_power_kw: f32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| CurvePoint {
                    soc: p.soc,
                    power_kw: p.power_kw.min(upper_power_kw.max(0.0)),
                })
                .collect(),
        }
    }

    /// Peak power across the whole curve.
    pub fn peak_power_kw(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.power_kw)
            .fold(0.0_f32, f32::max)
    }

    /// Hours required to move from `soc_from` to `soc_to` under this curve,
    /// assuming the vehicle always draws the curve's maximum available
    /// power (closed-form per segment, no sub-stepping).
    ///
    /// Returns `0.0` if `soc_to <= soc_from`.
    pub fn time_to_reach(&self, soc_from: f32, soc_to: f32) -> f32 {
        if soc_to <= soc_from {
            return 0.0;
        }
        let soc_from = soc_from.clamp(0.0, 1.0);
        let soc_to = soc_to.clamp(0.0, 1.0);
        let mut hours = 0.0_f32;
        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let lo = soc_from.max(a.soc);
            let hi = soc_to.min(b.soc);
            if hi <= lo {
                continue;
            }
            hours += Self::segment_time(a, b, lo, hi);
        }
        hours
    }

    /// Time in hours to cross `[lo, hi]` within one linear segment `a..b`,
    /// normalized to a unit-capacity, `efficiency=1` battery; callers fold
    /// in the real capacity and efficiency (hours_real = hours * capacity_kwh / efficiency).
    fn segment_time(a: CurvePoint, b: CurvePoint, lo: f32, hi: f32) -> f32 {
        let slope = (b.power_kw - a.power_kw) / (b.soc - a.soc);
        let power_at = |soc: f32| a.power_kw + (soc - a.soc) * slope;
        let p_lo = power_at(lo);
        let p_hi = power_at(hi);
        if slope.abs() < 1e-9 {
            // constant power segment: d(soc)/dt = p, so t = (hi - lo) / p.
            return (hi - lo) / p_lo.max(1e-9);
        }
        // Linear power segment: d(soc)/dt = p(soc). Integrating 1/p(soc)
        // over soc gives the closed form t = ln(p_hi / p_lo) / slope.
        (1.0 / slope) * (p_hi / p_lo).ln()
    }

    /// Exact inverse of [`Self::segment_time`]: the SoC reached after
    /// `unit_hours` (normalized to a unit-capacity, `efficiency=1`
    /// battery) starting from `lo`, within segment `a..b`. Solved
    /// analytically per segment, not by sub-stepping.
    fn segment_soc_after(a: CurvePoint, b: CurvePoint, lo: f32, unit_hours: f32) -> f32 {
        let slope = (b.power_kw - a.power_kw) / (b.soc - a.soc);
        let power_at = |soc: f32| a.power_kw + (soc - a.soc) * slope;
        let p_lo = power_at(lo).max(1e-9);
        if slope.abs() < 1e-9 {
            return lo + unit_hours * p_lo;
        }
        // Invert t = ln(p_target / p_lo) / slope for p_target, then invert
        // the linear power law for soc.
        let p_target = p_lo * (slope * unit_hours).exp();
        lo + (p_target - p_lo) / slope
    }

    /// SoC reached after charging for `hours` from `soc_from`, given
    /// `efficiency` and an external `power_ceiling_kw` (e.g. a station or GC
    /// limit) in addition to the curve's own limit.
    ///
    /// This is the exact inverse of [`Self::time_to_reach`], solved
    /// analytically per segment (no sub-stepping, no averaged-power
    /// approximation). `capacity_kwh` and `efficiency` convert between real
    /// hours and the curve's unit-capacity, `efficiency=1` normalization.
    pub fn soc_after(
        &self,
        soc_from: f32,
        hours: f32,
        efficiency: f32,
        power_ceiling_kw: f32,
        capacity_kwh: f32,
    ) -> f32 {
        if hours <= 0.0 || capacity_kwh <= 0.0 {
            return soc_from.clamp(0.0, 1.0);
        }
        let clamped = self.clamp(power_ceiling_kw.max(0.0));
        let mut soc = soc_from.clamp(0.0, 1.0);
        let mut remaining = hours;
        for w in clamped.points.windows(2) {
            if remaining <= 0.0 || soc >= 1.0 {
                break;
            }
            let (a, b) = (w[0], w[1]);
            if soc >= b.soc {
                continue;
            }
            let lo = soc.max(a.soc);
            let hi = b.soc;

            // Real hours to cross the remainder of this segment, folding
            // the unit-capacity normalization back into actual kWh/eta.
            let full_crossing_hours = Self::segment_time(a, b, lo, hi) * capacity_kwh / efficiency;

            if full_crossing_hours <= remaining {
                soc = hi;
                remaining -= full_crossing_hours;
            } else {
                let unit_hours = remaining * efficiency / capacity_kwh;
                soc = Self::segment_soc_after(a, b, lo, unit_hours).clamp(lo, hi);
                remaining = 0.0;
            }
        }
        soc.clamp(0.0, 1.0)
    }
}

impl TryFrom<Vec<CurvePoint>> for LoadingCurve {
    type Error = String;
    fn try_from(points: Vec<CurvePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<LoadingCurve> for Vec<CurvePoint> {
    fn from(curve: LoadingCurve) -> Self {
        curve.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_then_taper() -> LoadingCurve {
        LoadingCurve::new(vec![
            CurvePoint {
                soc: 0.0,
                power_kw: 22.0,
            },
            CurvePoint {
                soc: 0.8,
                power_kw: 22.0,
            },
            CurvePoint {
                soc: 1.0,
                power_kw: 5.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn rejects_fewer_than_two_points() {
        let err = LoadingCurve::new(vec![CurvePoint {
            soc: 0.0,
            power_kw: 1.0,
        }]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_monotonic_soc() {
        let err = LoadingCurve::new(vec![
            CurvePoint {
                soc: 0.0,
                power_kw: 1.0,
            },
            CurvePoint {
                soc: 0.0,
                power_kw: 2.0,
            },
            CurvePoint {
                soc: 1.0,
                power_kw: 2.0,
            },
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_curve_not_covering_full_range() {
        let err = LoadingCurve::new(vec![
            CurvePoint {
                soc: 0.1,
                power_kw: 1.0,
            },
            CurvePoint {
                soc: 1.0,
                power_kw: 2.0,
            },
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn power_at_flat_segment() {
        let c = flat_then_taper();
        assert_eq!(c.power_at(0.0), 22.0);
        assert_eq!(c.power_at(0.5), 22.0);
        assert_eq!(c.power_at(0.8), 22.0);
    }

    #[test]
    fn power_at_tapering_segment() {
        let c = flat_then_taper();
        let mid = c.power_at(0.9);
        assert!((mid - 13.5).abs() < 1e-4);
        assert_eq!(c.power_at(1.0), 5.0);
    }

    #[test]
    fn power_at_clamps_outside_range() {
        let c = flat_then_taper();
        assert_eq!(c.power_at(-0.5), 22.0);
        assert_eq!(c.power_at(1.5), 5.0);
    }

    #[test]
    fn clamp_caps_every_breakpoint() {
        let c = flat_then_taper().clamp(11.0);
        assert_eq!(c.power_at(0.0), 11.0);
        assert_eq!(c.power_at(1.0), 5.0);
    }

    #[test]
    fn peak_power_is_curve_maximum() {
        let c = flat_then_taper();
        assert_eq!(c.peak_power_kw(), 22.0);
    }

    #[test]
    fn time_to_reach_is_zero_when_already_there() {
        let c = flat_then_taper();
        assert_eq!(c.time_to_reach(0.5, 0.5), 0.0);
        assert_eq!(c.time_to_reach(0.8, 0.2), 0.0);
    }

    #[test]
    fn time_to_reach_flat_segment_matches_simple_division() {
        let c = LoadingCurve::constant(10.0);
        // crossing soc=0.0..0.5 at constant 10kW (normalized) takes 0.05h
        let t = c.time_to_reach(0.0, 0.5);
        assert!((t - 0.05).abs() < 1e-4);
    }

    #[test]
    fn soc_after_constant_curve_matches_linear_energy() {
        let c = LoadingCurve::constant(10.0);
        // 10 kWh battery, 1h at 10kW, eta=1.0 -> fully charged from 0
        let soc = c.soc_after(0.0, 1.0, 1.0, 10.0, 10.0);
        assert!((soc - 1.0).abs() < 1e-3);
    }

    #[test]
    fn soc_after_respects_power_ceiling() {
        let c = LoadingCurve::constant(10.0);
        // ceiling of 5kW halves the energy delivered in the same time
        let soc_uncapped = c.soc_after(0.0, 0.5, 1.0, 10.0, 10.0);
        let soc_capped = c.soc_after(0.0, 0.5, 1.0, 5.0, 10.0);
        assert!(soc_capped < soc_uncapped);
    }

    #[test]
    fn soc_after_never_exceeds_one() {
        let c = flat_then_taper();
        let soc = c.soc_after(0.0, 100.0, 0.95, 22.0, 50.0);
        assert!(soc <= 1.0 + 1e-6);
    }

    #[test]
    fn soc_after_is_exact_inverse_of_time_to_reach_on_a_tapering_segment() {
        // round-tripping through the normalized time_to_reach and back
        // through soc_after should land exactly on soc_to (analytic
        // inverse), not just approximately (an averaged-power estimate
        // would drift on a sloped segment).
        let c = flat_then_taper();
        let capacity_kwh = 50.0;
        let efficiency = 0.95;
        let soc_from = 0.8;
        let soc_to = 0.95;
        let normalized_hours = c.time_to_reach(soc_from, soc_to);
        let real_hours = normalized_hours * capacity_kwh / efficiency;
        let soc = c.soc_after(soc_from, real_hours, efficiency, c.peak_power_kw(), capacity_kwh);
        assert!((soc - soc_to).abs() < 1e-4, "soc={soc}, expected={soc_to}");
    }
}
