//! Local photovoltaic generation.
//!
//! The actual generated-power time series arrives as
//! [`crate::events::Event::LocalGenerationUpdate`] entries applied to the
//! owning grid connector; this type carries only the metadata needed for
//! feed-in reporting.

/// A PV installation feeding into a grid connector.
#[derive(Debug, Clone)]
pub struct Photovoltaic {
    pub parent_grid_connector: String,
    /// Nameplate capacity in kW, used only to compute feed-in remuneration
    /// in reporting; the core never clamps generation to this value since
    /// the measured series is authoritative.
    pub nominal_power_kw: f32,
}

impl Photovoltaic {
    pub fn new(parent_grid_connector: impl Into<String>, nominal_power_kw: f32) -> Self {
        assert!(nominal_power_kw >= 0.0, "nominal_power_kw must be non-negative");
        Self {
            parent_grid_connector: parent_grid_connector.into(),
            nominal_power_kw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn rejects_negative_nominal_power() {
        Photovoltaic::new("gc1", -1.0);
    }
}
