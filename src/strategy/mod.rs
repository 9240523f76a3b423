//! Charging strategies: per-interval power allocation policies.
//!
//! Modeled as a closed, tagged enum rather than `dyn Strategy` trait
//! objects — the strategy family is fixed per scenario run and never
//! extended at runtime, so enum dispatch avoids a needless indirection
//! layer and keeps every variant's state inline.

pub mod balanced;
pub mod balanced_market;
pub mod base;
pub mod distributed;
pub mod flex_window;
pub mod greedy;
pub mod peak_load_window;
pub mod schedule;

use crate::world::World;

pub use balanced::BalancedStrategy;
pub use balanced_market::BalancedMarketStrategy;
pub use base::VehicleOrder;
pub use distributed::DistributedStrategy;
pub use flex_window::{FlexSubMode, FlexWindowStrategy};
pub use greedy::GreedyStrategy;
pub use peak_load_window::PeakLoadWindowStrategy;
pub use schedule::{CoreStandingTime, ScheduleMode, ScheduleStrategy};

/// A grid connector left over its `max_power` after a strategy step,
/// with the allocation already rolled back proportionally by the time
/// this is reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    pub grid_connector: String,
    pub load_kw: f32,
    pub max_kw: f32,
}

/// Outcome of one strategy step: empty unless some grid connector could
/// not be kept within its limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub overloads: Vec<Overload>,
}

impl StepReport {
    pub fn is_ok(&self) -> bool {
        self.overloads.is_empty()
    }
}

/// The closed set of charging strategies the stepper can drive.
#[derive(Debug, Clone)]
pub enum Strategy {
    Greedy(GreedyStrategy),
    Balanced(BalancedStrategy),
    BalancedMarket(BalancedMarketStrategy),
    Schedule(ScheduleStrategy),
    PeakLoadWindow(PeakLoadWindowStrategy),
    FlexWindow(FlexWindowStrategy),
    Distributed(DistributedStrategy),
}

impl Strategy {
    pub fn step(&mut self, world: &mut World) -> StepReport {
        match self {
            Strategy::Greedy(s) => s.step(world),
            Strategy::Balanced(s) => s.step(world),
            Strategy::BalancedMarket(s) => s.step(world),
            Strategy::Schedule(s) => s.step(world),
            Strategy::PeakLoadWindow(s) => s.step(world),
            Strategy::FlexWindow(s) => s.step(world),
            Strategy::Distributed(s) => s.step(world),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Greedy(_) => "greedy",
            Strategy::Balanced(_) => "balanced",
            Strategy::BalancedMarket(_) => "balanced_market",
            Strategy::Schedule(_) => "schedule",
            Strategy::PeakLoadWindow(_) => "peak_load_window",
            Strategy::FlexWindow(_) => "flex_window",
            Strategy::Distributed(_) => "distributed",
        }
    }
}
