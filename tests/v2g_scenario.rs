//! End-to-end V2G round trip: a price spike pulls a vehicle's SoC down to
//! its discharge floor, then balanced-market recharges it back before
//! departure at the expected round-trip loss.

mod common;

use spice_ev::components::Cost;
use spice_ev::events::{Event, EventQueue};
use spice_ev::scenario::{NegativeSocPolicy, Scenario};
use spice_ev::strategy::{BalancedMarketStrategy, Strategy};
use std::collections::BTreeMap;

#[test]
fn v2g_discharges_during_a_price_spike_and_recovers_with_expected_loss() {
    let vt = common::v2g_sprinter();
    let mut vehicle_types = BTreeMap::new();
    vehicle_types.insert("vt1".to_string(), vt.clone());

    let start_soc = 0.8_f32;
    let mut vehicles = BTreeMap::new();
    vehicles.insert(
        "car1".to_string(),
        spice_ev::components::Vehicle::new(
            "vt1",
            spice_ev::battery::Battery::new(70.0, start_soc, 0.95, vt.charging_curve.clone(), false),
            Some("cs1".to_string()),
            Some(common::t(20, 0)),
            start_soc,
        ),
    );

    let mut stations = BTreeMap::new();
    let mut cs = spice_ev::components::ChargingStation::new("gc1", 11.0, 0.0);
    cs.occupy("car1".to_string());
    stations.insert("cs1".to_string(), cs);

    let mut grid_connectors = BTreeMap::new();
    let mut gc = spice_ev::components::GridConnector::new(Some(100.0), spice_ev::components::VoltageLevel::LowVoltage);
    gc.set_cost(Cost::Fixed(0.1));
    grid_connectors.insert("gc1".to_string(), gc);

    // A price spike between t2 and t4: expensive enough that
    // balanced-market's discharge-in-the-expensive-tail heuristic kicks in.
    let mut events = EventQueue::new();
    events.push(Event::GridOperatorSignal {
        signal_time: common::t(0, 0),
        start_time: common::t(2, 0),
        grid_connector: "gc1".to_string(),
        max_power: None,
        cost: Some(Cost::Fixed(2.0)),
        charging_windows: None,
    });
    events.push(Event::GridOperatorSignal {
        signal_time: common::t(0, 0),
        start_time: common::t(4, 0),
        grid_connector: "gc1".to_string(),
        max_power: None,
        cost: Some(Cost::Fixed(0.1)),
        charging_windows: None,
    });

    let mut scenario = Scenario::new(
        vehicle_types,
        vehicles,
        stations,
        grid_connectors,
        BTreeMap::new(),
        BTreeMap::new(),
        events,
        Strategy::BalancedMarket(BalancedMarketStrategy),
        common::t(0, 0),
        60,
        20,
        NegativeSocPolicy::Abort,
    );

    let summary = scenario.run();
    assert!(summary.is_ok());

    let min_soc = scenario
        .records
        .iter()
        .map(|r| r.vehicle_soc["car1"])
        .fold(f32::INFINITY, f32::min);
    assert!(min_soc < start_soc - 1e-3, "min_soc={min_soc}, start_soc={start_soc}");
    assert!(min_soc >= vt.discharge_limit - 1e-3, "min_soc={min_soc} went past the discharge floor");

    let final_soc = scenario.vehicles["car1"].battery.soc;
    let efficiency = vt.battery_efficiency;
    let swing = start_soc - min_soc;
    // Discharging `swing` of SoC and recharging it back loses
    // (1 - eta^2) * swing * capacity worth of energy; expressed back in
    // SoC terms that is a shortfall of (1 - eta^2) * swing relative to
    // `start_soc`, so full recovery should fall short by about that much.
    let expected_shortfall = (1.0 - efficiency * efficiency) * swing;
    let actual_shortfall = start_soc - final_soc;
    assert!(
        actual_shortfall >= -1e-3,
        "recharge should not exceed the pre-spike SoC: final_soc={final_soc}"
    );
    assert!(
        (actual_shortfall - expected_shortfall).abs() < 0.05,
        "actual_shortfall={actual_shortfall}, expected_shortfall={expected_shortfall}"
    );
}
