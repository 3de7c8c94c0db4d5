//! End-to-end tests for the amperage decision engine.

use helios::decision::{decide, effective_headroom, ChargeAction, AMP_CANDIDATES};
use helios::metering::MeteringSnapshot;

fn snapshot(solar_w: f64, grid_w: f64, current_amps: u32, voltage: f64) -> MeteringSnapshot {
    MeteringSnapshot::new(solar_w, grid_w, current_amps, voltage).unwrap()
}

#[test]
fn surplus_export_starts_at_highest_fitting_level() {
    // Producing 4 kW, exporting 2 kW at 230 V with a zero ceiling:
    // 8 * 230 = 1840 fits, 9 * 230 = 2070 does not.
    let snap = snapshot(4000.0, -2000.0, 0, 230.0);
    assert_eq!(decide(&snap, 0.0, 0), ChargeAction::Start(8));
}

#[test]
fn import_above_ceiling_stops_an_active_charge() {
    // Importing 500 W with a zero ceiling leaves negative headroom.
    let snap = snapshot(1200.0, 500.0, 8, 230.0);
    assert_eq!(decide(&snap, 0.0, 8), ChargeAction::Stop);
}

#[test]
fn ceiling_buys_extra_headroom() {
    // Exporting 1000 W plus an 840 W allowance reaches 1840 W, enough for 8 A.
    let snap = snapshot(3000.0, -1000.0, 0, 230.0);
    assert_eq!(decide(&snap, 0.0, 0), ChargeAction::NoAction);
    assert_eq!(decide(&snap, 840.0, 0), ChargeAction::Start(8));
}

#[test]
fn negative_ceiling_demands_export() {
    let snap = snapshot(3000.0, -2000.0, 0, 230.0);
    assert_eq!(effective_headroom(&snap, -800.0), 1200.0);
    // 1200 W headroom is below 6 * 230 = 1380 W, so nothing starts.
    assert_eq!(decide(&snap, -800.0, 0), ChargeAction::NoAction);
}

#[test]
fn every_decision_lands_on_a_candidate_level() {
    for headroom_w in (-2000..6000).step_by(37) {
        let snap = snapshot(5000.0, -f64::from(headroom_w), 0, 230.0);
        for current in [0u32, 6, 9, 13] {
            let action = decide(&snap, 0.0, current);
            match action {
                ChargeAction::Start(a) | ChargeAction::SetAmps(a) => {
                    assert!(
                        AMP_CANDIDATES.contains(&a),
                        "non-candidate amperage {} for headroom {}",
                        a,
                        headroom_w
                    );
                }
                ChargeAction::Stop => assert!(current > 0),
                ChargeAction::NoAction => {}
            }
        }
    }
}

#[test]
fn decisions_are_deterministic() {
    let snap = snapshot(4000.0, -2000.0, 0, 230.0);
    let first = decide(&snap, 0.0, 0);
    assert_eq!(first, decide(&snap, 0.0, 0));
}

#[test]
fn converging_on_target_settles_to_no_action() {
    // Follow the engine's own output: once the target is applied, the next
    // tick with the same balance must not re-send it.
    let snap = snapshot(4000.0, -2000.0, 0, 230.0);
    let ChargeAction::Start(target) = decide(&snap, 0.0, 0) else {
        panic!("expected a start decision");
    };
    assert_eq!(decide(&snap, 0.0, target), ChargeAction::NoAction);
}

#[test]
fn shrinking_surplus_steps_the_charge_down() {
    let snap = snapshot(3000.0, -1500.0, 10, 230.0);
    // 1500 W headroom fits 6 A (1380 W) but not 7 A (1610 W).
    assert_eq!(decide(&snap, 0.0, 10), ChargeAction::SetAmps(6));
}
