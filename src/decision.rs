//! Energy-aware amperage decision engine
//!
//! Pure mapping from a metering snapshot and the configured grid draw
//! ceiling to exactly one charge action. No I/O happens here; the control
//! loop feeds it and the executor carries out whatever it returns.

use crate::metering::MeteringSnapshot;

/// Candidate amperage levels, evaluated highest first.
pub const AMP_CANDIDATES: [u32; 8] = [13, 12, 11, 10, 9, 8, 7, 6];

/// Exactly one action per decision; never combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeAction {
    /// Current state already matches the target
    NoAction,
    /// Stop charging (surplus below the lowest candidate)
    Stop,
    /// Begin charging at the given amperage
    Start(u32),
    /// Adjust an active charge to the given amperage
    SetAmps(u32),
}

/// Additional import power the site may still absorb before violating the
/// configured ceiling. Grid power is positive when importing, so a site
/// exporting 2 kW with a ceiling of 0 W has 2 kW of headroom. The ceiling's
/// sign is preserved as configured: positive permits import, negative
/// demands export.
pub fn effective_headroom(snapshot: &MeteringSnapshot, max_grid_draw_watts: f64) -> f64 {
    -snapshot.grid_power_w + max_grid_draw_watts
}

/// Highest candidate amperage whose required power fits within the headroom,
/// or 0 when not even the lowest level fits.
fn target_amperage(headroom: f64, grid_voltage: f64) -> u32 {
    for amps in AMP_CANDIDATES {
        let required_power = f64::from(amps) * grid_voltage;
        if required_power <= headroom {
            return amps;
        }
    }
    0
}

/// Decide the single charge action for this tick.
///
/// `current_amps` is the last commanded or observed charging current, 0 when
/// unknown. The mapping applies hysteresis: a target equal to the current
/// value yields `NoAction` so an already-correct state is never resent.
pub fn decide(
    snapshot: &MeteringSnapshot,
    max_grid_draw_watts: f64,
    current_amps: u32,
) -> ChargeAction {
    let headroom = effective_headroom(snapshot, max_grid_draw_watts);
    let target = target_amperage(headroom, snapshot.grid_voltage);

    if target == 0 {
        if current_amps > 0 {
            return ChargeAction::Stop;
        }
        return ChargeAction::NoAction;
    }

    if target == current_amps {
        return ChargeAction::NoAction;
    }

    if current_amps == 0 {
        return ChargeAction::Start(target);
    }

    ChargeAction::SetAmps(target)
}
