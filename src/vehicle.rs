//! Typed vehicle telemetry and the command precondition evaluator
//!
//! Every nested field of the Fleet API payload is optional: a missing key is
//! a defined `None`, never a traversal panic. The evaluator is a pure
//! function over the raw HTTP status and body of a `vehicle_data` fetch; it
//! decides whether a command may proceed and which corrective step to take
//! otherwise. Network and token handling live in [`crate::command`].

use serde::Deserialize;

/// Commands accepted by the vehicle endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    WakeUp,
    ChargeStart,
    ChargeStop,
    SetChargingAmps,
}

impl VehicleCommand {
    /// Wire name used in the command URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCommand::WakeUp => "wake_up",
            VehicleCommand::ChargeStart => "charge_start",
            VehicleCommand::ChargeStop => "charge_stop",
            VehicleCommand::SetChargingAmps => "set_charging_amps",
        }
    }
}

impl std::fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level `vehicle_data` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleData {
    #[serde(default)]
    pub response: Option<VehicleResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleResponse {
    #[serde(default)]
    pub charge_state: Option<ChargeState>,
    #[serde(default)]
    pub drive_state: Option<DriveState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeState {
    #[serde(default)]
    pub charging_state: Option<String>,
    #[serde(default)]
    pub charge_port_latch: Option<String>,
    #[serde(default)]
    pub charge_port_door_open: Option<bool>,
    #[serde(default)]
    pub charger_actual_current: Option<i64>,
    #[serde(default)]
    pub battery_level: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriveState {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// What the telemetry fetch observed, kept for persistence alongside the
/// command outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleObservation {
    pub charger_actual_current: Option<i64>,
    pub battery_level: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl VehicleData {
    /// Extract the persistable observation from the payload.
    pub fn observation(&self) -> VehicleObservation {
        let charge = self
            .response
            .as_ref()
            .and_then(|r| r.charge_state.as_ref());
        let drive = self.response.as_ref().and_then(|r| r.drive_state.as_ref());
        VehicleObservation {
            charger_actual_current: charge.and_then(|c| c.charger_actual_current),
            battery_level: charge.and_then(|c| c.battery_level),
            latitude: drive.and_then(|d| d.latitude),
            longitude: drive.and_then(|d| d.longitude),
        }
    }
}

/// Validated pre-condition for sending a command.
#[derive(Debug, Clone, PartialEq)]
pub enum VehiclePrecondition {
    /// A command may be sent. The command may differ from the one requested:
    /// a stopped charge with the cable latched is recovered by `charge_start`
    /// regardless of the original request.
    Ready {
        command: VehicleCommand,
        observed: VehicleObservation,
    },
    /// The access token is expired or invalid; refresh once and retry.
    NeedsTokenRefresh,
    /// The vehicle is asleep/unreachable; substitute a wake-up.
    NeedsWakeUp,
    /// No command may be sent this invocation.
    Rejected(String),
}

const TOKEN_MARKERS: [&str; 2] = ["token expired", "invalid bearer token"];
const UNAVAILABLE_MARKER: &str = "vehicle unavailable";

/// Evaluate a raw `vehicle_data` response ahead of a command.
///
/// Executed before every command except a bare wake-up. Pure: same inputs,
/// same result.
pub fn evaluate_vehicle_state(
    status: u16,
    body: &str,
    requested: VehicleCommand,
) -> VehiclePrecondition {
    let parsed: Result<VehicleData, _> = serde_json::from_str(body);
    let Ok(data) = parsed else {
        return VehiclePrecondition::Rejected("malformed response".to_string());
    };

    let body_lower = body.to_lowercase();

    if status != 200 {
        if TOKEN_MARKERS.iter().any(|m| body_lower.contains(m)) {
            return VehiclePrecondition::NeedsTokenRefresh;
        }
        if body_lower.contains(UNAVAILABLE_MARKER) {
            return VehiclePrecondition::NeedsWakeUp;
        }
        return VehiclePrecondition::Rejected(format!("transport error {}", status));
    }

    let observed = data.observation();
    let charge = data
        .response
        .as_ref()
        .and_then(|r| r.charge_state.as_ref());

    let door_open = charge
        .and_then(|c| c.charge_port_door_open)
        .unwrap_or(false);
    let latch_engaged = charge
        .and_then(|c| c.charge_port_latch.as_deref())
        .map(|l| l == "Engaged")
        .unwrap_or(false);

    if !(door_open && latch_engaged) {
        return VehiclePrecondition::Rejected("cable not connected".to_string());
    }

    match charge.and_then(|c| c.charging_state.as_deref()) {
        Some("Stopped") => VehiclePrecondition::Ready {
            command: VehicleCommand::ChargeStart,
            observed,
        },
        Some("Charging") => VehiclePrecondition::Ready {
            command: requested,
            observed,
        },
        _ => VehiclePrecondition::Rejected(
            "port engaged but not actively chargeable".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_nested_keys_are_none() {
        let data: VehicleData = serde_json::from_str(r#"{"response": {}}"#).unwrap();
        let obs = data.observation();
        assert_eq!(obs.battery_level, None);
        assert_eq!(obs.latitude, None);
    }

    #[test]
    fn observation_extracts_drive_and_charge_state() {
        let body = r#"{
            "response": {
                "charge_state": {"charging_state": "Charging", "charger_actual_current": 9,
                                  "battery_level": 64},
                "drive_state": {"latitude": 43.77, "longitude": 11.25}
            }
        }"#;
        let data: VehicleData = serde_json::from_str(body).unwrap();
        let obs = data.observation();
        assert_eq!(obs.charger_actual_current, Some(9));
        assert_eq!(obs.battery_level, Some(64));
        assert_eq!(obs.latitude, Some(43.77));
    }

    #[test]
    fn token_marker_check_is_case_insensitive() {
        let pre = evaluate_vehicle_state(
            401,
            r#"{"error": "Invalid BEARER Token provided"}"#,
            VehicleCommand::ChargeStart,
        );
        assert_eq!(pre, VehiclePrecondition::NeedsTokenRefresh);
    }
}
