//! Metering snapshot and local device clients
//!
//! One [`MeteringSnapshot`] is built per control-loop tick from the Shelly
//! 3EM meter (solar production on one phase, grid exchange on another) and
//! the current clamp measuring the vehicle feed. The snapshot is immutable;
//! only the derived decision and the persisted row outlive the tick.

use crate::config::{MeterConfig, SensorConfig};
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use serde::Deserialize;
use std::time::Duration;

const DEVICE_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalized meter readings for a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteringSnapshot {
    /// Solar production in watts, never negative
    pub solar_production_w: f64,
    /// Grid exchange in watts; positive = importing, negative = exporting
    pub grid_power_w: f64,
    /// Measured vehicle charging current in whole amps
    pub vehicle_charging_amps: u32,
    /// Measured grid voltage (nominal ~230 V)
    pub grid_voltage: f64,
}

impl MeteringSnapshot {
    /// Build a snapshot, enforcing the invariants: voltage must be positive,
    /// production is clamped at zero (inverters report tiny negative values
    /// at night).
    pub fn new(
        solar_production_w: f64,
        grid_power_w: f64,
        vehicle_charging_amps: u32,
        grid_voltage: f64,
    ) -> Result<Self> {
        if !grid_voltage.is_finite() || grid_voltage <= 0.0 {
            return Err(HeliosError::validation(
                "grid_voltage",
                "Measured grid voltage must be positive",
            ));
        }
        if !grid_power_w.is_finite() {
            return Err(HeliosError::validation(
                "grid_power_w",
                "Measured grid power must be finite",
            ));
        }
        Ok(Self {
            solar_production_w: solar_production_w.max(0.0),
            grid_power_w,
            vehicle_charging_amps,
            grid_voltage,
        })
    }

    /// Instantaneous surplus: production minus everything the site draws
    /// beyond what the grid sees. Logged to the energy balance table.
    pub fn surplus_w(&self) -> f64 {
        -self.grid_power_w
    }
}

/// One phase entry of the Shelly 3EM `/status` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EmeterReading {
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    pub pf: f64,
    pub total: f64,
    pub total_returned: f64,
    pub is_valid: bool,
}

#[derive(Debug, Deserialize)]
struct MeterStatus {
    emeters: Vec<EmeterReading>,
}

#[derive(Debug, Deserialize)]
struct SensorStatus {
    #[serde(rename = "irms_A")]
    irms_a: f64,
}

/// Client for the three-phase energy meter.
pub struct MeterClient {
    config: MeterConfig,
    client: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl MeterClient {
    pub fn new(config: MeterConfig) -> Result<Self> {
        let logger = get_logger("meter");
        let client = reqwest::Client::builder()
            .timeout(DEVICE_HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            client,
            logger,
        })
    }

    /// Read all phases from the meter at the given address.
    pub async fn read_emeters(&self, ip: &str) -> Result<Vec<EmeterReading>> {
        let url = format!("http://{}/status", ip);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(HeliosError::network(format!(
                "Meter {} returned HTTP {}",
                self.config.name,
                resp.status()
            )));
        }
        let status: MeterStatus = resp.json().await?;
        Ok(status.emeters)
    }

    /// Read the meter and extract the configured solar and grid phases.
    /// Returns `(solar_production_w, grid_power_w, grid_voltage)`.
    pub async fn read_site_power(&self, ip: &str) -> Result<(f64, f64, f64)> {
        let emeters = self.read_emeters(ip).await?;

        let solar = emeters.get(self.config.solar_phase).ok_or_else(|| {
            HeliosError::api(format!(
                "Meter payload missing solar phase {}",
                self.config.solar_phase
            ))
        })?;
        let grid = emeters.get(self.config.grid_phase).ok_or_else(|| {
            HeliosError::api(format!(
                "Meter payload missing grid phase {}",
                self.config.grid_phase
            ))
        })?;

        if !solar.is_valid || !grid.is_valid {
            return Err(HeliosError::api(format!(
                "Meter {} reports invalid phase data",
                self.config.name
            )));
        }

        self.logger.debug(&format!(
            "Meter read: solar={:.1}W grid={:.1}W voltage={:.1}V",
            solar.power, grid.power, grid.voltage
        ));

        Ok((solar.power, grid.power, grid.voltage))
    }
}

/// Client for the current clamp on the vehicle feed.
pub struct CurrentSensorClient {
    config: SensorConfig,
    client: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl CurrentSensorClient {
    pub fn new(config: SensorConfig) -> Result<Self> {
        let logger = get_logger("sensor");
        let client = reqwest::Client::builder()
            .timeout(DEVICE_HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            client,
            logger,
        })
    }

    /// Read the measured charging current, rounded to whole amps.
    pub async fn read_amps(&self, ip: &str) -> Result<u32> {
        let url = format!("http://{}/status", ip);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(HeliosError::network(format!(
                "Sensor {} returned HTTP {}",
                self.config.name,
                resp.status()
            )));
        }
        let status: SensorStatus = resp.json().await?;
        let amps = status.irms_a.max(0.0).round() as u32;
        self.logger
            .debug(&format!("Clamp read: irms={:.2}A -> {}A", status.irms_a, amps));
        Ok(amps)
    }
}
