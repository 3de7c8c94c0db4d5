//! Periodic control loop
//!
//! One tick per interval, run to completion, never overlapping: refresh
//! device endpoints, acquire a metering snapshot, log the energy balance,
//! run the decision engine against the runtime configuration, and - when a
//! command is required - drive the executor and persist the outcome. A
//! failed command trips the controller off (`enabled = false`) instead of
//! retrying; re-enabling is an explicit operator action.

use crate::command::{CommandExecutor, CommandOutcome, VehicleApi};
use crate::config::Config;
use crate::decision::{decide, effective_headroom, ChargeAction};
use crate::discovery::{DeviceDiscovery, DeviceSpec};
use crate::error::Result;
use crate::logging::get_logger;
use crate::metering::{CurrentSensorClient, MeterClient, MeteringSnapshot};
use crate::store::{NewChargeStatus, RuntimeConfigHandle, TelemetryStore};
use crate::token::TokenStore;
use crate::vehicle::{VehicleCommand, VehicleObservation};
use chrono::Timelike;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub struct ChargeController<T: TokenStore, A: VehicleApi> {
    config: Config,
    runtime: RuntimeConfigHandle,
    store: TelemetryStore,
    meter: MeterClient,
    sensor: CurrentSensorClient,
    discovery: DeviceDiscovery,
    executor: CommandExecutor<T, A>,
    shutdown_rx: watch::Receiver<bool>,
    logger: crate::logging::StructuredLogger,
    total_ticks: u64,
}

impl<T: TokenStore, A: VehicleApi> ChargeController<T, A> {
    pub fn new(
        config: Config,
        runtime: RuntimeConfigHandle,
        store: TelemetryStore,
        executor: CommandExecutor<T, A>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let logger = get_logger("controller");
        let meter = MeterClient::new(config.meter.clone())?;
        let sensor = CurrentSensorClient::new(config.sensor.clone())?;
        let discovery = DeviceDiscovery::new(config.discovery.clone())?;
        Ok(Self {
            config,
            runtime,
            store,
            meter,
            sensor,
            discovery,
            executor,
            shutdown_rx,
            logger,
            total_ticks: 0,
        })
    }

    /// Run the control loop until a shutdown signal arrives. A failed tick
    /// is logged and the next one still runs.
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting charge control loop");

        let mut tick_interval =
            interval(Duration::from_secs(self.config.control.tick_interval_secs));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.total_ticks = self.total_ticks.saturating_add(1);
                    if let Err(e) = self.tick().await {
                        self.logger.error(&format!("Tick failed: {}", e));
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        self.logger.info("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.logger.info("Control loop stopped");
        Ok(())
    }

    /// One tick. Any error here abandons the tick without touching
    /// persisted charge state.
    async fn tick(&mut self) -> Result<()> {
        self.logger.debug(&format!("Tick {} starting", self.total_ticks));

        let snapshot = self.acquire_snapshot().await?;
        self.run_cycle(snapshot).await
    }

    /// Run one control cycle over an already-acquired snapshot: log the
    /// energy balance and, on full cycles, decide and dispatch.
    pub async fn run_cycle(&mut self, snapshot: MeteringSnapshot) -> Result<()> {
        self.store
            .append_energy_balance(
                snapshot.solar_production_w,
                snapshot.grid_power_w,
                snapshot.surplus_w(),
            )
            .await?;

        if !self.is_full_cycle() {
            self.logger.debug("Partial cycle: energy balance logged only");
            return Ok(());
        }

        let runtime = self.runtime.get().await;
        if !runtime.enabled {
            self.logger.debug("Controller disabled, skipping decision");
            return Ok(());
        }

        let current_amps = self.store.latest_charging_amps().await?;
        let action = decide(&snapshot, runtime.max_grid_draw_watts, current_amps);
        self.logger.info(&format!(
            "Decision: {:?} (headroom={:.0}W, voltage={:.1}V, current={}A)",
            action,
            effective_headroom(&snapshot, runtime.max_grid_draw_watts),
            snapshot.grid_voltage,
            current_amps
        ));

        match action {
            ChargeAction::NoAction => {
                // Heartbeat row: the observed state is still valid
                self.persist_amps(current_amps, None).await?;
            }
            ChargeAction::Stop => {
                self.dispatch(VehicleCommand::ChargeStop, None, 0, current_amps)
                    .await?;
            }
            ChargeAction::Start(amps) | ChargeAction::SetAmps(amps) => {
                // The evaluator turns this into charge_start when the cable
                // is latched but the charge is stopped
                self.dispatch(VehicleCommand::SetChargingAmps, Some(amps), amps, current_amps)
                    .await?;
            }
        }

        Ok(())
    }

    /// Refresh device endpoints and read the meters into one snapshot.
    async fn acquire_snapshot(&mut self) -> Result<MeteringSnapshot> {
        let meter_spec = DeviceSpec {
            name: self.config.meter.name.clone(),
            ip: self.config.meter.ip.clone(),
            mac: self.config.meter.mac.clone(),
        };
        let meter_ip = self.discovery.ensure_endpoint(&meter_spec).await?;
        let (solar_w, grid_w, voltage) = self.meter.read_site_power(&meter_ip).await?;

        // The clamp reading is observability only; fall back to the last
        // persisted value rather than failing the tick
        let measured_amps = match self.read_sensor_amps().await {
            Ok(amps) => amps,
            Err(e) => {
                self.logger
                    .warn(&format!("Current clamp unavailable: {}", e));
                self.store.latest_charging_amps().await?
            }
        };

        MeteringSnapshot::new(solar_w, grid_w, measured_amps, voltage)
    }

    async fn read_sensor_amps(&mut self) -> Result<u32> {
        let sensor_spec = DeviceSpec {
            name: self.config.sensor.name.clone(),
            ip: self.config.sensor.ip.clone(),
            mac: self.config.sensor.mac.clone(),
        };
        let sensor_ip = self.discovery.ensure_endpoint(&sensor_spec).await?;
        self.sensor.read_amps(&sensor_ip).await
    }

    /// Send one command and persist the outcome; a failure trips the
    /// controller off for the operator to inspect.
    async fn dispatch(
        &mut self,
        command: VehicleCommand,
        amps: Option<u32>,
        persist_amps: u32,
        current_amps: u32,
    ) -> Result<()> {
        match self.executor.execute(command, amps).await {
            CommandOutcome::Success { observed, .. } => {
                // A success without an observation means a wake-up was
                // substituted; the charge state is unchanged and the real
                // command runs again next tick.
                let amps_row = if observed.is_some() {
                    persist_amps
                } else {
                    current_amps
                };
                self.persist_amps(amps_row, observed).await?;
            }
            CommandOutcome::Failed { message } => {
                self.logger.error(&format!(
                    "Command '{}' failed, disabling controller: {}",
                    command, message
                ));
                self.runtime.set_enabled(false).await?;
            }
        }
        Ok(())
    }

    async fn persist_amps(
        &self,
        charging_amps: u32,
        observed: Option<VehicleObservation>,
    ) -> Result<()> {
        let observed = observed.unwrap_or_default();
        self.store
            .append_charge_status(&NewChargeStatus {
                charging_amps,
                latitude: observed.latitude,
                longitude: observed.longitude,
                battery_level: observed.battery_level,
            })
            .await
    }

    /// Full cycles carry command decisions. With quarter-hour alignment on,
    /// only ticks on minutes divisible by 15 (configured timezone) qualify;
    /// other ticks log the energy balance and stop.
    fn is_full_cycle(&self) -> bool {
        if !self.config.control.quarter_hour_alignment {
            return true;
        }
        let tz: chrono_tz::Tz = self
            .config
            .timezone
            .parse()
            .unwrap_or(chrono_tz::Tz::UTC);
        let now = chrono::Utc::now().with_timezone(&tz);
        now.minute() % 15 == 0
    }
}
