//! Command execution against the vehicle
//!
//! [`CommandExecutor`] drives one logical command end-to-end: load the
//! access token, pre-check vehicle state through the evaluator, apply the
//! one-shot token refresh and single wake-up substitution, then POST the
//! command through the local TLS proxy. Every failure folds into the
//! returned outcome; nothing escapes as a panic or unhandled error, and no
//! persistence happens here - that is the control loop's job.

use crate::config::TeslaConfig;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::token::TokenStore;
use crate::vehicle::{
    evaluate_vehicle_state, VehicleCommand, VehicleObservation, VehiclePrecondition,
};
use std::time::Duration;

const CLOUD_TIMEOUT: Duration = Duration::from_secs(30);

/// Synchronous result of one `execute` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// HTTP 200 from the command endpoint; payload returned verbatim.
    Success {
        data: serde_json::Value,
        /// Telemetry observed during the pre-check, when one ran.
        observed: Option<VehicleObservation>,
    },
    /// Anything else: missing token, rejected precondition, transport error,
    /// refresh exhaustion.
    Failed { message: String },
}

impl CommandOutcome {
    fn failed<S: Into<String>>(message: S) -> Self {
        CommandOutcome::Failed {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success { .. })
    }
}

/// Vehicle HTTP endpoints consumed by the executor.
#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// `GET .../vehicles/{vin}/vehicle_data`, returning `(status, body)`.
    async fn fetch_vehicle_data(&self, access_token: &str) -> Result<(u16, String)>;

    /// `POST .../vehicles/{vin}/command/{name}`, returning `(status, body)`.
    async fn post_command(
        &self,
        access_token: &str,
        command: VehicleCommand,
        payload: &serde_json::Value,
    ) -> Result<(u16, String)>;
}

/// Fleet API client: telemetry over the cloud endpoint, commands over the
/// local signing proxy with its own CA.
pub struct FleetApiClient {
    config: TeslaConfig,
    cloud: reqwest::Client,
    proxy: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl FleetApiClient {
    pub fn new(config: TeslaConfig) -> Result<Self> {
        let logger = get_logger("fleet_api");
        let cloud = reqwest::Client::builder().timeout(CLOUD_TIMEOUT).build()?;

        // The command proxy signs commands locally and presents a
        // self-managed certificate; trust exactly that CA.
        let ca_pem = std::fs::read(&config.proxy_ca_cert).map_err(|e| {
            HeliosError::config(format!(
                "Cannot read proxy CA cert {}: {}",
                config.proxy_ca_cert, e
            ))
        })?;
        let ca = reqwest::Certificate::from_pem(&ca_pem)
            .map_err(|e| HeliosError::config(format!("Invalid proxy CA cert: {}", e)))?;
        let proxy = reqwest::Client::builder()
            .timeout(CLOUD_TIMEOUT)
            .add_root_certificate(ca)
            .build()?;

        Ok(Self {
            config,
            cloud,
            proxy,
            logger,
        })
    }
}

#[async_trait::async_trait]
impl VehicleApi for FleetApiClient {
    async fn fetch_vehicle_data(&self, access_token: &str) -> Result<(u16, String)> {
        let url = format!(
            "{}/api/1/vehicles/{}/vehicle_data",
            self.config.api_base.trim_end_matches('/'),
            self.config.vin
        );
        let resp = self
            .cloud
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        self.logger
            .debug(&format!("vehicle_data fetch returned HTTP {}", status));
        Ok((status, body))
    }

    async fn post_command(
        &self,
        access_token: &str,
        command: VehicleCommand,
        payload: &serde_json::Value,
    ) -> Result<(u16, String)> {
        let url = format!(
            "{}/vehicles/{}/command/{}",
            self.config.proxy_base.trim_end_matches('/'),
            self.config.vin,
            command
        );
        self.logger
            .info(&format!("Sending '{}' to command proxy", command));
        let resp = self
            .proxy
            .post(&url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok((status, body))
    }
}

/// Orchestrates one logical command request with bounded retry policy.
pub struct CommandExecutor<T: TokenStore, A: VehicleApi> {
    tokens: T,
    api: A,
    logger: crate::logging::StructuredLogger,
}

impl<T: TokenStore, A: VehicleApi> CommandExecutor<T, A> {
    pub fn new(tokens: T, api: A) -> Self {
        let logger = get_logger("executor");
        Self {
            tokens,
            api,
            logger,
        }
    }

    /// Execute one logical command. At most one token refresh and one
    /// wake-up substitution happen per call; the explicit loop makes the
    /// bound visible (wake-up skips the pre-check, so it cannot trigger a
    /// second substitution).
    pub async fn execute(&self, command: VehicleCommand, amps: Option<u32>) -> CommandOutcome {
        let mut command = command;
        let mut refreshed = false;
        let mut observed: Option<VehicleObservation> = None;

        loop {
            let Some(access_token) = self.tokens.access_token().await else {
                return CommandOutcome::failed("Access token missing from token store");
            };

            if command != VehicleCommand::WakeUp {
                let (status, body) = match self.api.fetch_vehicle_data(&access_token).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        return CommandOutcome::failed(format!(
                            "vehicle_data fetch failed: {}",
                            e
                        ))
                    }
                };

                match evaluate_vehicle_state(status, &body, command) {
                    VehiclePrecondition::NeedsTokenRefresh => {
                        if !refreshed {
                            match self.tokens.refresh().await {
                                Ok(()) => {
                                    refreshed = true;
                                    self.logger.info("Token refreshed, retrying command");
                                    continue;
                                }
                                Err(e) => {
                                    return CommandOutcome::failed(format!(
                                        "Token refresh failed: {}",
                                        e
                                    ))
                                }
                            }
                        }
                        return CommandOutcome::failed("Token still invalid after refresh");
                    }
                    VehiclePrecondition::NeedsWakeUp => {
                        self.logger
                            .warn("Vehicle unavailable, substituting wake_up");
                        command = VehicleCommand::WakeUp;
                        continue;
                    }
                    VehiclePrecondition::Rejected(reason) => {
                        return CommandOutcome::failed(reason);
                    }
                    VehiclePrecondition::Ready {
                        command: normalized,
                        observed: obs,
                    } => {
                        if normalized != command {
                            self.logger.info(&format!(
                                "Command normalized: {} -> {}",
                                command, normalized
                            ));
                        }
                        command = normalized;
                        observed = Some(obs);
                    }
                }
            }

            let payload = match (command, amps) {
                (VehicleCommand::SetChargingAmps, Some(a)) => {
                    serde_json::json!({ "charging_amps": a })
                }
                (VehicleCommand::SetChargingAmps, None) => {
                    return CommandOutcome::failed("set_charging_amps requires an amperage");
                }
                _ => serde_json::json!({}),
            };

            return match self.api.post_command(&access_token, command, &payload).await {
                Ok((200, body)) => match serde_json::from_str::<serde_json::Value>(&body) {
                    Ok(data) => {
                        self.logger
                            .info(&format!("Command '{}' executed successfully", command));
                        CommandOutcome::Success { data, observed }
                    }
                    Err(_) => CommandOutcome::failed(format!("Unparseable response: {}", body)),
                },
                Ok((status, body)) => CommandOutcome::failed(format!(
                    "Command '{}' failed: {} - {}",
                    command, status, body
                )),
                Err(e) => CommandOutcome::failed(format!("Command '{}' failed: {}", command, e)),
            };
        }
    }
}
