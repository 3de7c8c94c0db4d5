//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The values here are the static process
//! configuration; the two operator-mutable values (`enabled` and the grid
//! draw ceiling) live in the store as a single row and are managed through
//! [`crate::store::RuntimeConfigHandle`].

use crate::error::{HeliosError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tesla Fleet API and command proxy configuration
    pub tesla: TeslaConfig,

    /// Three-phase energy meter configuration
    pub meter: MeterConfig,

    /// Charging current clamp configuration
    pub sensor: SensorConfig,

    /// Device discovery configuration
    pub discovery: DiscoveryConfig,

    /// Control loop configuration
    pub control: ControlConfig,

    /// Telemetry/config store configuration
    pub database: DatabaseConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Timezone for quarter-hour cycle alignment
    pub timezone: String,
}

/// Tesla Fleet API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeslaConfig {
    /// Vehicle identification number addressed by all commands
    pub vin: String,

    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// OAuth token endpoint
    pub token_url: String,

    /// Token audience claim
    pub audience: String,

    /// Requested OAuth scopes
    pub scope: String,

    /// Directory holding `tesla_token_latest.json` and rotated copies
    pub token_dir: String,

    /// Fleet API base for telemetry reads
    pub api_base: String,

    /// Local TLS command proxy base
    pub proxy_base: String,

    /// CA certificate (PEM) for the command proxy
    pub proxy_ca_cert: String,
}

/// Shelly 3EM meter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Device name used in logs and discovery
    pub name: String,

    /// Last known IP address
    pub ip: String,

    /// Expected MAC address for the identity probe (optional)
    #[serde(default)]
    pub mac: Option<String>,

    /// Index of the solar production phase in the emeters array
    pub solar_phase: usize,

    /// Index of the grid phase in the emeters array
    pub grid_phase: usize,
}

/// Current clamp parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Device name used in logs and discovery
    pub name: String,

    /// Last known IP address
    pub ip: String,

    /// Expected MAC address for the identity probe (optional)
    #[serde(default)]
    pub mac: Option<String>,
}

/// Device discovery parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Subnet prefix scanned when a probe fails (e.g. "192.168.11")
    pub subnet_prefix: String,

    /// Per-host probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Minimum seconds between two subnet sweeps
    pub scan_cooldown_secs: u64,
}

/// Control loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Tick interval in seconds
    pub tick_interval_secs: u64,

    /// When true, command decisions only run on quarter-hour minutes;
    /// other ticks log the energy balance and stop
    #[serde(default)]
    pub quarter_hour_alignment: bool,

    /// Seed for the grid draw ceiling when the config row does not exist yet
    pub default_max_grid_draw_watts: f64,

    /// Seed for the enabled flag when the config row does not exist yet
    #[serde(default = "default_true")]
    pub default_enabled: bool,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Bearer token required for configuration updates
    pub api_token: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to the log file (rotated daily)
    pub file: String,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for TeslaConfig {
    fn default() -> Self {
        Self {
            vin: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            token_url: "https://fleet-auth.prd.vn.cloud.tesla.com/oauth2/v3/token".to_string(),
            audience: "https://fleet-api.prd.eu.vn.cloud.tesla.com".to_string(),
            scope: "openid vehicle_device_data vehicle_cmds vehicle_charging_cmds offline_access"
                .to_string(),
            token_dir: "/data/helios/tokens".to_string(),
            api_base: "https://fleet-api.prd.eu.vn.cloud.tesla.com".to_string(),
            proxy_base: "https://localhost:4443/api/1".to_string(),
            proxy_ca_cert: "/data/helios/proxy-ca.pem".to_string(),
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            name: "shelly-3em".to_string(),
            ip: "192.168.1.208".to_string(),
            mac: None,
            solar_phase: 0,
            grid_phase: 1,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: "ev-clamp".to_string(),
            ip: "192.168.1.209".to_string(),
            mac: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subnet_prefix: "192.168.1".to_string(),
            probe_timeout_ms: 500,
            scan_cooldown_secs: 600,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            quarter_hour_alignment: false,
            default_max_grid_draw_watts: 0.0,
            default_enabled: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///data/helios/helios.db".to_string(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            api_token: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/helios/helios.log".to_string(),
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tesla: TeslaConfig::default(),
            meter: MeterConfig::default(),
            sensor: SensorConfig::default(),
            discovery: DiscoveryConfig::default(),
            control: ControlConfig::default(),
            database: DatabaseConfig::default(),
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
            timezone: "Europe/Rome".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "helios_config.yaml",
            "/data/helios_config.yaml",
            "/etc/helios/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tesla.vin.is_empty() {
            return Err(HeliosError::validation("tesla.vin", "VIN cannot be empty"));
        }

        if self.meter.ip.is_empty() {
            return Err(HeliosError::validation(
                "meter.ip",
                "IP address cannot be empty",
            ));
        }

        if self.meter.solar_phase == self.meter.grid_phase {
            return Err(HeliosError::validation(
                "meter.grid_phase",
                "Solar and grid phases must differ",
            ));
        }

        if self.control.tick_interval_secs == 0 {
            return Err(HeliosError::validation(
                "control.tick_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.web.port == 0 {
            return Err(HeliosError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}
