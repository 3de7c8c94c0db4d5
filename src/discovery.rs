//! Device endpoint discovery
//!
//! Shelly devices on DHCP drift between addresses. Each tick the control
//! loop asks for the device's current IP: the cached (or configured)
//! address is identity-probed first, and only on failure does a linear
//! subnet sweep run - rate-limited by a cooldown so a dead device cannot
//! turn every tick into 254 HTTP requests.

use crate::config::DiscoveryConfig;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimal identity payload shared by the Shelly `/status` endpoints.
#[derive(Debug, Deserialize)]
struct DeviceIdentity {
    #[serde(default)]
    mac: Option<String>,
}

/// A device the discovery layer tracks.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Name used in logs and the cache key
    pub name: String,
    /// Configured/last known address
    pub ip: String,
    /// Expected MAC; when set, a probe only passes if the MAC matches
    pub mac: Option<String>,
}

pub struct DeviceDiscovery {
    config: DiscoveryConfig,
    client: reqwest::Client,
    cache: HashMap<String, String>,
    last_scan: Option<Instant>,
    logger: crate::logging::StructuredLogger,
}

impl DeviceDiscovery {
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let logger = get_logger("discovery");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.probe_timeout_ms))
            .build()?;
        Ok(Self {
            config,
            client,
            cache: HashMap::new(),
            last_scan: None,
            logger,
        })
    }

    /// Current address for the device: cached address if it still answers
    /// the identity probe, otherwise the result of a (cooldown-limited)
    /// subnet sweep.
    pub async fn ensure_endpoint(&mut self, device: &DeviceSpec) -> Result<String> {
        let candidate = self
            .cache
            .get(&device.name)
            .cloned()
            .unwrap_or_else(|| device.ip.clone());

        if self.probe(&candidate, device.mac.as_deref()).await {
            self.cache.insert(device.name.clone(), candidate.clone());
            return Ok(candidate);
        }

        self.logger.warn(&format!(
            "Device {} not responding at {}, starting subnet sweep",
            device.name, candidate
        ));
        self.rescan(device).await
    }

    /// Probe a single address; true when it answers and (if configured) the
    /// MAC matches.
    async fn probe(&self, ip: &str, expected_mac: Option<&str>) -> bool {
        let url = format!("http://{}/status", ip);
        let resp = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            _ => return false,
        };
        let identity: DeviceIdentity = match resp.json().await {
            Ok(i) => i,
            Err(_) => return false,
        };
        match (expected_mac, identity.mac) {
            (Some(expected), Some(found)) => expected.eq_ignore_ascii_case(&found),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// Linear sweep over the configured subnet. At most one sweep per
    /// cooldown window, regardless of how many devices are missing.
    async fn rescan(&mut self, device: &DeviceSpec) -> Result<String> {
        if let Some(last) = self.last_scan {
            let cooldown = Duration::from_secs(self.config.scan_cooldown_secs);
            if last.elapsed() < cooldown {
                return Err(HeliosError::network(format!(
                    "Device {} unreachable; next sweep in {}s",
                    device.name,
                    (cooldown - last.elapsed()).as_secs()
                )));
            }
        }
        self.last_scan = Some(Instant::now());

        for host in 1..=254u8 {
            let ip = format!("{}.{}", self.config.subnet_prefix, host);
            if self.probe(&ip, device.mac.as_deref()).await {
                self.logger
                    .info(&format!("Device {} found at {}", device.name, ip));
                self.cache.insert(device.name.clone(), ip.clone());
                return Ok(ip);
            }
        }

        Err(HeliosError::network(format!(
            "Device {} not found on subnet {}.0/24",
            device.name, self.config.subnet_prefix
        )))
    }
}
