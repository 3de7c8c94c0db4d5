//! Telemetry and runtime-configuration store
//!
//! SQLite-backed persistence with three tables: an append-only
//! `charge_status` log (the control loop is the sole writer; readers take
//! the latest row), a rolling `energy_balance` log, and the single-row
//! `controller_config`. The config row is only ever read-then-written under
//! [`RuntimeConfigHandle`]'s write lock so the web surface and the control
//! loop never observe a half-written value.

use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One persisted charge status row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChargeStatusRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub charging_amps: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<i64>,
}

/// Fields for a new charge status row; the timestamp is assigned on insert.
#[derive(Debug, Clone, Default)]
pub struct NewChargeStatus {
    pub charging_amps: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<i64>,
}

/// The two operator-mutable values of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub enabled: bool,
    pub max_grid_draw_watts: f64,
}

/// Store over a SQLite pool.
#[derive(Clone)]
pub struct TelemetryStore {
    pool: SqlitePool,
    logger: crate::logging::StructuredLogger,
}

impl TelemetryStore {
    /// Open (creating if missing) the database and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| HeliosError::persistence(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);
        // One connection: writers are few and this keeps `sqlite::memory:`
        // databases coherent under test
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            logger: get_logger("store"),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Close the pool; queries issued afterwards fail with a pool error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS charge_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                charging_amps INTEGER NOT NULL,
                latitude REAL,
                longitude REAL,
                battery_level INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS energy_balance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                solar_w REAL NOT NULL,
                grid_w REAL NOT NULL,
                surplus_w REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS controller_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                enabled INTEGER NOT NULL,
                max_grid_draw_watts REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a charge status row. Rows are never updated in place.
    pub async fn append_charge_status(&self, status: &NewChargeStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO charge_status (timestamp, charging_amps, latitude, longitude, battery_level)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now())
        .bind(i64::from(status.charging_amps))
        .bind(status.latitude)
        .bind(status.longitude)
        .bind(status.battery_level)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest persisted charge status, if any.
    pub async fn latest_charge_status(&self) -> Result<Option<ChargeStatusRow>> {
        let row = sqlx::query_as::<_, ChargeStatusRow>(
            r#"
            SELECT id, timestamp, charging_amps, latitude, longitude, battery_level
            FROM charge_status
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Last known charging current, 0 when nothing has been persisted yet.
    pub async fn latest_charging_amps(&self) -> Result<u32> {
        let latest = self.latest_charge_status().await?;
        Ok(latest
            .map(|row| u32::try_from(row.charging_amps).unwrap_or(0))
            .unwrap_or(0))
    }

    /// Append one energy balance observation.
    pub async fn append_energy_balance(
        &self,
        solar_w: f64,
        grid_w: f64,
        surplus_w: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO energy_balance (timestamp, solar_w, grid_w, surplus_w)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now())
        .bind(solar_w)
        .bind(grid_w)
        .bind(surplus_w)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Average surplus over the trailing window, `None` with no samples.
    pub async fn average_surplus(&self, window_minutes: i64) -> Result<Option<f64>> {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(surplus_w) FROM energy_balance WHERE timestamp >= ?",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(avg)
    }

    /// Read the single config row if it exists.
    pub async fn load_runtime_config(&self) -> Result<Option<RuntimeConfig>> {
        let row: Option<(i64, f64)> = sqlx::query_as(
            "SELECT enabled, max_grid_draw_watts FROM controller_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(enabled, max_grid_draw_watts)| RuntimeConfig {
            enabled: enabled != 0,
            max_grid_draw_watts,
        }))
    }

    /// Write the single config row, all-or-nothing.
    pub async fn save_runtime_config(&self, config: &RuntimeConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO controller_config (id, enabled, max_grid_draw_watts)
            VALUES (1, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                enabled = excluded.enabled,
                max_grid_draw_watts = excluded.max_grid_draw_watts
            "#,
        )
        .bind(i64::from(config.enabled))
        .bind(config.max_grid_draw_watts)
        .execute(&self.pool)
        .await?;
        self.logger.debug(&format!(
            "Runtime config saved: enabled={} ceiling={:.0}W",
            config.enabled, config.max_grid_draw_watts
        ));
        Ok(())
    }
}

/// Shared handle over the runtime config row.
///
/// All mutation happens while holding the write lock, covering both the
/// in-memory copy and the row write, so concurrent readers (control loop,
/// web surface) see either the fully-old or fully-new value.
#[derive(Clone)]
pub struct RuntimeConfigHandle {
    store: TelemetryStore,
    inner: Arc<RwLock<RuntimeConfig>>,
    logger: crate::logging::StructuredLogger,
}

impl RuntimeConfigHandle {
    /// Load the config row, seeding it from the static config on first boot.
    pub async fn load_or_seed(store: TelemetryStore, seed: RuntimeConfig) -> Result<Self> {
        let config = match store.load_runtime_config().await? {
            Some(existing) => existing,
            None => {
                store.save_runtime_config(&seed).await?;
                seed
            }
        };
        Ok(Self {
            store,
            inner: Arc::new(RwLock::new(config)),
            logger: get_logger("runtime_config"),
        })
    }

    /// Current value under the read lock.
    pub async fn get(&self) -> RuntimeConfig {
        *self.inner.read().await
    }

    /// Flip the enabled flag and persist; used by the safety trip. The row
    /// write happens first so a persistence failure leaves the in-memory
    /// value untouched.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = self.inner.write().await;
        let mut updated = *guard;
        updated.enabled = enabled;
        self.store.save_runtime_config(&updated).await?;
        *guard = updated;
        self.logger
            .info(&format!("Controller enabled flag set to {}", enabled));
        Ok(())
    }

    /// Apply an operator update to a single key. `enabled` accepts ON/OFF
    /// (case-insensitive); the grid draw ceiling must parse as a float.
    pub async fn update(&self, key: &str, value: &str) -> Result<RuntimeConfig> {
        let mut guard = self.inner.write().await;
        let mut updated = *guard;

        match key {
            "enabled" => match value.to_uppercase().as_str() {
                "ON" => updated.enabled = true,
                "OFF" => updated.enabled = false,
                other => {
                    return Err(HeliosError::validation(
                        "enabled",
                        format!("Expected ON or OFF, got '{}'", other),
                    ))
                }
            },
            "max_grid_draw_watts" => {
                let parsed: f64 = value.trim().parse().map_err(|_| {
                    HeliosError::validation(
                        "max_grid_draw_watts",
                        format!("Not a number: '{}'", value),
                    )
                })?;
                if !parsed.is_finite() {
                    return Err(HeliosError::validation(
                        "max_grid_draw_watts",
                        "Must be finite",
                    ));
                }
                updated.max_grid_draw_watts = parsed;
            }
            other => {
                return Err(HeliosError::validation(
                    "key",
                    format!("Unknown configuration key '{}'", other),
                ))
            }
        }

        self.store.save_runtime_config(&updated).await?;
        *guard = updated;
        Ok(updated)
    }

    /// Key/value view for the configuration endpoint.
    pub async fn entries(&self) -> Vec<(String, String)> {
        let config = self.get().await;
        vec![
            (
                "enabled".to_string(),
                if config.enabled { "ON" } else { "OFF" }.to_string(),
            ),
            (
                "max_grid_draw_watts".to_string(),
                format!("{}", config.max_grid_draw_watts),
            ),
        ]
    }
}
