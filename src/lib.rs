//! # Helios - Solar Surplus EV Charging Controller
//!
//! A closed-loop controller that throttles a Tesla's charging current to
//! match available solar surplus. A Shelly 3EM meter reports production and
//! grid exchange, a current clamp measures the vehicle feed, and charge
//! commands go through the Tesla Fleet API (telemetry via cloud, commands
//! via a local signing proxy).
//!
//! ## Architecture
//!
//! One direction of data flow per tick: meters -> snapshot -> decision ->
//! (optional) command -> persisted status.
//!
//! - `config`: YAML process configuration and validation
//! - `logging`: structured logging and tracing
//! - `metering`: metering snapshot plus meter/clamp HTTP clients
//! - `decision`: pure surplus-to-amperage decision engine
//! - `vehicle`: typed vehicle telemetry and the precondition evaluator
//! - `token`: OAuth token store with one-shot refresh
//! - `command`: command executor and Fleet API client
//! - `discovery`: identity probe and rate-limited subnet sweep
//! - `store`: SQLite telemetry store and runtime configuration row
//! - `controller`: the periodic control loop
//! - `web`: HTTP control surface

pub mod command;
pub mod config;
pub mod controller;
pub mod decision;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metering;
pub mod store;
pub mod token;
pub mod vehicle;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use controller::ChargeController;
pub use error::{HeliosError, Result};
