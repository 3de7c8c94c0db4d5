//! Shared test doubles and fixtures for the executor and control-loop
//! suites.
//!
//! The doubles count every call so the bounded retry policy is observable:
//! at most one token refresh, at most one wake-up substitution, no network
//! traffic without a stored token.

#![allow(dead_code)]

use async_trait::async_trait;
use helios::command::VehicleApi;
use helios::error::{HeliosError, Result};
use helios::token::TokenStore;
use helios::vehicle::VehicleCommand;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct ScriptedTokens {
    token: Arc<Mutex<Option<String>>>,
    refreshed_to: Option<String>,
    refreshes: Arc<AtomicUsize>,
}

impl ScriptedTokens {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token.to_string()))),
            refreshed_to: None,
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self {
            token: Arc::new(Mutex::new(None)),
            refreshed_to: None,
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn refreshing_to(mut self, token: &str) -> Self {
        self.refreshed_to = Some(token.to_string());
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for ScriptedTokens {
    async fn access_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn refresh(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        match &self.refreshed_to {
            Some(next) => {
                *self.token.lock().unwrap() = Some(next.clone());
                Ok(())
            }
            None => Err(HeliosError::auth("refresh grant rejected")),
        }
    }
}

#[derive(Clone)]
pub struct ScriptedApi {
    fetches: Arc<Mutex<VecDeque<(u16, String)>>>,
    fetch_calls: Arc<AtomicUsize>,
    posts: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    post_response: (u16, String),
}

impl ScriptedApi {
    pub fn new(fetches: Vec<(u16, &str)>, post_response: (u16, &str)) -> Self {
        Self {
            fetches: Arc::new(Mutex::new(
                fetches
                    .into_iter()
                    .map(|(s, b)| (s, b.to_string()))
                    .collect(),
            )),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            posts: Arc::new(Mutex::new(Vec::new())),
            post_response: (post_response.0, post_response.1.to_string()),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<(String, serde_json::Value)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VehicleApi for ScriptedApi {
    async fn fetch_vehicle_data(&self, _access_token: &str) -> Result<(u16, String)> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, "{}".to_string())))
    }

    async fn post_command(
        &self,
        _access_token: &str,
        command: VehicleCommand,
        payload: &serde_json::Value,
    ) -> Result<(u16, String)> {
        self.posts
            .lock()
            .unwrap()
            .push((command.as_str().to_string(), payload.clone()));
        Ok(self.post_response.clone())
    }
}

pub const CHARGING_BODY: &str = r#"{
    "response": {
        "charge_state": {
            "charging_state": "Charging",
            "charge_port_latch": "Engaged",
            "charge_port_door_open": true,
            "charger_actual_current": 10,
            "battery_level": 58
        },
        "drive_state": {"latitude": 52.09, "longitude": 5.12}
    }
}"#;

pub const STOPPED_BODY: &str = r#"{
    "response": {
        "charge_state": {
            "charging_state": "Stopped",
            "charge_port_latch": "Engaged",
            "charge_port_door_open": true,
            "battery_level": 58
        }
    }
}"#;

pub const DISCONNECTED_BODY: &str = r#"{
    "response": {
        "charge_state": {
            "charging_state": "Disconnected",
            "charge_port_latch": "Disengaged",
            "charge_port_door_open": false
        }
    }
}"#;

pub const EXPIRED_BODY: &str = r#"{"error": "token expired"}"#;
pub const ASLEEP_BODY: &str = r#"{"error": "vehicle unavailable: offline or asleep"}"#;
pub const OK_BODY: &str = r#"{"response": {"result": true, "reason": ""}}"#;
