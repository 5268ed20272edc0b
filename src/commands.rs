// Management command handlers - what a REST front end or display page calls into

use crate::config::AppConfig;
use crate::params::Parameters;
use crate::relay::Relay;
use crate::report::FusedReport;
use crate::serial::{self, DetectedPort, DeviceStatus, LineReader};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Standard command response wrapper
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

impl<T: Serialize, E: std::fmt::Display> From<Result<T, E>> for CommandResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => CommandResult::ok(data),
            Err(e) => CommandResult::err(e.to_string()),
        }
    }
}

/// Application state
pub struct AppState {
    pub config: AppConfig,
    pub reader: LineReader,
}

impl AppState {
    pub fn new(config: AppConfig, relay: Arc<Relay>) -> Self {
        Self {
            config,
            reader: LineReader::new(relay),
        }
    }

    pub fn relay(&self) -> &Relay {
        self.reader.relay()
    }
}

// ============ Readings Commands ============

/// Latest fused report; `"no report"` before anything has been decoded
pub fn get_readings(state: &AppState) -> CommandResult<FusedReport> {
    state.relay().get_readings().into()
}

pub fn get_last_sent_report(state: &AppState) -> CommandResult<FusedReport> {
    match state.relay().last_sent_report() {
        Some(report) => CommandResult::ok(report),
        None => CommandResult::err("no report sent"),
    }
}

// ============ Parameter Commands ============

pub fn get_parameters(state: &AppState) -> CommandResult<Parameters> {
    CommandResult::ok(state.relay().parameters())
}

/// Partial update. Accepts either the settings object itself or `{ "settings": {...} }`.
pub fn set_parameters(state: &AppState, body: &Value) -> CommandResult<bool> {
    let settings = match body.get("settings") {
        Some(Value::Null) => return CommandResult::err("no settings specified"),
        Some(settings) => settings,
        None => body,
    };

    match state.relay().set_parameters(settings) {
        Ok(_) => CommandResult::ok(true),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

pub fn reset_parameters(state: &AppState) -> CommandResult<Parameters> {
    CommandResult::ok(state.relay().reset_parameters())
}

// ============ Device Commands ============

pub fn list_serial_ports() -> CommandResult<Vec<DetectedPort>> {
    serial::list_ports().into()
}

pub fn connect_device(state: &AppState, port_name: &str, baud_rate: u32) -> CommandResult<bool> {
    state.reader.connect(port_name, baud_rate).map(|_| true).into()
}

pub fn disconnect_device(state: &AppState) -> CommandResult<bool> {
    state.reader.disconnect();
    CommandResult::ok(true)
}

pub fn get_status(state: &AppState) -> CommandResult<DeviceStatus> {
    CommandResult::ok(state.reader.status())
}

pub fn get_line_buffer(state: &AppState) -> CommandResult<Vec<String>> {
    CommandResult::ok(state.relay().line_buffer())
}

pub fn clear_line_buffer(state: &AppState) -> CommandResult<bool> {
    state.relay().clear_line_buffer();
    CommandResult::ok(true)
}
