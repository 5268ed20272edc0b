// Operational parameters - read by the report builder, changed at runtime by management clients

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use log::LevelFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("{key} expects {expected}, got {got}")]
    InvalidType {
        key: ParamKey,
        expected: &'static str,
        got: String,
    },
    #[error("parameters must be a JSON object")]
    NotAnObject,
    #[error("{name} expects a boolean, got {got}")]
    InvalidToggle { name: &'static str, got: String },
    #[error("unknown parameter {0}")]
    UnknownKey(String),
}

/// Settings with defaults. This is also the `parameters` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Parameters {
    /// Whatever name the group uses for the ADF hardware
    pub device_alias: String,
    pub observer: String,
    pub equipment: String,
    /// ADF, Manual RDF, Human Observer, ...
    pub report_type: String,
    pub modulation_type: String,
    /// MHz
    pub signal_frequency: Option<f64>,
    /// Degrees
    pub adf_direction_uncertainty: f64,
    pub observer_direction_uncertainty: f64,
    pub receiver_level: f64,
    /// Hand-entered position for the display page. Reports take their
    /// position from the GPS fix, never from this.
    pub observer_position: String,
    /// Seconds between status polls of the display page. Only the
    /// management client reads it.
    pub polling_interval: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            device_alias: "ADF Unit".into(),
            observer: String::new(),
            equipment: "Agrello ADF".into(),
            report_type: "ADF".into(),
            modulation_type: "FM".into(),
            signal_frequency: None,
            adf_direction_uncertainty: 20.0,
            observer_direction_uncertainty: 10.0,
            receiver_level: -1.0,
            observer_position: "unknown".into(),
            polling_interval: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    DeviceAlias,
    Observer,
    Equipment,
    ReportType,
    ModulationType,
    SignalFrequency,
    AdfDirectionUncertainty,
    ObserverDirectionUncertainty,
    ReceiverLevel,
    ObserverPosition,
    PollingInterval,
}

impl ParamKey {
    pub const ALL: [ParamKey; 11] = [
        ParamKey::DeviceAlias,
        ParamKey::Observer,
        ParamKey::Equipment,
        ParamKey::ReportType,
        ParamKey::ModulationType,
        ParamKey::SignalFrequency,
        ParamKey::AdfDirectionUncertainty,
        ParamKey::ObserverDirectionUncertainty,
        ParamKey::ReceiverLevel,
        ParamKey::ObserverPosition,
        ParamKey::PollingInterval,
    ];

    /// Name used on the wire and in the config file
    pub fn name(self) -> &'static str {
        match self {
            ParamKey::DeviceAlias => "deviceAlias",
            ParamKey::Observer => "observer",
            ParamKey::Equipment => "equipment",
            ParamKey::ReportType => "reportType",
            ParamKey::ModulationType => "modulationType",
            ParamKey::SignalFrequency => "signalFrequency",
            ParamKey::AdfDirectionUncertainty => "adfDirectionUncertainty",
            ParamKey::ObserverDirectionUncertainty => "observerDirectionUncertainty",
            ParamKey::ReceiverLevel => "receiverLevel",
            ParamKey::ObserverPosition => "observerPosition",
            ParamKey::PollingInterval => "pollingInterval",
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            ParamKey::DeviceAlias
            | ParamKey::Observer
            | ParamKey::Equipment
            | ParamKey::ReportType
            | ParamKey::ModulationType
            | ParamKey::ObserverPosition => ValueKind::Text,
            ParamKey::SignalFrequency => ValueKind::OptionalNumber,
            ParamKey::AdfDirectionUncertainty
            | ParamKey::ObserverDirectionUncertainty
            | ParamKey::ReceiverLevel => ValueKind::Number,
            ParamKey::PollingInterval => ValueKind::Seconds,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamKey {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| ParamError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Text,
    Number,
    OptionalNumber,
    Seconds,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            ValueKind::Text => "a string",
            ValueKind::Number => "a number",
            ValueKind::OptionalNumber => "a number or null",
            ValueKind::Seconds => "a non-negative integer",
        }
    }
}

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    OptionalNumber(Option<f64>),
    Seconds(u64),
}

impl ParamValue {
    /// Convert a JSON value into the type `key` holds
    pub fn from_json(key: ParamKey, value: &Value) -> Result<Self, ParamError> {
        let converted = match (key.kind(), value) {
            (ValueKind::Text, Value::String(s)) => Some(ParamValue::Text(s.clone())),
            (ValueKind::Number, Value::Number(n)) => n.as_f64().map(ParamValue::Number),
            (ValueKind::OptionalNumber, Value::Null) => Some(ParamValue::OptionalNumber(None)),
            (ValueKind::OptionalNumber, Value::Number(n)) => {
                n.as_f64().map(|v| ParamValue::OptionalNumber(Some(v)))
            }
            (ValueKind::Seconds, Value::Number(n)) => n.as_u64().map(ParamValue::Seconds),
            _ => None,
        };
        converted.ok_or_else(|| ParamError::InvalidType {
            key,
            expected: key.kind().describe(),
            got: value.to_string(),
        })
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Diagnostic toggle names accepted alongside the parameters
pub const TRACE_TOGGLE: &str = "trace";
pub const TRACE_ERROR_TOGGLE: &str = "traceerror";

/// Log level with both diagnostic toggles off
pub const BASE_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Parameter cells. Each field has its own lock so a management write
/// never blocks readers of the other fields.
#[derive(Debug)]
pub struct ParameterStore {
    device_alias: RwLock<String>,
    observer: RwLock<String>,
    equipment: RwLock<String>,
    report_type: RwLock<String>,
    modulation_type: RwLock<String>,
    signal_frequency: RwLock<Option<f64>>,
    adf_direction_uncertainty: RwLock<f64>,
    observer_direction_uncertainty: RwLock<f64>,
    receiver_level: RwLock<f64>,
    observer_position: RwLock<String>,
    polling_interval: RwLock<u64>,
    trace: AtomicBool,
    trace_error: AtomicBool,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::from_parameters(Parameters::default())
    }
}

// A poisoned cell still holds a whole value; writers replace it in one assignment
fn read<T: Clone>(cell: &RwLock<T>) -> T {
    cell.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write<T>(cell: &RwLock<T>, value: T) {
    *cell.write().unwrap_or_else(|e| e.into_inner()) = value;
}

impl ParameterStore {
    pub fn from_parameters(p: Parameters) -> Self {
        Self {
            device_alias: RwLock::new(p.device_alias),
            observer: RwLock::new(p.observer),
            equipment: RwLock::new(p.equipment),
            report_type: RwLock::new(p.report_type),
            modulation_type: RwLock::new(p.modulation_type),
            signal_frequency: RwLock::new(p.signal_frequency),
            adf_direction_uncertainty: RwLock::new(p.adf_direction_uncertainty),
            observer_direction_uncertainty: RwLock::new(p.observer_direction_uncertainty),
            receiver_level: RwLock::new(p.receiver_level),
            observer_position: RwLock::new(p.observer_position),
            polling_interval: RwLock::new(p.polling_interval),
            trace: AtomicBool::new(false),
            trace_error: AtomicBool::new(false),
        }
    }

    fn text_cell(&self, key: ParamKey) -> Option<&RwLock<String>> {
        match key {
            ParamKey::DeviceAlias => Some(&self.device_alias),
            ParamKey::Observer => Some(&self.observer),
            ParamKey::Equipment => Some(&self.equipment),
            ParamKey::ReportType => Some(&self.report_type),
            ParamKey::ModulationType => Some(&self.modulation_type),
            ParamKey::ObserverPosition => Some(&self.observer_position),
            _ => None,
        }
    }

    fn number_cell(&self, key: ParamKey) -> Option<&RwLock<f64>> {
        match key {
            ParamKey::AdfDirectionUncertainty => Some(&self.adf_direction_uncertainty),
            ParamKey::ObserverDirectionUncertainty => Some(&self.observer_direction_uncertainty),
            ParamKey::ReceiverLevel => Some(&self.receiver_level),
            _ => None,
        }
    }

    pub fn get(&self, key: ParamKey) -> ParamValue {
        if let Some(cell) = self.text_cell(key) {
            return ParamValue::Text(read(cell));
        }
        if let Some(cell) = self.number_cell(key) {
            return ParamValue::Number(read(cell));
        }
        match key {
            ParamKey::SignalFrequency => ParamValue::OptionalNumber(read(&self.signal_frequency)),
            _ => ParamValue::Seconds(read(&self.polling_interval)),
        }
    }

    /// Replace one field. Fails only when `value` is not the type `key` holds.
    pub fn set(&self, key: ParamKey, value: ParamValue) -> Result<(), ParamError> {
        let mismatch = |value: &ParamValue| ParamError::InvalidType {
            key,
            expected: key.kind().describe(),
            got: value.to_json().to_string(),
        };

        match (key.kind(), value) {
            (ValueKind::Text, ParamValue::Text(s)) => {
                if let Some(cell) = self.text_cell(key) {
                    write(cell, s);
                }
            }
            (ValueKind::Number, ParamValue::Number(n)) => {
                if let Some(cell) = self.number_cell(key) {
                    write(cell, n);
                }
            }
            (ValueKind::OptionalNumber, ParamValue::OptionalNumber(n)) => {
                write(&self.signal_frequency, n)
            }
            (ValueKind::OptionalNumber, ParamValue::Number(n)) => {
                write(&self.signal_frequency, Some(n))
            }
            (ValueKind::Seconds, ParamValue::Seconds(s)) => write(&self.polling_interval, s),
            (_, other) => return Err(mismatch(&other)),
        }
        Ok(())
    }

    /// Partial update from a management client.
    ///
    /// Unknown keys and null values are skipped. Every recognized value is
    /// type-checked before any field is written. The `trace` and `traceerror`
    /// toggles change the process log level instead of a field.
    pub fn apply(&self, update: &Value) -> Result<Vec<ParamKey>, ParamError> {
        let map = update.as_object().ok_or(ParamError::NotAnObject)?;

        let mut pending = Vec::new();
        let mut toggles = Vec::new();
        for (name, value) in map {
            if let Some(toggle) = self.toggle(name) {
                if !value.is_null() {
                    let on = value.as_bool().ok_or_else(|| ParamError::InvalidToggle {
                        name: toggle.0,
                        got: value.to_string(),
                    })?;
                    toggles.push((toggle.1, on));
                }
                continue;
            }
            let key = match name.parse::<ParamKey>() {
                Ok(key) => key,
                Err(_) => {
                    log::debug!("ignoring unknown parameter {}", name);
                    continue;
                }
            };
            if value.is_null() {
                continue;
            }
            pending.push((key, ParamValue::from_json(key, value)?));
        }

        let mut changed = Vec::with_capacity(pending.len());
        for (key, value) in pending {
            self.set(key, value)?;
            log::info!("parameter {} updated", key);
            changed.push(key);
        }

        if !toggles.is_empty() {
            for (flag, on) in toggles {
                flag.store(on, Ordering::SeqCst);
            }
            let level = self.log_level();
            log::set_max_level(level);
            log::info!("log level now {}", level);
        }
        Ok(changed)
    }

    fn toggle(&self, name: &str) -> Option<(&'static str, &AtomicBool)> {
        match name {
            TRACE_TOGGLE => Some((TRACE_TOGGLE, &self.trace)),
            TRACE_ERROR_TOGGLE => Some((TRACE_ERROR_TOGGLE, &self.trace_error)),
            _ => None,
        }
    }

    /// `trace` shows per-line decode detail, `traceerror` shows rejected lines
    pub fn log_level(&self) -> LevelFilter {
        if self.trace.load(Ordering::SeqCst) {
            LevelFilter::Trace
        } else if self.trace_error.load(Ordering::SeqCst) {
            LevelFilter::Debug
        } else {
            BASE_LOG_LEVEL
        }
    }

    /// Copy every field out, one lock at a time
    pub fn snapshot(&self) -> Parameters {
        Parameters {
            device_alias: read(&self.device_alias),
            observer: read(&self.observer),
            equipment: read(&self.equipment),
            report_type: read(&self.report_type),
            modulation_type: read(&self.modulation_type),
            signal_frequency: read(&self.signal_frequency),
            adf_direction_uncertainty: read(&self.adf_direction_uncertainty),
            observer_direction_uncertainty: read(&self.observer_direction_uncertainty),
            receiver_level: read(&self.receiver_level),
            observer_position: read(&self.observer_position),
            polling_interval: read(&self.polling_interval),
        }
    }

    pub fn replace(&self, p: Parameters) {
        write(&self.device_alias, p.device_alias);
        write(&self.observer, p.observer);
        write(&self.equipment, p.equipment);
        write(&self.report_type, p.report_type);
        write(&self.modulation_type, p.modulation_type);
        write(&self.signal_frequency, p.signal_frequency);
        write(&self.adf_direction_uncertainty, p.adf_direction_uncertainty);
        write(&self.observer_direction_uncertainty, p.observer_direction_uncertainty);
        write(&self.receiver_level, p.receiver_level);
        write(&self.observer_position, p.observer_position);
        write(&self.polling_interval, p.polling_interval);
    }

    pub fn reset(&self) {
        self.replace(Parameters::default());
    }
}
