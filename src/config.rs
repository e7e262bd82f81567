use std::{path::Path, str::FromStr};

use anyhow::{Context, Result};
use derive_getters::Getters;
use serde_json::Value;
use tracing::Level;

use crate::error::ControlError;

pub const DEFAULT_LOW_THRESHOLD: f64 = 55.0;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 65.0;
pub const DEFAULT_GATE_EPSILON: f64 = 0.5;
pub const DEFAULT_BOOST_ON_DELTA: f64 = 2.0;
pub const DEFAULT_BOOST_OFF_DELTA: f64 = 1.0;
pub const DEFAULT_OUTDOOR_OFFSET: f64 = 5.0;
pub const DEFAULT_TIMER_MINUTES: i64 = 30;
pub const DEFAULT_CYCLE_SECONDS: u64 = 20;
pub const DEFAULT_READING_MAX_AGE_SECONDS: u64 = 900;

/// Connection and topic layout of the MQTT broker.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct MqttSettings {
    host: String,
    port: u16,
    client_id: String,
    /// Sensors publish on `{sensor_prefix}/{id}`.
    sensor_prefix: String,
    /// The relay reports on this topic and listens on `{relay_topic}/set`.
    relay_topic: String,
    /// Prefix for the hub's own status and mode topics.
    hub_prefix: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "humidity-boost-hub".to_string(),
            sensor_prefix: "zigbee2mqtt".to_string(),
            relay_topic: "zigbee2mqtt/boost_relay".to_string(),
            hub_prefix: "boost-hub".to_string(),
        }
    }
}

/// Settings of the hub, loaded once at start-up and never changed after.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Config {
    low_threshold: f64,
    high_threshold: f64,
    gate_epsilon: f64,
    boost_on_delta: f64,
    boost_off_delta: f64,
    outdoor_offset: f64,
    timer_minutes: i64,
    cycle_seconds: u64,
    reading_max_age_seconds: u64,
    outdoor_sensors: Vec<String>,
    normal_sensors: Vec<String>,
    wet_sensors: Vec<String>,
    /// One offset per wet sensor, same order.
    wet_offsets: Vec<f64>,
    /// Accepted for compatibility, not used by the control logic.
    presence_sensors: Vec<String>,
    log_level: Level,
    mqtt: MqttSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            gate_epsilon: DEFAULT_GATE_EPSILON,
            boost_on_delta: DEFAULT_BOOST_ON_DELTA,
            boost_off_delta: DEFAULT_BOOST_OFF_DELTA,
            outdoor_offset: DEFAULT_OUTDOOR_OFFSET,
            timer_minutes: DEFAULT_TIMER_MINUTES,
            cycle_seconds: DEFAULT_CYCLE_SECONDS,
            reading_max_age_seconds: DEFAULT_READING_MAX_AGE_SECONDS,
            outdoor_sensors: Vec::new(),
            normal_sensors: Vec::new(),
            wet_sensors: Vec::new(),
            wet_offsets: Vec::new(),
            presence_sensors: Vec::new(),
            log_level: Level::DEBUG,
            mqtt: MqttSettings::default(),
        }
    }
}

impl Config {
    /// Read the configuration file at `path`.
    ///
    /// Only an unreadable file or invalid JSON is an error. Bad individual
    /// values are replaced by their defaults and returned as issues.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ControlError>)> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_value(&value))
    }

    /// Extract the configuration from an already parsed JSON document.
    pub fn from_value(value: &Value) -> (Self, Vec<ControlError>) {
        let mut fields = Fields::new(value);
        let defaults = Self::default();

        let mut low_threshold = fields.number("low_threshold", defaults.low_threshold);
        let mut high_threshold = fields.number("high_threshold", defaults.high_threshold);
        if low_threshold > high_threshold {
            fields.issues.push(ControlError::InvertedThresholds {
                low: low_threshold,
                high: high_threshold,
            });
            std::mem::swap(&mut low_threshold, &mut high_threshold);
        }

        let wet_sensors = fields.id_list("wet_sensors");
        let wet_offsets = fields.offsets("wet_offsets", wet_sensors.len());

        let config = Self {
            low_threshold,
            high_threshold,
            gate_epsilon: fields.number("gate_epsilon", defaults.gate_epsilon),
            boost_on_delta: fields.number("boost_on_delta", defaults.boost_on_delta),
            boost_off_delta: fields.number("boost_off_delta", defaults.boost_off_delta),
            outdoor_offset: fields.number("outdoor_offset", defaults.outdoor_offset),
            timer_minutes: fields.positive("timer_minutes", DEFAULT_TIMER_MINUTES as u64) as i64,
            cycle_seconds: fields.positive("cycle_seconds", defaults.cycle_seconds),
            reading_max_age_seconds: fields
                .positive("reading_max_age_seconds", defaults.reading_max_age_seconds),
            outdoor_sensors: fields.id_list("outdoor_sensors"),
            normal_sensors: fields.id_list("normal_sensors"),
            wet_sensors,
            wet_offsets,
            presence_sensors: fields.id_list("presence_sensors"),
            log_level: fields.log_level("log_level", defaults.log_level),
            mqtt: fields.mqtt(defaults.mqtt),
        };

        (config, fields.issues)
    }
}

/// Field-by-field extraction that records a [`ControlError`] for every value
/// it has to replace.
struct Fields<'a> {
    root: &'a Value,
    issues: Vec<ControlError>,
}

impl<'a> Fields<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            issues: Vec::new(),
        }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.root.get(field).filter(|v| !v.is_null())
    }

    fn reject(&mut self, field: &'static str, value: &Value, fallback: impl ToString) {
        self.issues.push(ControlError::Configuration {
            field,
            value: value.to_string(),
            fallback: fallback.to_string(),
        });
    }

    fn number(&mut self, field: &'static str, default: f64) -> f64 {
        let Some(value) = self.get(field) else {
            return default;
        };
        match parse_number(value) {
            Some(number) => number,
            None => {
                self.reject(field, value, default);
                default
            }
        }
    }

    fn positive(&mut self, field: &'static str, default: u64) -> u64 {
        let Some(value) = self.get(field) else {
            return default;
        };
        match parse_number(value) {
            Some(number) if number >= 1.0 && number <= u32::MAX as f64 => number.round() as u64,
            _ => {
                self.reject(field, value, default);
                default
            }
        }
    }

    fn text(&mut self, section: &'a Value, field: &'static str, default: String) -> String {
        match section.get(field).filter(|v| !v.is_null()) {
            None => default,
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(other) => {
                self.reject(field, other, &default);
                default
            }
        }
    }

    fn id_list(&mut self, field: &'static str) -> Vec<String> {
        let Some(value) = self.get(field) else {
            return Vec::new();
        };

        let entries: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            Value::String(csv) => csv
                .split(',')
                .map(|s| Value::String(s.to_string()))
                .collect(),
            other => {
                self.reject(field, other, "[]");
                return Vec::new();
            }
        };

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            match &entry {
                Value::String(s) if s.trim().is_empty() => {}
                Value::String(s) => ids.push(s.trim().to_string()),
                Value::Number(n) => ids.push(n.to_string()),
                other => self.reject(field, other, "skipped"),
            }
        }
        ids
    }

    /// Offsets stay index-aligned with the wet sensors: unparsable entries
    /// become zero, the list is padded or truncated to `len`.
    fn offsets(&mut self, field: &'static str, len: usize) -> Vec<f64> {
        let entries: Vec<Value> = match self.get(field) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(csv)) if csv.trim().is_empty() => Vec::new(),
            Some(Value::String(csv)) => csv
                .split(',')
                .map(|s| Value::String(s.to_string()))
                .collect(),
            Some(other) => {
                self.reject(field, other, "0");
                Vec::new()
            }
        };

        let mut offsets: Vec<f64> = entries
            .iter()
            .map(|entry| {
                parse_number(entry).unwrap_or_else(|| {
                    self.reject(field, entry, 0.0);
                    0.0
                })
            })
            .collect();

        if !offsets.is_empty() && offsets.len() != len {
            self.issues.push(ControlError::Configuration {
                field,
                value: format!("{} entries", offsets.len()),
                fallback: format!("{len} entries"),
            });
        }
        offsets.resize(len, 0.0);
        offsets
    }

    fn log_level(&mut self, field: &'static str, default: Level) -> Level {
        match self.get(field) {
            None => default,
            Some(Value::String(s)) => Level::from_str(s.trim()).unwrap_or_else(|_| {
                self.reject(field, &Value::String(s.clone()), default);
                default
            }),
            Some(other) => {
                self.reject(field, other, default);
                default
            }
        }
    }

    fn mqtt(&mut self, defaults: MqttSettings) -> MqttSettings {
        let Some(section) = self.get("mqtt") else {
            return defaults;
        };

        let port = match section.get("port").filter(|v| !v.is_null()) {
            None => defaults.port,
            Some(value) => match value.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) if port > 0 => port,
                _ => {
                    self.reject("mqtt.port", value, defaults.port);
                    defaults.port
                }
            },
        };

        MqttSettings {
            host: self.text(section, "host", defaults.host),
            port,
            client_id: self.text(section, "client_id", defaults.client_id),
            sensor_prefix: self.text(section, "sensor_prefix", defaults.sensor_prefix),
            relay_topic: self.text(section, "relay_topic", defaults.relay_topic),
            hub_prefix: self.text(section, "hub_prefix", defaults.hub_prefix),
        }
    }
}

/// Accepts JSON numbers and numeric strings, optionally `%`-suffixed.
fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
