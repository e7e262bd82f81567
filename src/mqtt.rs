//! MQTT side of the hub: caches sensor and relay reports, forwards mode
//! commands and publishes commands and status.

use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rumqttc::v5::{
    mqttbytes::{
        v5::{Packet, Publish},
        QoS::AtLeastOnce,
    },
    AsyncClient,
    Event::{Incoming, Outgoing},
    EventLoop, MqttOptions,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};

use crate::{
    config::{Config, MqttSettings},
    error::ControlError,
    models::{BoostState, Mode, Reading},
    ports::{ActuatorPort, SensorPort, StatusSink},
    status::StatusReport,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

lazy_static! {
    /// A bare measurement such as `53 %`, `21,5 °C` or `-3.2`.
    static ref MEASUREMENT: Regex =
        Regex::new(r"^\s*(-?\d+(?:[.,]\d+)?)\s*(?:%|°C|C)?\s*$").expect("valid measurement regex");
}

/// A value together with the time it was received.
#[derive(Debug, Clone)]
struct Received<T> {
    value: T,
    at: DateTime<Utc>,
}

impl<T: Clone> Received<T> {
    fn fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Option<T> {
        (now - self.at <= max_age).then(|| self.value.clone())
    }
}

#[derive(Debug, Default)]
struct Cache {
    readings: HashMap<String, Received<Reading>>,
    relay: Option<Received<bool>>,
    /// Set on ConnAck, cleared on any connection error.
    connected: bool,
}

/// Topic layout derived from [`MqttSettings`].
#[derive(Debug, Clone)]
struct Topics {
    sensor_prefix: String,
    relay_state: String,
    relay_set: String,
    mode_set: String,
    status: String,
}

impl Topics {
    fn new(settings: &MqttSettings) -> Self {
        Self {
            sensor_prefix: format!("{}/", settings.sensor_prefix()),
            relay_state: settings.relay_topic().clone(),
            relay_set: format!("{}/set", settings.relay_topic()),
            mode_set: format!("{}/mode/set", settings.hub_prefix()),
            status: format!("{}/status", settings.hub_prefix()),
        }
    }

    fn sensor(&self, id: &str) -> String {
        format!("{}{}", self.sensor_prefix, id)
    }

    fn sensor_id<'t>(&self, topic: &'t str) -> Option<&'t str> {
        topic
            .strip_prefix(&self.sensor_prefix)
            .filter(|id| !id.is_empty() && !id.contains('/'))
    }
}

/// Create the bridge used by the controller and the listener that keeps it
/// up to date. Mode commands arrive on the returned receiver.
pub fn connect(config: &Config) -> (MqttBridge, MqttListener, mpsc::Receiver<Mode>) {
    let settings = config.mqtt();
    let mut mqtt_options = MqttOptions::new(
        settings.client_id().as_str(),
        settings.host().as_str(),
        *settings.port(),
    );
    mqtt_options.set_keep_alive(Duration::from_secs(5));

    let (client, eventloop) = AsyncClient::new(mqtt_options, 32);
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let topics = Topics::new(settings);
    let cache = Arc::new(RwLock::new(Cache::default()));

    let mut sensor_ids: Vec<String> = [
        config.outdoor_sensors(),
        config.normal_sensors(),
        config.wet_sensors(),
    ]
    .into_iter()
    .flatten()
    .cloned()
    .collect();
    sensor_ids.sort();
    sensor_ids.dedup();

    let max_age = chrono::Duration::seconds(*config.reading_max_age_seconds() as i64);

    let bridge = MqttBridge {
        client: client.clone(),
        topics: topics.clone(),
        cache: cache.clone(),
        max_age,
    };
    let listener = MqttListener {
        client,
        eventloop,
        topics,
        cache,
        sensor_ids,
        commands: commands_tx,
    };

    (bridge, listener, commands_rx)
}

/// Port implementation backed by the listener's cache.
#[derive(Clone)]
pub struct MqttBridge {
    client: AsyncClient,
    topics: Topics,
    cache: Arc<RwLock<Cache>>,
    max_age: chrono::Duration,
}

#[async_trait]
impl SensorPort for MqttBridge {
    async fn read_sensor(&self, id: &str) -> Option<Reading> {
        let cache = self.cache.read().await;
        let reading = cache.readings.get(id)?.fresh(Utc::now(), self.max_age);
        if reading.is_none() {
            tracing::debug!(sensor = id, "Ignoring stale reading");
        }
        reading
    }
}

#[async_trait]
impl ActuatorPort for MqttBridge {
    async fn read_actuator(&self) -> Option<bool> {
        let cache = self.cache.read().await;
        cache.relay.as_ref()?.fresh(Utc::now(), self.max_age)
    }

    async fn write_actuator(&self, on: bool) -> Result<(), ControlError> {
        let payload = json!({ "state": BoostState::from(on).as_ref() }).to_string();
        self.send(&self.topics.relay_set, false, payload.into_bytes()).await
    }
}

#[async_trait]
impl StatusSink for MqttBridge {
    async fn publish_status(&self, report: &StatusReport) -> Result<(), ControlError> {
        let payload = serde_json::to_vec(report)
            .map_err(|e| ControlError::CommunicationFailure(e.to_string()))?;
        self.send(&self.topics.status, true, payload).await
    }
}

impl MqttBridge {
    /// Hand a message to the event loop without waiting for queue space.
    /// Fails while the broker is unreachable or the request queue is full.
    async fn send(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), ControlError> {
        if !self.cache.read().await.connected {
            return Err(ControlError::CommunicationFailure(
                "not connected to the broker".to_string(),
            ));
        }
        self.client
            .try_publish(topic, AtLeastOnce, retain, payload)
            .map_err(|e| ControlError::CommunicationFailure(e.to_string()))
    }
}

/// Polls the MQTT event loop and files incoming messages.
pub struct MqttListener {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
    cache: Arc<RwLock<Cache>>,
    sensor_ids: Vec<String>,
    commands: mpsc::Sender<Mode>,
}

impl MqttListener {
    pub async fn run_until_completion(mut self) -> Result<()> {
        loop {
            match self.eventloop.poll().await {
                Ok(notification) => match notification {
                    Incoming(Packet::ConnAck(_)) => {
                        self.set_connected(true).await;
                        self.subscribe();
                    }
                    Incoming(Packet::Publish(Publish { topic, payload, .. })) => {
                        self.handle_publish(&topic, payload).await?
                    }
                    Incoming(incoming) => {
                        tracing::trace!(incoming = ?incoming, "Unhandled incoming message")
                    }

                    // Do nothing for outgoing requests
                    Outgoing(_) => {}
                },
                Err(e) => {
                    self.set_connected(false).await;
                    tracing::error!(error = %e, "MQTT connection error");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn set_connected(&mut self, connected: bool) {
        let mut cache = self.cache.write().await;
        if cache.connected != connected {
            tracing::info!(connected, "Broker connection changed");
        }
        cache.connected = connected;
    }

    /// Subscriptions are renewed on every connection, from a separate task
    /// so the event loop keeps being polled meanwhile.
    fn subscribe(&self) {
        let client = self.client.clone();
        let mut topics: Vec<String> = self
            .sensor_ids
            .iter()
            .map(|id| self.topics.sensor(id))
            .collect();
        topics.push(self.topics.relay_state.clone());
        topics.push(self.topics.mode_set.clone());

        tokio::spawn(async move {
            for topic in topics {
                if let Err(e) = client.subscribe(topic.clone(), AtLeastOnce).await {
                    tracing::error!(error = %e, topic = %topic, "Failed to subscribe");
                }
            }
            tracing::info!("Subscribed to sensor, relay and mode topics");
        });
    }

    async fn handle_publish(&mut self, topic: &[u8], payload: Bytes) -> Result<()> {
        let Ok(topic) = std::str::from_utf8(topic) else {
            tracing::warn!("Ignoring message with non UTF-8 topic");
            return Ok(());
        };
        let now = Utc::now();

        if topic == self.topics.mode_set {
            match parse_mode(&payload) {
                Some(mode) => self.commands.send(mode).await?,
                None => tracing::warn!(payload = ?payload, "Unknown mode command"),
            }
        } else if topic == self.topics.relay_state {
            match parse_relay_state(&payload) {
                Some(on) => {
                    self.cache.write().await.relay = Some(Received { value: on, at: now });
                }
                None => tracing::debug!(payload = ?payload, "Unreadable relay state"),
            }
        } else if let Some(id) = self.topics.sensor_id(topic) {
            match parse_reading(id, &payload) {
                Some(reading) => {
                    tracing::trace!(?reading, "Sensor reading received");
                    self.cache.write().await.readings.insert(
                        id.to_string(),
                        Received {
                            value: reading,
                            at: now,
                        },
                    );
                }
                None => tracing::debug!(sensor = id, "Payload without temperature or humidity"),
            }
        }

        Ok(())
    }
}

fn measurement(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_measurement(s),
        _ => None,
    }
}

fn parse_measurement(text: &str) -> Option<f64> {
    let captures = MEASUREMENT.captures(text)?;
    captures[1].replace(',', ".").parse().ok()
}

/// Decode a sensor payload. JSON objects with `temperature` and `humidity`
/// fields are expected; a bare `%` value is taken as humidity.
pub fn parse_reading(id: &str, payload: &[u8]) -> Option<Reading> {
    let reading = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => {
            let humidity = fields
                .get("humidity")
                .or_else(|| fields.get("relative_humidity"));
            Reading::new(
                id,
                fields.get("temperature").and_then(measurement),
                humidity.and_then(measurement),
            )
        }
        _ => {
            let text = std::str::from_utf8(payload).ok()?.trim().trim_matches('"');
            if !text.ends_with('%') {
                return None;
            }
            Reading::new(id, None, parse_measurement(text))
        }
    };

    (!reading.is_empty()).then_some(reading)
}

/// Relay reports come as `{"state": "ON"}` or a bare `ON`/`OFF`.
pub fn parse_relay_state(payload: &[u8]) -> Option<bool> {
    let state = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => fields.get("state")?.as_str()?.to_string(),
        Ok(Value::String(state)) => state,
        _ => std::str::from_utf8(payload).ok()?.trim().to_string(),
    };
    BoostState::from_str(state.trim()).ok().map(bool::from)
}

pub fn parse_mode(payload: &[u8]) -> Option<Mode> {
    let text = std::str::from_utf8(payload).ok()?;
    Mode::from_str(text.trim().trim_matches('"')).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_zigbee_style_payloads() {
        let reading =
            parse_reading("bath", br#"{"temperature": 23.4, "humidity": 71, "battery": 90}"#)
                .unwrap();
        assert_eq!(*reading.temperature(), Some(23.4));
        assert_eq!(*reading.relative_humidity(), Some(71.0));
        assert_eq!(reading.source_id(), "bath");
    }

    #[test]
    fn reads_percent_suffixed_strings() {
        let reading = parse_reading("bath", br#"{"humidity": "53 %"}"#).unwrap();
        assert_eq!(*reading.relative_humidity(), Some(53.0));
        assert_eq!(*reading.temperature(), None);

        let reading = parse_reading("bath", b"61,5 %").unwrap();
        assert_eq!(*reading.relative_humidity(), Some(61.5));
    }

    #[test]
    fn garbage_is_absent_not_an_error() {
        assert_eq!(parse_reading("bath", b"{\"battery\": 80}"), None);
        assert_eq!(parse_reading("bath", b"hello"), None);
        assert_eq!(parse_reading("bath", br#"{"humidity": "wet"}"#), None);
        assert_eq!(parse_reading("bath", &[0xff, 0xfe]), None);
    }

    #[test]
    fn relay_state_payloads() {
        assert_eq!(parse_relay_state(br#"{"state": "ON"}"#), Some(true));
        assert_eq!(parse_relay_state(b"off"), Some(false));
        assert_eq!(parse_relay_state(br#"{"state": "TOGGLE"}"#), None);
    }

    #[test]
    fn mode_commands() {
        assert_eq!(parse_mode(b"timer"), Some(Mode::Timer));
        assert_eq!(parse_mode(b"\"Forced\"\n"), Some(Mode::Forced));
        assert_eq!(parse_mode(b"turbo"), None);
    }

    #[test]
    fn sensor_topics_map_back_to_ids() {
        let topics = Topics::new(&MqttSettings::default());
        assert_eq!(topics.sensor("bath"), "zigbee2mqtt/bath");
        assert_eq!(topics.sensor_id("zigbee2mqtt/bath"), Some("bath"));
        assert_eq!(topics.sensor_id("zigbee2mqtt/bath/set"), None);
        assert_eq!(topics.relay_set, "zigbee2mqtt/boost_relay/set");
        assert_eq!(topics.mode_set, "boost-hub/mode/set");
    }

    fn settings() -> Config {
        Config::from_value(&json!({ "wet_sensors": ["bath"] })).0
    }

    #[tokio::test]
    async fn writes_fail_while_disconnected() {
        let (bridge, _listener, _commands) = connect(&settings());

        let result = bridge.write_actuator(true).await;

        assert!(matches!(result, Err(ControlError::CommunicationFailure(_))));
    }

    #[tokio::test]
    async fn full_request_queue_fails_instead_of_blocking() {
        let (bridge, mut listener, _commands) = connect(&settings());
        listener.set_connected(true).await;

        let mut accepted = 0;
        let mut failed = 0;
        for _ in 0..40 {
            let write = bridge.write_actuator(true);
            match tokio::time::timeout(Duration::from_millis(500), write).await {
                Ok(Ok(())) => accepted += 1,
                Ok(Err(_)) => failed += 1,
                Err(_) => panic!("write_actuator blocked on a full queue"),
            }
        }

        assert!(accepted <= 32);
        assert!(failed >= 8);
    }

    #[tokio::test]
    async fn incoming_messages_are_routed_by_topic() {
        let (bridge, mut listener, mut commands) = connect(&settings());

        listener
            .handle_publish(b"zigbee2mqtt/boost_relay", Bytes::from_static(br#"{"state":"ON"}"#))
            .await
            .unwrap();
        listener
            .handle_publish(
                b"zigbee2mqtt/bath",
                Bytes::from_static(br#"{"temperature": 23.0, "humidity": 71}"#),
            )
            .await
            .unwrap();
        listener
            .handle_publish(b"boost-hub/mode/set", Bytes::from_static(b"forced"))
            .await
            .unwrap();

        {
            let cache = listener.cache.read().await;
            assert_eq!(cache.relay.as_ref().map(|r| r.value), Some(true));
            assert_eq!(cache.readings.len(), 1);
            assert!(!cache.readings.contains_key("boost_relay"));
        }
        assert_eq!(bridge.read_actuator().await, Some(true));
        let reading = bridge.read_sensor("bath").await.unwrap();
        assert_eq!(*reading.relative_humidity(), Some(71.0));
        assert_eq!(commands.try_recv().ok(), Some(Mode::Forced));
    }

    #[test]
    fn stale_values_are_dropped() {
        let now = Utc::now();
        let received = Received {
            value: true,
            at: now - chrono::Duration::seconds(120),
        };
        assert_eq!(received.fresh(now, chrono::Duration::seconds(300)), Some(true));
        assert_eq!(received.fresh(now, chrono::Duration::seconds(60)), None);
    }
}
