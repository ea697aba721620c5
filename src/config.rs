use log::debug;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::models::FrameMode;
use crate::sink::MqttSettings;

const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_LINE_LENGTH: usize = 4096;
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_BROKER_URL: &str = "mqtt://mqtt.eclipseprojects.io:1883";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_TOPIC: &str = "test/india/gj/ahm/sensor";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// `None` means the operator is prompted at startup
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub frame_mode: FrameMode,
    pub poll_interval: Duration,
    pub max_line_length: usize,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// `None` disables publishing
    pub mqtt: Option<MqttSettings>,
    /// `None` disables the spreadsheet archive
    pub spreadsheet_path: Option<PathBuf>,
}

impl BridgeConfig {
    /// Load configuration from the environment, after reading `.env` if present
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let frame_mode = match get("FRAME_MODE") {
            Some(raw) => raw
                .parse::<FrameMode>()
                .map_err(|e| ConfigError::Invalid("FRAME_MODE".into(), e))?,
            None => FrameMode::Binary,
        };

        let mqtt = if parse_or(&get, "MQTT_ENABLED", true)? {
            let url = get("MQTT_BROKER_URL").unwrap_or_else(|| DEFAULT_BROKER_URL.to_string());
            let (host, port) = parse_broker_url(&url)?;
            let topic = get("MQTT_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string());
            Some(MqttSettings {
                host,
                port,
                client_id: get("MQTT_CLIENT_ID")
                    .unwrap_or_else(|| format!("uart-mqtt-bridge-{}", std::process::id())),
                command_topic: get("MQTT_COMMAND_TOPIC").unwrap_or_else(|| topic.clone()),
                topic,
                keep_alive: Duration::from_secs(parse_or(
                    &get,
                    "MQTT_KEEP_ALIVE_SECS",
                    DEFAULT_KEEP_ALIVE_SECS,
                )?),
            })
        } else {
            None
        };

        let config = BridgeConfig {
            serial_port: get("SERIAL_PORT"),
            baud_rate: parse_or(&get, "SERIAL_BAUD_RATE", DEFAULT_BAUD_RATE)?,
            read_timeout: Duration::from_secs(parse_or(
                &get,
                "SERIAL_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            frame_mode,
            poll_interval: Duration::from_millis(parse_or(
                &get,
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            max_line_length: parse_or(&get, "MAX_LINE_LENGTH", DEFAULT_MAX_LINE_LENGTH)?,
            reconnect_attempts: parse_or(
                &get,
                "SERIAL_RECONNECT_ATTEMPTS",
                DEFAULT_RECONNECT_ATTEMPTS,
            )?,
            reconnect_delay: Duration::from_secs(parse_or(
                &get,
                "SERIAL_RECONNECT_DELAY_SECS",
                DEFAULT_RECONNECT_DELAY_SECS,
            )?),
            mqtt,
            spreadsheet_path: get("SPREADSHEET_PATH").map(PathBuf::from),
        };

        if config.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "POLL_INTERVAL_MS".into(),
                "must be greater than zero".into(),
            ));
        }

        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid(key.to_string(), format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}

/// Split `mqtt://host[:port]` (or `tcp://`) into host and port
fn parse_broker_url(raw: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid("MQTT_BROKER_URL".into(), reason);

    let url = Url::parse(raw).map_err(|e| invalid(format!("'{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "mqtt" | "tcp") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid(format!("'{}' has no host", raw)))?;

    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<BridgeConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_deployed_bridge() {
        let config = load(&[]).unwrap();
        assert_eq!(config.serial_port, None);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.frame_mode, FrameMode::Binary);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.spreadsheet_path, None);

        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.host, "mqtt.eclipseprojects.io");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.topic, "test/india/gj/ahm/sensor");
        assert_eq!(mqtt.command_topic, mqtt.topic);
        assert_eq!(mqtt.keep_alive, Duration::from_secs(60));
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("SERIAL_PORT", "/dev/ttyUSB1"),
            ("SERIAL_BAUD_RATE", "9600"),
            ("FRAME_MODE", "text"),
            ("POLL_INTERVAL_MS", "200"),
            ("MQTT_BROKER_URL", "tcp://broker.local"),
            ("MQTT_TOPIC", "site/sensor"),
            ("MQTT_COMMAND_TOPIC", "site/cmd"),
            ("SPREADSHEET_PATH", "readings.csv"),
        ])
        .unwrap();
        assert_eq!(config.serial_port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.frame_mode, FrameMode::Text);
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.spreadsheet_path, Some(PathBuf::from("readings.csv")));

        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.host, "broker.local");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.command_topic, "site/cmd");
    }

    #[test]
    fn mqtt_can_be_disabled() {
        let config = load(&[("MQTT_ENABLED", "false"), ("MQTT_BROKER_URL", "garbage")]).unwrap();
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            load(&[("SERIAL_BAUD_RATE", "fast")]),
            Err(ConfigError::Invalid(key, _)) if key == "SERIAL_BAUD_RATE"
        ));
        assert!(matches!(
            load(&[("FRAME_MODE", "morse")]),
            Err(ConfigError::Invalid(key, _)) if key == "FRAME_MODE"
        ));
        assert!(matches!(
            load(&[("MQTT_BROKER_URL", "http://broker:1883")]),
            Err(ConfigError::Invalid(key, _)) if key == "MQTT_BROKER_URL"
        ));
        assert!(matches!(
            load(&[("POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid(key, _)) if key == "POLL_INTERVAL_MS"
        ));
    }

    #[test]
    fn broker_url_keeps_explicit_port() {
        assert_eq!(
            parse_broker_url("mqtt://10.0.0.2:8883").unwrap(),
            ("10.0.0.2".to_string(), 8883)
        );
    }
}
