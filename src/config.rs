//! TOML configuration: one file describes the broker, the pin layout and
//! every protection threshold. Every section and field has a default, so a
//! minimal file only needs the broker address and the pins.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::gpio::burnout::BurnoutPolicy;
use crate::gpio::channel::{channel_name, parse_channel_name};
use crate::publish::policy::PublishPolicy;
use crate::totp;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub gpio: GpioConfig,
    pub burnout: BurnoutConfig,
    pub publish: PublishConfig,
    pub notify: NotifyConfig,
    pub mfa: MfaConfig,
    pub net: NetConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        info!(
            "Loaded configuration: {} relays, {} momentary, {} contacts",
            config.gpio.relay_pins.len(),
            config.gpio.momentary_pins.len(),
            config.gpio.contact_pins.len()
        );
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for pin in self
            .gpio
            .relay_pins
            .iter()
            .chain(&self.gpio.momentary_pins)
            .chain(&self.gpio.contact_pins)
        {
            if !seen.insert(*pin) {
                return Err(ConfigError::Invalid(format!(
                    "pin {pin} appears in more than one role list"
                )));
            }
        }

        let relays: HashSet<u8> = self
            .gpio
            .relay_pins
            .iter()
            .chain(&self.gpio.momentary_pins)
            .copied()
            .collect();

        for (name, secrets) in &self.mfa.secrets {
            let pin = parse_channel_name(name).ok_or_else(|| {
                ConfigError::Invalid(format!("mfa.secrets key {name:?} is not a channel name"))
            })?;
            if !relays.contains(&pin) {
                return Err(ConfigError::Invalid(format!(
                    "mfa.secrets configured for {name}, which is not a relay pin"
                )));
            }
            for secret in secrets {
                let key = totp::base32_decode(secret).map_err(|e| {
                    ConfigError::Invalid(format!("mfa secret for {name}: {e}"))
                })?;
                if key.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "mfa secret for {name} decodes to an empty key"
                    )));
                }
            }
        }

        for name in self.gpio.momentary_wait_overrides.keys() {
            let pin = parse_channel_name(name).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "gpio.momentary_wait_overrides key {name:?} is not a channel name"
                ))
            })?;
            if !self.gpio.momentary_pins.contains(&pin) {
                return Err(ConfigError::Invalid(format!(
                    "momentary wait override for {name}, which is not a momentary pin"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub client_id: String,
    pub topic: String,
    /// 0, 1 or 2; QoS1 keeps requests alive across short outages.
    pub qos: u8,
    pub retain: bool,
    pub keep_alive_secs: u64,
    /// False keeps the session so QoS1 messages survive a reconnect.
    pub clean_session: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 1883,
            user: String::new(),
            password: String::new(),
            client_id: "relayctl".to_string(),
            topic: "relayctl/gpio".to_string(),
            qos: 1,
            retain: false,
            keep_alive_secs: 120,
            clean_session: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// Regular relays: hold the last written value.
    pub relay_pins: Vec<u8>,
    /// Momentary relays: pulse and return to rest.
    pub momentary_pins: Vec<u8>,
    /// Normally-open contacts, read-only.
    pub contact_pins: Vec<u8>,
    /// Default pulse width for momentary relays.
    pub momentary_wait_secs: u64,
    /// Per-channel pulse width, keyed by channel name (e.g. "GP18").
    pub momentary_wait_overrides: HashMap<String, u64>,
    /// Use the in-memory backend instead of real hardware.
    pub simulate: bool,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            relay_pins: Vec::new(),
            momentary_pins: Vec::new(),
            contact_pins: Vec::new(),
            momentary_wait_secs: 2,
            momentary_wait_overrides: HashMap::new(),
            simulate: false,
        }
    }
}

impl GpioConfig {
    pub fn momentary_wait_for(&self, pin: u8) -> Option<Duration> {
        self.momentary_wait_overrides
            .get(&channel_name(pin))
            .map(|secs| Duration::from_secs(*secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BurnoutConfig {
    /// Minimum interval between two writes to the same relay.
    pub cooldown_secs: u64,
    pub burst_window_secs: u64,
    /// Writes allowed inside the burst window before vetoes start.
    pub burst_max: u32,
    /// Violations tolerated before a relay is disabled until restart.
    pub violation_max: u32,
    /// Whether cooldown skips also count toward the permanent lockout.
    pub count_cooldown_violations: bool,
}

impl Default for BurnoutConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 2,
            burst_window_secs: 60,
            burst_max: 5,
            violation_max: 3,
            count_cooldown_violations: false,
        }
    }
}

impl BurnoutConfig {
    pub fn policy(&self) -> BurnoutPolicy {
        BurnoutPolicy {
            cooldown: Duration::from_secs(self.cooldown_secs),
            burst_window: Duration::from_secs(self.burst_window_secs),
            burst_max: self.burst_max,
            violation_max: self.violation_max,
            count_cooldown_violations: self.count_cooldown_violations,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Flood-guard window.
    pub threshold_secs: u64,
    /// Publishes tolerated inside the window before the guard trips.
    pub counter_max: i32,
    /// Unconditional full snapshot interval; -1 disables.
    pub scheduled_secs: i64,
    pub tick_secs: u64,
    /// Bounded log queue capacity (drop-oldest beyond this).
    pub log_queue_limit: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 10,
            counter_max: 20,
            scheduled_secs: 7200,
            tick_secs: 5,
            log_queue_limit: 256,
        }
    }
}

impl PublishConfig {
    pub fn policy(&self) -> PublishPolicy {
        PublishPolicy {
            threshold: Duration::from_secs(self.threshold_secs),
            counter_max: self.counter_max,
            scheduled: u64::try_from(self.scheduled_secs)
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Channels whose published changes produce a NOTIFY event.
    pub pins: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    /// Accepted codes: the current one plus `window - 1` previous ones.
    pub window: usize,
    /// Base32 secrets per channel name; a channel with no entry needs no
    /// code at all.
    pub secrets: HashMap<String, Vec<String>>,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            window: 5,
            secrets: HashMap::new(),
        }
    }
}

impl MfaConfig {
    pub fn secrets_for(&self, pin: u8) -> Vec<String> {
        self.secrets
            .get(&channel_name(pin))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// JSON provider answering `{"ip": "..."}`.
    pub ip_provider: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            ip_provider: "https://jsonip.com".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_round_trip() {
        let config: Config = toml::from_str(
            r#"
            [mqtt]
            server = "broker.example.org"
            topic = "home/garage"

            [gpio]
            relay_pins = [16, 17]
            momentary_pins = [18]
            contact_pins = [0, 1]

            [mfa]
            window = 3
            [mfa.secrets]
            GP16 = ["DWRGVKRPQJLNU4GY"]
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.mqtt.server, "broker.example.org");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.gpio.relay_pins, vec![16, 17]);
        assert_eq!(config.burnout.cooldown_secs, 2);
        assert_eq!(config.mfa.window, 3);
        assert_eq!(config.mfa.secrets_for(16), vec!["DWRGVKRPQJLNU4GY"]);
        assert!(config.mfa.secrets_for(17).is_empty());
    }

    #[test]
    fn duplicate_pin_roles_are_rejected() {
        let config: Config = toml::from_str(
            r#"
            [gpio]
            relay_pins = [16]
            contact_pins = [16]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_mfa_secret_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [gpio]
            relay_pins = [16]
            [mfa.secrets]
            GP16 = ["not base32!"]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn mfa_on_contact_pin_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [gpio]
            contact_pins = [3]
            [mfa.secrets]
            GP3 = ["DWRGVKRPQJLNU4GY"]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn scheduled_publish_can_be_disabled() {
        let mut publish = PublishConfig::default();
        assert!(publish.policy().scheduled.is_some());
        publish.scheduled_secs = -1;
        assert!(publish.policy().scheduled.is_none());
    }
}
