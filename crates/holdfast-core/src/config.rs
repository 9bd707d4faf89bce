//! Prop configuration records.
//!
//! Every record deserializes with serde and falls back to the calibrated
//! defaults from [`crate::constants`] for any field left out. Durations are
//! stored as integer milliseconds and exposed through `Duration` accessors.
//!
//! # Examples
//!
//! ```
//! use holdfast_core::config::{PartConfig, PropConfig, Sensor};
//! use holdfast_core::{ActuatorAddress, Channel, Tag};
//!
//! let config = PropConfig {
//!     parts: vec![PartConfig {
//!         name: "head".to_string(),
//!         tag: Tag::new(vec![0xA7, 0x4B, 0x7E, 0xF2]).unwrap(),
//!         sensor: Sensor::Channel(Channel::new(0).unwrap()),
//!         actuators: vec![ActuatorAddress::new(0x60, 1).unwrap()],
//!     }],
//!     ..PropConfig::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::{
    ActuatorAddress, Channel, Result, Tag,
    constants::*,
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// How a part's presence is sensed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    /// A tag reader behind the given multiplexer channel.
    Channel(Channel),

    /// A digital input driven by a standalone reader board that checks the
    /// tag itself. High means the right tag is in place.
    Gpio(u8),
}

/// One movable part of the prop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartConfig {
    pub name: String,
    pub tag: Tag,
    pub sensor: Sensor,
    /// Actuators holding this part, in engage order (one or two).
    pub actuators: Vec<ActuatorAddress>,
}

/// I2C addressing of the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub mux_address: u8,
    pub reader_address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mux_address: DEFAULT_MUX_ADDRESS,
            reader_address: DEFAULT_READER_ADDRESS,
        }
    }
}

/// Orchestrator and monitor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_ms: u64,
    pub debounce_ms: u64,
    pub read_timeout_ms: u64,
    pub settle_ms: u64,
    pub safety_timeout_ms: u64,
    /// `None` disables auto-restart; the prop then waits for a `reset` command.
    pub auto_restart_ms: Option<u64>,
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn safety_timeout(&self) -> Duration {
        Duration::from_millis(self.safety_timeout_ms)
    }

    pub fn auto_restart(&self) -> Option<Duration> {
        self.auto_restart_ms.map(Duration::from_millis)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            safety_timeout_ms: DEFAULT_SAFETY_TIMEOUT_MS,
            auto_restart_ms: Some(DEFAULT_AUTO_RESTART_MS),
        }
    }
}

/// Actuator power levels.
///
/// A found part is pulled in at `engage_power`, then held at `hold_power`
/// once `boost_ms` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerProfile {
    pub engage_power: u8,
    pub hold_power: u8,
    pub boost_ms: u64,
}

impl PowerProfile {
    pub fn boost(&self) -> Duration {
        Duration::from_millis(self.boost_ms)
    }
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self {
            engage_power: DEFAULT_ENGAGE_POWER,
            hold_power: DEFAULT_HOLD_POWER,
            boost_ms: DEFAULT_BOOST_MS,
        }
    }
}

/// Retry budget for reader wake-up, initiator configuration and channel select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_ms: u64,
    pub select_attempts: u32,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            select_attempts: DEFAULT_SELECT_ATTEMPTS,
        }
    }
}

/// Per-part delay before a part drops during the release sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReleaseDelay {
    /// Part `i` drops after `i * step_ms`.
    Stagger { step_ms: u64 },

    /// Each part drops after a uniform draw in `[min_ms, max_ms]`.
    Random { min_ms: u64, max_ms: u64 },
}

impl Default for ReleaseDelay {
    fn default() -> Self {
        ReleaseDelay::Random {
            min_ms: DEFAULT_RELEASE_MIN_MS,
            max_ms: DEFAULT_RELEASE_MAX_MS,
        }
    }
}

/// How channel scans are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// One task scans every due channel in order on each tick.
    #[default]
    RoundRobin,

    /// One background task per channel, serialized by the bus arbiter.
    Concurrent,
}

/// What to do when a tag source fails to initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort startup with the error.
    #[default]
    Abort,

    /// Log a warning and run without that part.
    SkipPart,
}

/// Complete prop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropConfig {
    #[serde(default)]
    pub bus: BusConfig,
    pub parts: Vec<PartConfig>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub power: PowerProfile,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub release: ReleaseDelay,
    #[serde(default)]
    pub scan_mode: ScanMode,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl PropConfig {
    /// Check cross-field invariants.
    ///
    /// # Errors
    /// - `Error::Config` if no parts are configured or a numeric setting is unusable
    /// - `Error::DuplicateName`, `Error::DuplicateTag`, `Error::DuplicateChannel`
    ///   if two parts share a name, an expected tag or a sensor
    /// - `Error::InvalidActuator` for a bad output index, a wrong actuator
    ///   count or an actuator shared between parts
    pub fn validate(&self) -> Result<()> {
        if self.parts.is_empty() {
            return Err(Error::Config("No parts configured".to_string()));
        }
        if self.bus.mux_address == self.bus.reader_address {
            return Err(Error::Config(format!(
                "Multiplexer and reader share address 0x{:02X}",
                self.bus.mux_address
            )));
        }
        if self.timing.tick_ms == 0 {
            return Err(Error::Config("tick_ms must be positive".to_string()));
        }
        if self.power.hold_power > self.power.engage_power {
            return Err(Error::Config(format!(
                "hold_power {} exceeds engage_power {}",
                self.power.hold_power, self.power.engage_power
            )));
        }
        if let ReleaseDelay::Random { min_ms, max_ms } = self.release
            && min_ms > max_ms
        {
            return Err(Error::Config(format!(
                "Release window is empty: {min_ms}ms > {max_ms}ms"
            )));
        }

        let mut names = HashSet::new();
        let mut tags: HashMap<&Tag, &str> = HashMap::new();
        let mut sensors: HashMap<Sensor, &str> = HashMap::new();
        let mut actuators: HashMap<ActuatorAddress, &str> = HashMap::new();

        for part in &self.parts {
            let name = part.name.as_str();
            if name.trim().is_empty() {
                return Err(Error::Config("Part name must not be empty".to_string()));
            }
            if !names.insert(name) {
                return Err(Error::DuplicateName(name.to_string()));
            }

            if let Some(first) = tags.insert(&part.tag, name) {
                return Err(Error::DuplicateTag {
                    tag: part.tag.to_hex(),
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }

            if let Some(first) = sensors.insert(part.sensor, name) {
                return Err(match part.sensor {
                    Sensor::Channel(channel) => Error::DuplicateChannel {
                        channel: channel.as_u8(),
                        first: first.to_string(),
                        second: name.to_string(),
                    },
                    Sensor::Gpio(pin) => Error::Config(format!(
                        "GPIO pin {pin} is used by both {first} and {name}"
                    )),
                });
            }

            if part.actuators.is_empty() || part.actuators.len() > MAX_ACTUATORS_PER_PART {
                return Err(Error::InvalidActuator(format!(
                    "Part {name} must have 1-{MAX_ACTUATORS_PER_PART} actuators, has {}",
                    part.actuators.len()
                )));
            }
            for address in &part.actuators {
                address.validate()?;
                if let Some(owner) = actuators.insert(*address, name) {
                    return Err(Error::InvalidActuator(format!(
                        "Actuator {address} is owned by both {owner} and {name}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn part(name: &str, tag: u8, channel: u8, output: u8) -> PartConfig {
        PartConfig {
            name: name.to_string(),
            tag: Tag::new(vec![tag, 0x4B, 0x7E, 0xF2]).unwrap(),
            sensor: Sensor::Channel(Channel::new(channel).unwrap()),
            actuators: vec![ActuatorAddress::new(0x60, output).unwrap()],
        }
    }

    fn config(parts: Vec<PartConfig>) -> PropConfig {
        PropConfig {
            parts,
            ..PropConfig::default()
        }
    }

    #[test]
    fn test_defaults_match_constants() {
        let config = PropConfig::default();
        assert_eq!(config.bus.mux_address, 0x74);
        assert_eq!(config.bus.reader_address, 0x24);
        assert_eq!(config.timing.debounce(), Duration::from_secs(1));
        assert_eq!(config.power.hold_power, DEFAULT_HOLD_POWER);
        assert_eq!(config.retry.attempts, 100);
        assert_eq!(config.scan_mode, ScanMode::RoundRobin);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn test_valid_three_part_config() {
        let config = config(vec![
            part("head", 1, 0, 1),
            part("arm", 2, 1, 2),
            part("leg", 3, 2, 3),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_parts_rejected() {
        assert!(matches!(config(vec![]).validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let config = config(vec![part("head", 1, 0, 1), part("arm", 1, 1, 2)]);
        assert_eq!(
            config.validate(),
            Err(Error::DuplicateTag {
                tag: "014B7EF2".to_string(),
                first: "head".to_string(),
                second: "arm".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let config = config(vec![part("head", 1, 4, 1), part("arm", 2, 4, 2)]);
        assert!(matches!(
            config.validate(),
            Err(Error::DuplicateChannel { channel: 4, .. })
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let config = config(vec![part("head", 1, 0, 1), part("head", 2, 1, 2)]);
        assert_eq!(config.validate(), Err(Error::DuplicateName("head".to_string())));
    }

    #[test]
    fn test_shared_actuator_rejected() {
        let config = config(vec![part("head", 1, 0, 1), part("arm", 2, 1, 1)]);
        assert!(matches!(config.validate(), Err(Error::InvalidActuator(_))));
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    fn test_actuator_count_bounds(#[case] count: u8) {
        let mut head = part("head", 1, 0, 1);
        head.actuators = (1..=count)
            .map(|i| ActuatorAddress::new(0x60, i).unwrap())
            .collect();
        assert!(matches!(
            config(vec![head]).validate(),
            Err(Error::InvalidActuator(_))
        ));
    }

    #[test]
    fn test_hold_above_engage_rejected() {
        let mut config = config(vec![part("head", 1, 0, 1)]);
        config.power.hold_power = 200;
        config.power.engage_power = 100;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_inverted_release_window_rejected() {
        let mut config = config(vec![part("head", 1, 0, 1)]);
        config.release = ReleaseDelay::Random {
            min_ms: 5000,
            max_ms: 1000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gpio_and_channel_sensors_coexist() {
        let mut gpio = part("arm", 2, 0, 2);
        gpio.sensor = Sensor::Gpio(0);
        let config = config(vec![part("head", 1, 0, 1), gpio]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "parts": [
                {
                    "name": "head",
                    "tag": [167, 75, 126, 242],
                    "sensor": { "channel": 0 },
                    "actuators": [{ "controller": 96, "index": 1 }]
                }
            ],
            "release": { "mode": "stagger", "step_ms": 250 },
            "timing": { "auto_restart_ms": null }
        }"#;

        let config: PropConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.release, ReleaseDelay::Stagger { step_ms: 250 });
        assert_eq!(config.timing.auto_restart(), None);
        assert_eq!(config.timing.tick_ms, DEFAULT_TICK_MS);
        assert_eq!(config.bus, BusConfig::default());
    }
}
