//! Simulated prop wiring.
//!
//! [`mock_rig`] builds an orchestrator on mock hardware laid out exactly as
//! a configuration describes, and returns the handles that play the part of
//! the players: putting tags on readers, raising input lines, watching the
//! electromagnets. Used by the emulator binary and the integration tests.

use crate::error::Result;
use crate::orchestrator::{Orchestrator, OrchestratorBuilder};
use crate::source::TagSource;
use holdfast_core::{
    Tag,
    config::{PropConfig, Sensor},
};
use holdfast_hardware::mock::{
    ConcurrencyProbe, MockActuator, MockActuatorHandle, MockBus, MockBusHandle, MockInput,
    MockInputHandle, MockTagReader,
};
use holdfast_hardware::{
    AnyActuator, AnyBus, AnyInput, AnyTagReader, BusArbiter, ChannelScanner, ScannerSettings,
};
use std::sync::Arc;

/// Control handles for one simulated part.
#[derive(Debug, Clone)]
pub struct PartHandles {
    pub name: String,
    pub expected: Tag,
    pub sensor: Sensor,
    pub actuators: Vec<MockActuatorHandle>,
    bus: MockBusHandle,
    input: Option<MockInputHandle>,
}

impl PartHandles {
    /// Put `tag` in front of the part's sensor.
    ///
    /// A GPIO-sensed part only goes high for its expected tag, as the
    /// standalone reader board would.
    pub fn place(&self, tag: Tag) {
        match self.sensor {
            Sensor::Channel(channel) => self.bus.place(channel, tag),
            Sensor::Gpio(_) => {
                if let Some(input) = &self.input {
                    input.set(tag == self.expected);
                }
            }
        }
    }

    /// Put the right tag in place.
    pub fn place_expected(&self) {
        self.place(self.expected.clone());
    }

    /// Take whatever is in place away.
    pub fn remove(&self) {
        match self.sensor {
            Sensor::Channel(channel) => self.bus.remove(channel),
            Sensor::Gpio(_) => {
                if let Some(input) = &self.input {
                    input.set_low();
                }
            }
        }
    }

    /// Make the next `reads` reads of a GPIO part's input line fail.
    pub fn glitch_input(&self, reads: u32) {
        if let Some(input) = &self.input {
            input.fail_next(reads);
        }
    }

    /// True if every actuator of the part is energized.
    pub fn is_held(&self) -> bool {
        self.actuators.iter().all(MockActuatorHandle::is_engaged)
    }

    /// True if no actuator of the part is energized.
    pub fn is_released(&self) -> bool {
        !self.actuators.iter().any(MockActuatorHandle::is_engaged)
    }
}

/// Handles for a whole simulated prop.
#[derive(Debug, Clone)]
pub struct MockRig {
    pub bus: MockBusHandle,
    pub parts: Vec<PartHandles>,
    /// Shared by every simulated reader; records overlapping reads.
    pub probe: Arc<ConcurrencyProbe>,
}

impl MockRig {
    /// Handles of the part called `name`.
    pub fn part(&self, name: &str) -> Option<&PartHandles> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// True if no actuator anywhere is energized.
    pub fn all_released(&self) -> bool {
        self.parts.iter().all(PartHandles::is_released)
    }
}

/// Build mock hardware for `config` and an orchestrator builder wired to it.
///
/// # Errors
///
/// Returns `ControllerError::Config` if `config` does not validate.
///
/// # Examples
///
/// ```
/// use holdfast_controller::rig::mock_rig;
/// use holdfast_core::config::{PartConfig, PropConfig, Sensor};
/// use holdfast_core::{ActuatorAddress, Channel, Tag};
///
/// let config = PropConfig {
///     parts: vec![PartConfig {
///         name: "head".to_string(),
///         tag: Tag::from_hex("A74B7EF2").unwrap(),
///         sensor: Sensor::Channel(Channel::new(0).unwrap()),
///         actuators: vec![ActuatorAddress::new(0x60, 1).unwrap()],
///     }],
///     ..PropConfig::default()
/// };
///
/// let (builder, rig) = mock_rig(&config).unwrap();
/// let orchestrator = builder.rng_seed(7).build().unwrap();
/// assert_eq!(orchestrator.part_count(), 1);
/// assert!(rig.part("head").is_some());
/// ```
pub fn mock_rig(config: &PropConfig) -> Result<(OrchestratorBuilder, MockRig)> {
    config.validate()?;

    let (bus, bus_handle) =
        MockBus::with_addresses(config.bus.mux_address, config.bus.reader_address);
    let arbiter = Arc::new(BusArbiter::new(AnyBus::Mock(bus), config.bus.mux_address));
    let probe = ConcurrencyProbe::new();
    let settings = ScannerSettings::from_config(config);

    let mut builder = Orchestrator::builder(config, arbiter);
    let mut parts = Vec::with_capacity(config.parts.len());

    for part in &config.parts {
        let (actuators, actuator_handles): (Vec<_>, Vec<_>) = part
            .actuators
            .iter()
            .map(|&address| {
                let (actuator, handle) = MockActuator::new(address);
                (AnyActuator::Mock(actuator), handle)
            })
            .unzip();

        let (source, input) = match part.sensor {
            Sensor::Channel(channel) => {
                let reader = MockTagReader::with_address(config.bus.reader_address)
                    .with_probe(Arc::clone(&probe));
                let scanner = ChannelScanner::new(channel, AnyTagReader::Mock(reader), settings);
                (TagSource::Scanner(scanner), None)
            }
            Sensor::Gpio(pin) => {
                let (input, handle) = MockInput::new(pin);
                (TagSource::Gpio(AnyInput::Mock(input)), Some(handle))
            }
        };

        builder = builder.part(part.clone(), actuators, source);
        parts.push(PartHandles {
            name: part.name.clone(),
            expected: part.tag.clone(),
            sensor: part.sensor,
            actuators: actuator_handles,
            bus: bus_handle.clone(),
            input,
        });
    }

    Ok((
        builder,
        MockRig {
            bus: bus_handle,
            parts,
            probe,
        },
    ))
}
