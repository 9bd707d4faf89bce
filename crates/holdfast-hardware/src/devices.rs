//! Enum wrappers for hardware device dispatch.
//!
//! [`TagReader`] methods return opaque futures, so the trait cannot be used
//! as `dyn TagReader`. These enums give the controller one concrete type per
//! device family while keeping calls statically dispatched. The sync traits
//! are wrapped the same way so every device family is selected identically.
//!
//! # Examples
//!
//! ```
//! use holdfast_core::ActuatorAddress;
//! use holdfast_hardware::devices::AnyActuator;
//! use holdfast_hardware::mock::MockActuator;
//! use holdfast_hardware::traits::Actuator;
//!
//! let (magnet, handle) = MockActuator::new(ActuatorAddress::new(0x60, 1).unwrap());
//! let mut any_magnet = AnyActuator::Mock(magnet);
//!
//! any_magnet.engage().unwrap();
//! assert!(handle.is_engaged());
//! ```

use crate::Result;
use crate::mock::{MockActuator, MockBus, MockInput, MockTagReader};
use crate::traits::{Actuator, DigitalInput, I2cBus, TagReader};
use holdfast_core::{ActuatorAddress, Tag};
use std::time::Duration;

/// Enum wrapper for I2C bus dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyBus {
    /// Simulated bus with multiplexer and readers.
    Mock(MockBus),
}

impl I2cBus for AnyBus {
    fn write_byte(&mut self, address: u8, byte: u8) -> Result<()> {
        match self {
            Self::Mock(bus) => bus.write_byte(address, byte),
        }
    }

    fn write_quick(&mut self, address: u8) -> Result<()> {
        match self {
            Self::Mock(bus) => bus.write_quick(address),
        }
    }

    fn write_read(&mut self, address: u8, command: &[u8], response: &mut [u8]) -> Result<usize> {
        match self {
            Self::Mock(bus) => bus.write_read(address, command, response),
        }
    }
}

/// Enum wrapper for tag reader dispatch.
///
/// # Examples
///
/// ```
/// use holdfast_core::Channel;
/// use holdfast_hardware::devices::{AnyBus, AnyTagReader};
/// use holdfast_hardware::mock::{MockBus, MockTagReader};
/// use holdfast_hardware::traits::{I2cBus, TagReader};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> holdfast_hardware::Result<()> {
///     let (bus, _handle) = MockBus::new();
///     let mut bus = AnyBus::Mock(bus);
///     let mut reader = AnyTagReader::Mock(MockTagReader::new());
///
///     bus.write_byte(0x74, Channel::new(0).unwrap().select_mask())?;
///     reader.configure_initiator(&mut bus).await?;
///     assert!(reader.read_target(&mut bus, Duration::ZERO).await?.is_none());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTagReader {
    /// Mock reader driver for the simulated bus.
    Mock(MockTagReader),
}

impl TagReader for AnyTagReader {
    async fn configure_initiator<B: I2cBus>(&mut self, bus: &mut B) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.configure_initiator(bus).await,
        }
    }

    async fn read_target<B: I2cBus>(
        &mut self,
        bus: &mut B,
        timeout: Duration,
    ) -> Result<Option<Tag>> {
        match self {
            Self::Mock(reader) => reader.read_target(bus, timeout).await,
        }
    }
}

/// Enum wrapper for actuator dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyActuator {
    /// Mock electromagnet output.
    Mock(MockActuator),
}

impl Actuator for AnyActuator {
    fn address(&self) -> ActuatorAddress {
        match self {
            Self::Mock(actuator) => actuator.address(),
        }
    }

    fn set_power(&mut self, power: u8) -> Result<()> {
        match self {
            Self::Mock(actuator) => actuator.set_power(power),
        }
    }

    fn engage(&mut self) -> Result<()> {
        match self {
            Self::Mock(actuator) => actuator.engage(),
        }
    }

    fn release(&mut self) -> Result<()> {
        match self {
            Self::Mock(actuator) => actuator.release(),
        }
    }
}

/// Enum wrapper for digital input dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyInput {
    /// Mock input line.
    Mock(MockInput),
}

impl DigitalInput for AnyInput {
    fn pin(&self) -> u8 {
        match self {
            Self::Mock(input) => input.pin(),
        }
    }

    fn is_high(&self) -> Result<bool> {
        match self {
            Self::Mock(input) => input.is_high(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInput;

    #[test]
    fn test_any_input_dispatch() {
        let (input, handle) = MockInput::new(7);
        let input = AnyInput::Mock(input);

        assert_eq!(input.pin(), 7);
        handle.set_high();
        assert!(input.is_high().unwrap());
    }

    #[test]
    fn test_any_actuator_dispatch() {
        let address = ActuatorAddress::new(0x61, 3).unwrap();
        let (actuator, handle) = MockActuator::new(address);
        let mut actuator = AnyActuator::Mock(actuator);

        assert_eq!(actuator.address(), address);
        actuator.set_power(90).unwrap();
        assert_eq!(handle.power(), 90);
    }
}
