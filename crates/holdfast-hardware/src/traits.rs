//! Hardware device trait definitions.
//!
//! These traits are the contract between the scanning / actuation logic and
//! the peripherals on the prop: the shared I2C bus, the tag readers behind its
//! multiplexer, the electromagnet drivers and plain digital inputs.
//!
//! Bus, actuator and input operations are synchronous: each is a single short
//! register write. Tag reads can wait on the RF field, so [`TagReader`] is
//! async. Its methods are spelled out as `impl Future + Send` so scanners can
//! be moved into spawned tasks; implementors still write plain `async fn`.

use crate::error::Result;
use holdfast_core::{ActuatorAddress, Tag};
use std::future::Future;
use std::time::Duration;

/// A raw I2C bus master.
///
/// # Examples
///
/// ```
/// use holdfast_hardware::traits::I2cBus;
/// use holdfast_hardware::mock::MockBus;
///
/// let (mut bus, handle) = MockBus::new();
/// bus.write_byte(0x74, 0b0000_0100).unwrap();
/// assert_eq!(handle.selected(), 0b0000_0100);
/// ```
pub trait I2cBus: Send {
    /// Write a single byte to a device (used for the multiplexer control register).
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not acknowledge.
    fn write_byte(&mut self, address: u8, byte: u8) -> Result<()>;

    /// Address-only transaction, used as a presence probe.
    ///
    /// # Errors
    ///
    /// Returns an error if no device acknowledges the address.
    fn write_quick(&mut self, address: u8) -> Result<()>;

    /// Write a command frame and read the response into `response`.
    ///
    /// Returns the number of response bytes filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not acknowledge or rejects the command.
    fn write_read(&mut self, address: u8, command: &[u8], response: &mut [u8]) -> Result<usize>;
}

/// A tag reader sitting behind one multiplexer channel.
///
/// The caller owns channel selection: both methods assume the reader's
/// channel is already selected on `bus`.
///
/// # Examples
///
/// ```
/// use holdfast_core::{Channel, Tag};
/// use holdfast_hardware::mock::{MockBus, MockTagReader};
/// use holdfast_hardware::traits::{I2cBus, TagReader};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> holdfast_hardware::Result<()> {
///     let (mut bus, handle) = MockBus::new();
///     let channel = Channel::new(2).unwrap();
///     handle.place(channel, Tag::new(vec![1, 2, 3, 4]).unwrap());
///
///     let mut reader = MockTagReader::new();
///     bus.write_byte(0x74, channel.select_mask())?;
///     reader.configure_initiator(&mut bus).await?;
///
///     let tag = reader.read_target(&mut bus, Duration::ZERO).await?;
///     assert_eq!(tag.unwrap().to_hex(), "01020304");
///     Ok(())
/// }
/// ```
pub trait TagReader: Send {
    /// Put the reader into initiator mode so it can poll for targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader rejects the configuration or the bus fails.
    fn configure_initiator<B: I2cBus>(
        &mut self,
        bus: &mut B,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Poll for a passive target, waiting up to `timeout` for one to appear.
    ///
    /// Returns `Ok(None)` when the field stays empty.
    ///
    /// # Errors
    ///
    /// Returns an error on a bus failure or a malformed response.
    fn read_target<B: I2cBus>(
        &mut self,
        bus: &mut B,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Tag>>> + Send;
}

/// One electromagnet output on a driver board.
pub trait Actuator: Send {
    /// Address of this output.
    fn address(&self) -> ActuatorAddress;

    /// Set the output power (0-255). Takes effect immediately when engaged.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver board does not acknowledge.
    fn set_power(&mut self, power: u8) -> Result<()>;

    /// Energize the output at the current power.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver board does not acknowledge.
    fn engage(&mut self) -> Result<()>;

    /// De-energize the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver board does not acknowledge.
    fn release(&mut self) -> Result<()>;
}

/// A digital input line.
pub trait DigitalInput: Send {
    /// Pin number this input is wired to.
    fn pin(&self) -> u8;

    /// Sample the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be read.
    fn is_high(&self) -> Result<bool>;
}
