//! Hardware layer for the holdfast prop controller.
//!
//! The prop hangs up to eight identical tag readers off one I2C bus through a
//! channel multiplexer, and holds each movable part with one or two
//! electromagnets. This crate owns everything that touches that hardware:
//!
//! - [`traits`]: device contracts ([`I2cBus`], [`TagReader`], [`Actuator`],
//!   [`DigitalInput`])
//! - [`devices`]: enum wrappers giving each device family one concrete type
//! - [`mock`]: simulated devices with control handles, for tests and the emulator
//! - [`arbiter`]: exclusive, RAII-scoped access to the shared bus
//! - [`scanner`]: per-channel wake / configure / read logic
//! - [`feed`]: background scanning published through a `watch` channel
//! - [`retry`]: bounded retry used while bringing readers up
//!
//! # Example
//!
//! ```
//! use holdfast_core::{Channel, Tag};
//! use holdfast_hardware::{BusArbiter, ChannelScanner, ScannerSettings};
//! use holdfast_hardware::mock::{MockBus, MockTagReader};
//!
//! # #[tokio::main] async fn main() -> holdfast_hardware::Result<()> {
//! let (bus, handle) = MockBus::new();
//! let arbiter = BusArbiter::new(bus, 0x74);
//!
//! let channel = Channel::new(3).unwrap();
//! let mut scanner = ChannelScanner::new(channel, MockTagReader::new(), ScannerSettings::default());
//! scanner.initialize(&arbiter).await?;
//!
//! handle.place(channel, Tag::from_hex("A74B7EF2").unwrap());
//! assert!(scanner.get_tag(&arbiter).await.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Operations return [`Result<T>`][error::Result] with [`HardwareError`].
//! Errors raised while bringing a reader up are terminal for that reader;
//! errors while scanning never leave [`ChannelScanner::get_tag`].

pub mod arbiter;
pub mod devices;
pub mod error;
pub mod feed;
pub mod mock;
pub mod retry;
pub mod scanner;
pub mod traits;

// Re-export commonly used types for convenience
pub use arbiter::{BusArbiter, BusSession};
pub use devices::{AnyActuator, AnyBus, AnyInput, AnyTagReader};
pub use error::{HardwareError, Result};
pub use feed::ScanFeed;
pub use retry::{RetryExhausted, RetryPolicy};
pub use scanner::{ChannelScanner, ScannerSettings};
pub use traits::{Actuator, DigitalInput, I2cBus, TagReader};
