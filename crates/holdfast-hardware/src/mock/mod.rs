//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware.

pub mod actuator;
pub mod bus;
pub mod input;
pub mod reader;

// Re-export commonly used types
pub use actuator::{ActuatorCommand, MockActuator, MockActuatorHandle};
pub use bus::{BusOp, MockBus, MockBusHandle, Transaction};
pub use input::{MockInput, MockInputHandle};
pub use reader::{ConcurrencyProbe, MockTagReader, ProbeGuard};
