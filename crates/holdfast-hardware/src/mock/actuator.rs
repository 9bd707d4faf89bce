//! Mock electromagnet output for testing and development.

use crate::{HardwareError, Result, traits::Actuator};
use holdfast_core::ActuatorAddress;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Command received by a mock actuator, as recorded in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Power(u8),
    Engage,
    Release,
}

#[derive(Debug, Default)]
struct ActuatorState {
    power: u8,
    engaged: bool,
    engage_failures: u32,
    history: Vec<ActuatorCommand>,
}

fn lock(state: &Mutex<ActuatorState>) -> MutexGuard<'_, ActuatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock electromagnet output.
///
/// # Examples
///
/// ```
/// use holdfast_core::ActuatorAddress;
/// use holdfast_hardware::mock::MockActuator;
/// use holdfast_hardware::traits::Actuator;
///
/// let (mut magnet, handle) = MockActuator::new(ActuatorAddress::new(0x60, 1).unwrap());
/// magnet.set_power(255).unwrap();
/// magnet.engage().unwrap();
///
/// assert!(handle.is_engaged());
/// assert_eq!(handle.power(), 255);
/// ```
#[derive(Debug)]
pub struct MockActuator {
    address: ActuatorAddress,
    state: Arc<Mutex<ActuatorState>>,
}

impl MockActuator {
    /// Create a mock output and its control handle.
    pub fn new(address: ActuatorAddress) -> (Self, MockActuatorHandle) {
        let state = Arc::new(Mutex::new(ActuatorState::default()));
        let handle = MockActuatorHandle {
            address,
            state: Arc::clone(&state),
        };
        (Self { address, state }, handle)
    }
}

impl Actuator for MockActuator {
    fn address(&self) -> ActuatorAddress {
        self.address
    }

    fn set_power(&mut self, power: u8) -> Result<()> {
        let mut state = lock(&self.state);
        state.power = power;
        state.history.push(ActuatorCommand::Power(power));
        Ok(())
    }

    fn engage(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.engage_failures > 0 {
            state.engage_failures -= 1;
            return Err(HardwareError::communication(format!(
                "Driver board 0x{:02X} did not acknowledge",
                self.address.controller
            )));
        }
        state.engaged = true;
        state.history.push(ActuatorCommand::Engage);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.engaged = false;
        state.history.push(ActuatorCommand::Release);
        Ok(())
    }
}

/// Handle for observing and steering a mock actuator.
#[derive(Debug, Clone)]
pub struct MockActuatorHandle {
    address: ActuatorAddress,
    state: Arc<Mutex<ActuatorState>>,
}

impl MockActuatorHandle {
    pub fn address(&self) -> ActuatorAddress {
        self.address
    }

    pub fn is_engaged(&self) -> bool {
        lock(&self.state).engaged
    }

    pub fn power(&self) -> u8 {
        lock(&self.state).power
    }

    /// Every command received so far, in order.
    pub fn history(&self) -> Vec<ActuatorCommand> {
        lock(&self.state).history.clone()
    }

    /// Make the next `count` engage commands fail.
    pub fn fail_next_engage(&self, count: u32) {
        lock(&self.state).engage_failures = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actuator() -> (MockActuator, MockActuatorHandle) {
        MockActuator::new(ActuatorAddress::new(0x60, 2).unwrap())
    }

    #[test]
    fn test_history_is_recorded() {
        let (mut magnet, handle) = actuator();
        magnet.set_power(255).unwrap();
        magnet.engage().unwrap();
        magnet.set_power(160).unwrap();
        magnet.release().unwrap();

        assert_eq!(
            handle.history(),
            vec![
                ActuatorCommand::Power(255),
                ActuatorCommand::Engage,
                ActuatorCommand::Power(160),
                ActuatorCommand::Release,
            ]
        );
        assert!(!handle.is_engaged());
    }

    #[test]
    fn test_engage_failure_is_injected_once() {
        let (mut magnet, handle) = actuator();
        handle.fail_next_engage(1);

        assert!(magnet.engage().is_err());
        assert!(!handle.is_engaged());
        assert!(magnet.engage().is_ok());
        assert!(handle.is_engaged());
    }
}
