//! Mock digital input.

use crate::{HardwareError, Result, traits::DigitalInput};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Mock digital input line, low until raised through its handle.
#[derive(Debug)]
pub struct MockInput {
    pin: u8,
    level: Arc<AtomicBool>,
    failures: Arc<AtomicU32>,
}

impl MockInput {
    pub fn new(pin: u8) -> (Self, MockInputHandle) {
        let level = Arc::new(AtomicBool::new(false));
        let failures = Arc::new(AtomicU32::new(0));
        let handle = MockInputHandle {
            pin,
            level: Arc::clone(&level),
            failures: Arc::clone(&failures),
        };
        (
            Self {
                pin,
                level,
                failures,
            },
            handle,
        )
    }
}

impl DigitalInput for MockInput {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn is_high(&self) -> Result<bool> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HardwareError::communication(format!(
                "GPIO {} read failed",
                self.pin
            )));
        }
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Handle for driving a mock input line.
#[derive(Debug, Clone)]
pub struct MockInputHandle {
    pin: u8,
    level: Arc<AtomicBool>,
    failures: Arc<AtomicU32>,
}

impl MockInputHandle {
    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn set(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }

    pub fn set_high(&self) {
        self.set(true);
    }

    pub fn set_low(&self) {
        self.set(false);
    }

    /// Fail the next `count` reads of the line.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_follows_handle() {
        let (input, handle) = MockInput::new(5);
        assert_eq!(input.pin(), 5);
        assert!(!input.is_high().unwrap());

        handle.set_high();
        assert!(input.is_high().unwrap());

        handle.set_low();
        assert!(!input.is_high().unwrap());
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let (input, handle) = MockInput::new(7);
        handle.set_high();
        handle.fail_next(2);

        assert!(input.is_high().is_err());
        assert!(input.is_high().is_err());
        assert!(input.is_high().unwrap());
    }
}
