//! Error types for hardware operations.
//!
//! Bus and device failures are split into transient ones (a NACK or a
//! garbled frame) that the scanner folds into "no data this cycle", and
//! terminal ones that leave a sensor unusable until it is brought up again.

use holdfast_core::Channel;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Bus transaction was not acknowledged or was cut short.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Reader never answered the wake-up probe.
    #[error("Reader on channel {channel} unreachable after {attempts} attempts: {message}")]
    DeviceUnreachable {
        channel: Channel,
        attempts: u32,
        message: String,
    },

    /// Reader answered but could not be configured as an initiator.
    #[error("Reader on channel {channel} failed to initialize after {attempts} attempts: {message}")]
    InitializationFailed {
        channel: Channel,
        attempts: u32,
        message: String,
    },

    /// Scanner used before `initialize` succeeded.
    #[error("Reader on channel {channel} is not initialized")]
    NotInitialized { channel: Channel },
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new unreachable-reader error.
    pub fn unreachable(channel: Channel, attempts: u32, message: impl Into<String>) -> Self {
        Self::DeviceUnreachable {
            channel,
            attempts,
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(
        channel: Channel,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::InitializationFailed {
            channel,
            attempts,
            message: message.into(),
        }
    }

    /// True for errors that leave the sensor unusable until it is brought
    /// up again. Anything else is a glitch the next read may not repeat.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::DeviceUnreachable { .. }
                | Self::InitializationFailed { .. }
                | Self::NotInitialized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("mux");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Device disconnected: mux");
        assert!(error.is_terminal());
    }

    #[test]
    fn test_communication_error() {
        let error = HardwareError::communication("NACK from 0x24");
        assert!(matches!(error, HardwareError::CommunicationError { .. }));
        assert_eq!(error.to_string(), "Communication error: NACK from 0x24");
        assert!(!error.is_terminal());
    }

    #[test]
    fn test_unreachable_error() {
        let error = HardwareError::unreachable(channel(3), 100, "NACK from 0x24");
        assert_eq!(
            error.to_string(),
            "Reader on channel 3 unreachable after 100 attempts: NACK from 0x24"
        );
        assert!(error.is_terminal());
    }

    #[test]
    fn test_initialization_failed_error() {
        let error = HardwareError::initialization_failed(channel(1), 100, "SAM config rejected");
        assert!(matches!(
            error,
            HardwareError::InitializationFailed { attempts: 100, .. }
        ));
        assert!(error.is_terminal());
    }
}
