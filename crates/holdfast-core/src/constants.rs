//! Calibration constants for the holdfast prop controller.
//!
//! These values are the defaults used when a configuration file does not
//! override them. Bus addresses match the stock breakout boards (a TCA9548A
//! multiplexer and PN532 readers); timing values come from bench calibration
//! of the prop.
//!
//! # Usage
//!
//! ```
//! use holdfast_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(MAX_CHANNELS, 8);
//! let debounce = Duration::from_millis(DEFAULT_DEBOUNCE_MS);
//! assert_eq!(debounce, Duration::from_secs(1));
//! ```

// ============================================================================
// Bus Addressing
// ============================================================================

/// Default I2C address of the channel multiplexer.
pub const DEFAULT_MUX_ADDRESS: u8 = 0x74;

/// Default I2C address of each tag reader behind the multiplexer.
///
/// Every reader answers on the same address; the multiplexer channel decides
/// which one is actually on the wire.
pub const DEFAULT_READER_ADDRESS: u8 = 0x24;

/// Number of selectable multiplexer channels.
pub const MAX_CHANNELS: u8 = 8;

// ============================================================================
// Tags
// ============================================================================

/// Minimum tag UID length in bytes (ISO 14443 single-size UID).
pub const MIN_TAG_LENGTH: usize = 4;

/// Maximum tag UID length in bytes (ISO 14443 triple-size UID).
pub const MAX_TAG_LENGTH: usize = 10;

// ============================================================================
// Actuators
// ============================================================================

/// Highest power level an actuator accepts.
pub const MAX_POWER: u8 = 255;

/// Power used for the initial pull when a part is found.
pub const DEFAULT_ENGAGE_POWER: u8 = 255;

/// Power held once the initial pull is over.
pub const DEFAULT_HOLD_POWER: u8 = 160;

/// Duration of the initial high-power pull in milliseconds.
pub const DEFAULT_BOOST_MS: u64 = 500;

/// Lowest output index on a four-output driver board.
pub const MIN_ACTUATOR_INDEX: u8 = 1;

/// Highest output index on a four-output driver board.
pub const MAX_ACTUATOR_INDEX: u8 = 4;

/// Maximum number of actuators a single part may own.
pub const MAX_ACTUATORS_PER_PART: usize = 2;

// ============================================================================
// Timing
// ============================================================================

/// Orchestrator polling cadence in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 50;

/// Minimum time between re-checks of a classified channel, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Reader timeout for the round-robin scanner, in milliseconds.
///
/// Round-robin scanning cannot afford to wait on an empty field, so the read
/// returns immediately.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 0;

/// Reader timeout used by a standalone single-channel scanner, in milliseconds.
pub const STANDALONE_READ_TIMEOUT_MS: u64 = 500;

/// Delay between "all parts found" and the start of the release sequence.
pub const DEFAULT_SETTLE_MS: u64 = 2_000;

/// Longest time the actuators may stay energized while waiting for parts.
///
/// Two hours.
pub const DEFAULT_SAFETY_TIMEOUT_MS: u64 = 2 * 60 * 60 * 1_000;

/// Time spent unlocked before the prop re-arms itself.
///
/// Five minutes.
pub const DEFAULT_AUTO_RESTART_MS: u64 = 5 * 60 * 1_000;

/// Lower bound of the randomized per-part release delay, in milliseconds.
pub const DEFAULT_RELEASE_MIN_MS: u64 = 1_000;

/// Upper bound of the randomized per-part release delay, in milliseconds.
pub const DEFAULT_RELEASE_MAX_MS: u64 = 5_000;

// ============================================================================
// Retry
// ============================================================================

/// Attempts made to wake a reader or configure it as an initiator.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 100;

/// Pause between wake / configuration attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Attempts made to select a multiplexer channel before a scan.
pub const DEFAULT_SELECT_ATTEMPTS: u32 = 3;
