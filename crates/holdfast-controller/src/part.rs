//! Per-part detection state machine.
//!
//! A [`PartMonitor`] turns the stream of scan results for one part into
//! actuator commands. Its actuators are energized exactly while it is in
//! the [`DetectionState::Matched`] state; every other state, and every
//! failure path, leaves them released.
//!
//! # Transitions
//!
//! | From       | Scan     | Effect                    | To         |
//! |------------|----------|---------------------------|------------|
//! | Idle       | Matching | engage, `Found`           | Matched    |
//! | Idle       | Wrong    | `WrongTag`                | Mismatched |
//! | Matched    | Absent   | release, `Removed`        | Idle       |
//! | Matched    | Wrong    | release, `WrongTag`       | Mismatched |
//! | Mismatched | Absent   | none                      | Idle       |
//! | Mismatched | Matching | engage, `Found`           | Matched    |
//!
//! Any other combination leaves the state unchanged. `Releasing` ignores
//! scans entirely until its delay runs out.
//!
//! # Examples
//!
//! ```
//! use holdfast_controller::part::{MonitorSettings, PartEvent, PartMonitor};
//! use holdfast_core::{ActuatorAddress, ScanResult, Tag};
//! use holdfast_hardware::mock::MockActuator;
//! use tokio::time::Instant;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)] async fn main() {
//! let (magnet, handle) = MockActuator::new(ActuatorAddress::new(0x60, 1).unwrap());
//! let tag = Tag::new(vec![1, 2, 3, 4]).unwrap();
//! let mut monitor = PartMonitor::new("head", tag, vec![magnet], MonitorSettings::default());
//!
//! let event = monitor.observe(ScanResult::Matching, Instant::now());
//! assert_eq!(event, Some(PartEvent::Found));
//! assert!(monitor.is_present());
//! assert!(handle.is_engaged());
//!
//! drop(monitor);
//! assert!(!handle.is_engaged());
//! # }
//! ```

use crate::link::{Outbox, StatusUpdate};
use holdfast_core::{
    PartStatus, ScanResult, Tag,
    config::{PowerProfile, PropConfig},
};
use holdfast_hardware::{AnyActuator, HardwareError, traits::Actuator};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a part stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    /// Nothing in place; actuators off.
    Idle,

    /// Right tag in place; actuators on. While `boost_until` is set they run
    /// at engage power.
    Matched { boost_until: Option<Instant> },

    /// Some other tag in place; actuators off.
    Mismatched,

    /// Was matched, drops at `until`; actuators still on.
    Releasing { until: Instant },
}

impl DetectionState {
    pub fn status(&self) -> PartStatus {
        match self {
            DetectionState::Idle => PartStatus::Missing,
            DetectionState::Matched { .. } => PartStatus::Present,
            DetectionState::Mismatched => PartStatus::WrongTag,
            DetectionState::Releasing { .. } => PartStatus::Releasing,
        }
    }
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            DetectionState::Idle => "Idle",
            DetectionState::Matched { .. } => "Matched",
            DetectionState::Mismatched => "Mismatched",
            DetectionState::Releasing { .. } => "Releasing",
        };
        write!(f, "{}", state_str)
    }
}

/// Side effect worth announcing (sound cue, log line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartEvent {
    Found,
    WrongTag(Tag),
    Removed,
    Released,
}

/// Timing and power shared by every monitor of a prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Minimum time between re-checks of a matched or mismatched part.
    pub debounce: Duration,
    pub power: PowerProfile,
}

impl MonitorSettings {
    pub fn from_config(config: &PropConfig) -> Self {
        Self {
            debounce: config.timing.debounce(),
            power: config.power,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&PropConfig::default())
    }
}

/// Detection state machine for one part and owner of its actuators.
///
/// Dropping the monitor releases every actuator it owns.
#[derive(Debug)]
pub struct PartMonitor<A: Actuator = AnyActuator> {
    name: String,
    expected: Tag,
    actuators: Vec<A>,
    state: DetectionState,
    last_check: Option<Instant>,
    settings: MonitorSettings,
    status: Outbox<StatusUpdate>,
}

impl<A: Actuator> PartMonitor<A> {
    pub fn new(
        name: impl Into<String>,
        expected: Tag,
        actuators: Vec<A>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            name: name.into(),
            expected,
            actuators,
            state: DetectionState::Idle,
            last_check: None,
            settings,
            status: Outbox::disconnected(),
        }
    }

    /// Publish status changes on `status`.
    pub fn with_status(mut self, status: Outbox<StatusUpdate>) -> Self {
        self.status = status;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected(&self) -> &Tag {
        &self.expected
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn status(&self) -> PartStatus {
        self.state.status()
    }

    /// True while the part is held.
    pub fn is_present(&self) -> bool {
        matches!(self.state, DetectionState::Matched { .. })
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self.state, DetectionState::Releasing { .. })
    }

    /// Whether the part's sensor should be read at `now`.
    ///
    /// Unconfirmed parts are checked every time; matched and mismatched
    /// parts at most once per debounce interval.
    pub fn scan_due(&self, now: Instant) -> bool {
        match self.state {
            DetectionState::Idle => true,
            DetectionState::Releasing { .. } => false,
            DetectionState::Matched { .. } | DetectionState::Mismatched => self
                .last_check
                .is_none_or(|last| now.saturating_duration_since(last) >= self.settings.debounce),
        }
    }

    /// Earliest instant at which [`scan_due`](Self::scan_due) holds, `None`
    /// while releasing.
    pub fn next_scan(&self, now: Instant) -> Option<Instant> {
        match self.state {
            DetectionState::Idle => Some(now),
            DetectionState::Releasing { .. } => None,
            DetectionState::Matched { .. } | DetectionState::Mismatched => Some(
                self.last_check
                    .map_or(now, |last| last + self.settings.debounce),
            ),
        }
    }

    /// Feed one scan result into the state machine.
    pub fn observe(&mut self, scan: ScanResult, now: Instant) -> Option<PartEvent> {
        if self.is_releasing() {
            return None;
        }
        self.last_check = Some(now);

        match (self.state, scan) {
            (DetectionState::Idle | DetectionState::Mismatched, ScanResult::Matching) => {
                match self.engage(now) {
                    Ok(boost_until) => {
                        info!(part = %self.name, "Part found");
                        self.enter(DetectionState::Matched { boost_until });
                        Some(PartEvent::Found)
                    }
                    Err(e) => {
                        error!(part = %self.name, error = %e, "Engage failed, part left released");
                        self.publish();
                        None
                    }
                }
            }
            (DetectionState::Idle, ScanResult::Wrong(tag)) => {
                info!(part = %self.name, tag = %tag, "Wrong tag in place");
                self.enter(DetectionState::Mismatched);
                Some(PartEvent::WrongTag(tag))
            }
            (DetectionState::Matched { .. }, ScanResult::Absent) => {
                self.release_all();
                info!(part = %self.name, "Part removed");
                self.enter(DetectionState::Idle);
                Some(PartEvent::Removed)
            }
            (DetectionState::Matched { .. }, ScanResult::Wrong(tag)) => {
                self.release_all();
                info!(part = %self.name, tag = %tag, "Part swapped for wrong tag");
                self.enter(DetectionState::Mismatched);
                Some(PartEvent::WrongTag(tag))
            }
            (DetectionState::Mismatched, ScanResult::Absent) => {
                debug!(part = %self.name, "Wrong tag taken away");
                self.enter(DetectionState::Idle);
                None
            }
            (DetectionState::Idle, ScanResult::Absent)
            | (DetectionState::Matched { .. }, ScanResult::Matching)
            | (DetectionState::Mismatched, ScanResult::Wrong(_))
            | (DetectionState::Releasing { .. }, _) => None,
        }
    }

    /// Advance time-driven transitions: the end of the boost phase and the
    /// end of a release delay.
    pub fn tick(&mut self, now: Instant) -> Option<PartEvent> {
        match self.state {
            DetectionState::Matched {
                boost_until: Some(until),
            } if now >= until => {
                let hold = self.settings.power.hold_power;
                for actuator in &mut self.actuators {
                    if let Err(e) = actuator.set_power(hold) {
                        warn!(part = %self.name, actuator = %actuator.address(), error = %e, "Failed to drop to hold power");
                    }
                }
                debug!(part = %self.name, power = hold, "Boost finished");
                self.state = DetectionState::Matched { boost_until: None };
                None
            }
            DetectionState::Releasing { until } if now >= until => {
                self.release_all();
                info!(part = %self.name, "Part released");
                self.enter(DetectionState::Idle);
                Some(PartEvent::Released)
            }
            _ => None,
        }
    }

    /// Schedule the part to drop after `delay`.
    ///
    /// A matched part keeps holding until then. A mismatched part simply
    /// goes idle; an idle or already releasing part is left alone.
    pub fn release_after(&mut self, delay: Duration, now: Instant) {
        match self.state {
            DetectionState::Matched { .. } => {
                debug!(part = %self.name, delay_ms = delay.as_millis() as u64, "Release scheduled");
                self.enter(DetectionState::Releasing { until: now + delay });
            }
            DetectionState::Mismatched => self.enter(DetectionState::Idle),
            DetectionState::Idle | DetectionState::Releasing { .. } => {}
        }
    }

    /// De-energize and go idle, whatever the current state.
    pub fn force_idle(&mut self) {
        self.release_all();
        self.last_check = None;
        if self.state != DetectionState::Idle {
            self.enter(DetectionState::Idle);
        }
    }

    fn engage(&mut self, now: Instant) -> Result<Option<Instant>, HardwareError> {
        let power = self.settings.power;

        let result = self.actuators.iter_mut().try_for_each(|actuator| {
            actuator.set_power(power.engage_power)?;
            actuator.engage()
        });
        if let Err(e) = result {
            self.release_all();
            return Err(e);
        }

        let boosted = power.engage_power != power.hold_power && !power.boost().is_zero();
        Ok(boosted.then(|| now + power.boost()))
    }

    fn release_all(&mut self) {
        for actuator in &mut self.actuators {
            if let Err(e) = actuator.release() {
                error!(part = %self.name, actuator = %actuator.address(), error = %e, "Failed to release actuator");
            }
        }
    }

    fn enter(&mut self, state: DetectionState) {
        if self.state != state {
            debug!(part = %self.name, from = %self.state, to = %state, "Part state change");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status
            .send(StatusUpdate::now(self.name.clone(), self.state.status()));
    }
}

impl<A: Actuator> Drop for PartMonitor<A> {
    fn drop(&mut self) {
        self.release_all();
    }
}
