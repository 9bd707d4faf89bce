//! Prop control logic for holdfast.
//!
//! This crate turns tag readings into actuator commands and drives the prop
//! through its lock / find / release cycle:
//!
//! - [`part`]: per-part detection state machine owning the part's actuators
//! - [`orchestrator`]: top-level state machine, poll loop and shutdown
//! - [`source`]: the sensor behind a part (inline scanner, background feed or
//!   input line)
//! - [`timer`]: one-shot safety and auto-restart timers
//! - [`link`]: messages exchanged with the lock controller, sound board and
//!   dashboard
//! - [`rig`]: mock hardware wired from a configuration

pub mod error;
pub mod link;
pub mod orchestrator;
pub mod part;
pub mod rig;
pub mod source;
pub mod timer;

pub use error::{ControllerError, Result};
pub use link::{Command, Notification, Outbox, PartActivity, StatusUpdate, outbox};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorState, StateTransition};
pub use part::{DetectionState, MonitorSettings, PartEvent, PartMonitor};
pub use source::TagSource;
