//! Common helpers for controller integration tests.
//!
//! Builds small prop configurations on mock hardware and drives the
//! orchestrator tick by tick under tokio's paused clock.

#![allow(dead_code)]

use holdfast_controller::rig::{MockRig, mock_rig};
use holdfast_controller::{Notification, Orchestrator, OrchestratorState, PartActivity, outbox};
use holdfast_core::config::{PartConfig, PropConfig, ReleaseDelay, Sensor};
use holdfast_core::{ActuatorAddress, Channel, Tag};
use std::time::Duration;
use tokio::sync::mpsc;

/// Tick cadence used by every test configuration.
pub const TICK: Duration = Duration::from_millis(50);

/// Expected tag of the part on channel `n`.
pub fn tag(n: u8) -> Tag {
    Tag::new(vec![0xA0 | n, 0x4B, 0x7E, 0xF2]).unwrap()
}

/// A tag no part expects.
pub fn stranger() -> Tag {
    Tag::from_hex("DE:AD:BE:EF").unwrap()
}

/// Part sensed on channel `n`, held by output `n + 1` of driver board 0x60.
pub fn channel_part(name: &str, n: u8) -> PartConfig {
    PartConfig {
        name: name.to_string(),
        tag: tag(n),
        sensor: Sensor::Channel(Channel::new(n).unwrap()),
        actuators: vec![ActuatorAddress::new(0x60, n + 1).unwrap()],
    }
}

/// Part sensed by input `pin`, held by two outputs of driver board 0x61.
pub fn gpio_part(name: &str, pin: u8) -> PartConfig {
    PartConfig {
        name: name.to_string(),
        tag: tag(0xF),
        sensor: Sensor::Gpio(pin),
        actuators: vec![
            ActuatorAddress::new(0x61, 1).unwrap(),
            ActuatorAddress::new(0x61, 2).unwrap(),
        ],
    }
}

/// Three channel-sensed parts, `a`, `b` and `c`, released 100 ms apart.
pub fn abc() -> PropConfig {
    let mut config = PropConfig {
        parts: vec![
            channel_part("a", 0),
            channel_part("b", 1),
            channel_part("c", 2),
        ],
        release: ReleaseDelay::Stagger { step_ms: 100 },
        ..PropConfig::default()
    };
    config.timing.tick_ms = TICK.as_millis() as u64;
    config.retry.attempts = 3;
    config
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub rig: MockRig,
    pub notifications: mpsc::Receiver<Notification>,
    pub activities: mpsc::Receiver<PartActivity>,
}

impl Harness {
    /// Build the prop without running any tick.
    pub fn build(config: &PropConfig) -> Self {
        let (notify, notifications) = outbox(16);
        let (activity, activities) = outbox(64);
        let (builder, rig) = mock_rig(config).unwrap();
        let orchestrator = builder
            .notifications(notify)
            .activity(activity)
            .rng_seed(42)
            .build()
            .unwrap();

        Self {
            orchestrator,
            rig,
            notifications,
            activities,
        }
    }

    /// Build the prop and run the first tick, which arms it.
    pub async fn armed(config: &PropConfig) -> Self {
        let mut harness = Self::build(config);
        harness.orchestrator.step().await.unwrap();
        assert_eq!(harness.orchestrator.state(), OrchestratorState::Locked);
        harness
    }

    /// Let `elapsed` pass, then run one tick.
    pub async fn step_after(&mut self, elapsed: Duration) {
        tokio::time::sleep(elapsed).await;
        self.orchestrator.step().await.unwrap();
    }

    /// Tick every [`TICK`] until `done` holds, for at most `max_ticks` ticks.
    pub async fn step_until(
        &mut self,
        max_ticks: usize,
        done: impl Fn(OrchestratorState) -> bool,
    ) -> OrchestratorState {
        for _ in 0..max_ticks {
            self.step_after(TICK).await;
            if done(self.orchestrator.state()) {
                break;
            }
        }
        self.orchestrator.state()
    }

    pub fn place(&self, part: &str) {
        self.rig.part(part).unwrap().place_expected();
    }

    /// Every notification sent so far.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.notifications.try_recv().ok()).collect()
    }

    /// Every part event sent so far.
    pub fn drain_activity(&mut self) -> Vec<PartActivity> {
        std::iter::from_fn(|| self.activities.try_recv().ok()).collect()
    }
}

pub fn is_all_found(state: OrchestratorState) -> bool {
    matches!(state, OrchestratorState::AllFound { .. })
}
