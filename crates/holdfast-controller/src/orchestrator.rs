//! Top-level prop state machine.
//!
//! The orchestrator owns the bus arbiter, every part and both timers, and
//! cycles the prop through a lock / find / release loop:
//!
//! - `Reset` → `Locked`: every part goes idle, every sensor is brought up
//!   again, the lock controller is told to lock and the safety timer starts.
//! - `Locked` → `AllFound`: every active part is present.
//! - `Locked` → `Releasing`: the safety timer ran out, or a manual `unlock`.
//! - `AllFound` → `Releasing`: the settle delay elapsed.
//! - `Releasing` → `Unlocked` / `Paused`: every part has dropped; the lock
//!   controller is told to unlock. `Paused` is used when auto-restart is
//!   disabled.
//! - `Unlocked` / `Paused` → `Reset`: auto-restart timer, or a `reset`
//!   command from any state.
//!
//! [`Orchestrator::run`] drives the loop from a tick interval, a command
//! channel, timer messages and a shutdown future. [`Orchestrator::step`]
//! performs a single tick for deterministic tests.

use crate::error::{ControllerError, Result};
use crate::link::{Command, Notification, Outbox, PartActivity, StatusUpdate};
use crate::part::{MonitorSettings, PartEvent, PartMonitor};
use crate::source::TagSource;
use crate::timer::{OneShotTimer, TimerFired, TimerKind};
use holdfast_core::{
    PartStatus,
    config::{FailurePolicy, PartConfig, PropConfig, ReleaseDelay, ScanMode, TimingConfig},
};
use holdfast_hardware::{AnyActuator, AnyBus, BusArbiter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Maximum number of state transitions kept in history.
///
/// A full cycle is five transitions, so this covers the last twenty cycles.
pub const MAX_HISTORY_SIZE: usize = 100;

/// How long shutdown waits for the bus before giving up on deselecting it.
const SHUTDOWN_BUS_TIMEOUT: Duration = Duration::from_secs(1);

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// About to (re)arm the prop.
    Reset,

    /// Waiting for every part to be put in place.
    Locked,

    /// Every part is in place; releasing starts at `until`.
    AllFound { until: Instant },

    /// Parts are dropping one by one.
    Releasing,

    /// Open; the auto-restart timer is running.
    Unlocked,

    /// Open, waiting for a `reset` command.
    Paused,
}

impl OrchestratorState {
    /// Check if a transition to `target` is allowed from this state.
    ///
    /// ```
    /// use holdfast_controller::OrchestratorState;
    ///
    /// assert!(OrchestratorState::Reset.can_transition_to(&OrchestratorState::Locked));
    /// assert!(OrchestratorState::Unlocked.can_transition_to(&OrchestratorState::Reset));
    /// assert!(!OrchestratorState::Locked.can_transition_to(&OrchestratorState::Unlocked));
    /// ```
    pub fn can_transition_to(&self, target: &OrchestratorState) -> bool {
        use OrchestratorState::*;

        matches!(
            (self, target),
            // Reset is reachable from anywhere through the `reset` command
            (_, Reset)
            | (Reset, Locked)
            | (Locked, AllFound { .. } | Releasing)
            | (AllFound { .. }, Releasing)
            | (Releasing, Unlocked | Paused)
        )
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            OrchestratorState::Reset => "Reset",
            OrchestratorState::Locked => "Locked",
            OrchestratorState::AllFound { .. } => "AllFound",
            OrchestratorState::Releasing => "Releasing",
            OrchestratorState::Unlocked => "Unlocked",
            OrchestratorState::Paused => "Paused",
        };
        write!(f, "{}", state_str)
    }
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub at: Instant,
}

#[derive(Debug)]
struct PartSlot {
    /// Position in the configuration.
    order: usize,
    monitor: PartMonitor,
    source: TagSource,
}

#[derive(Debug)]
struct PendingPart {
    config: PartConfig,
    actuators: Vec<AnyActuator>,
    source: TagSource,
}

/// Builder for [`Orchestrator`].
///
/// Parts are registered one by one with the actuators and sensor that back
/// them; [`build`](Self::build) checks them against the configuration.
#[derive(Debug)]
pub struct OrchestratorBuilder {
    config: PropConfig,
    arbiter: Arc<BusArbiter<AnyBus>>,
    parts: Vec<PendingPart>,
    notifications: Outbox<Notification>,
    status: Outbox<StatusUpdate>,
    activity: Outbox<PartActivity>,
    rng_seed: Option<u64>,
}

impl OrchestratorBuilder {
    /// Register a part.
    pub fn part(mut self, config: PartConfig, actuators: Vec<AnyActuator>, source: TagSource) -> Self {
        self.parts.push(PendingPart {
            config,
            actuators,
            source,
        });
        self
    }

    /// Where lock / unlock commands for the lock controller go.
    pub fn notifications(mut self, notifications: Outbox<Notification>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Where part status changes go.
    pub fn status(mut self, status: Outbox<StatusUpdate>) -> Self {
        self.status = status;
        self
    }

    /// Where part events (found, wrong tag, removed, released) go.
    pub fn activity(mut self, activity: Outbox<PartActivity>) -> Self {
        self.activity = activity;
        self
    }

    /// Seed the release-delay generator, for reproducible runs.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// - `ControllerError::Config` if the configuration does not validate
    /// - `ControllerError::NoParts` if no part was registered
    /// - `ControllerError::ActuatorMismatch` if a part was given a different
    ///   number of actuators than its configuration lists
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        if self.parts.is_empty() {
            return Err(ControllerError::NoParts);
        }

        let settings = MonitorSettings::from_config(&self.config);
        let mut slots = Vec::with_capacity(self.parts.len());
        for (order, pending) in self.parts.into_iter().enumerate() {
            let PendingPart {
                config,
                actuators,
                source,
            } = pending;

            if actuators.len() != config.actuators.len() {
                return Err(ControllerError::ActuatorMismatch {
                    part: config.name,
                    given: actuators.len(),
                    configured: config.actuators.len(),
                });
            }

            let monitor = PartMonitor::new(config.name, config.tag, actuators, settings)
                .with_status(self.status.clone());
            slots.push(PartSlot {
                order,
                monitor,
                source,
            });
        }

        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        Ok(Orchestrator {
            arbiter: self.arbiter,
            slots,
            benched: Vec::new(),
            state: OrchestratorState::Reset,
            timing: self.config.timing,
            release: self.config.release,
            scan_mode: self.config.scan_mode,
            failure_policy: self.config.failure_policy,
            safety: OneShotTimer::new(TimerKind::Safety, timer_tx.clone()),
            restart: OneShotTimer::new(TimerKind::AutoRestart, timer_tx),
            timer_rx,
            notifications: self.notifications,
            activity: self.activity,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            rng,
        })
    }
}

/// The prop controller.
///
/// Dropping the orchestrator releases every actuator and stops every timer
/// and background scan.
#[derive(Debug)]
pub struct Orchestrator {
    arbiter: Arc<BusArbiter<AnyBus>>,
    slots: Vec<PartSlot>,
    /// Parts whose sensor failed to come up; retried on every reset.
    benched: Vec<PartSlot>,
    state: OrchestratorState,
    timing: TimingConfig,
    release: ReleaseDelay,
    scan_mode: ScanMode,
    failure_policy: FailurePolicy,
    safety: OneShotTimer,
    restart: OneShotTimer,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    notifications: Outbox<Notification>,
    activity: Outbox<PartActivity>,
    history: VecDeque<StateTransition>,
    rng: StdRng,
}

impl Orchestrator {
    /// Start building an orchestrator for `config` on the shared bus.
    pub fn builder(config: &PropConfig, arbiter: Arc<BusArbiter<AnyBus>>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config: config.clone(),
            arbiter,
            parts: Vec::new(),
            notifications: Outbox::disconnected(),
            status: Outbox::disconnected(),
            activity: Outbox::disconnected(),
            rng_seed: None,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Number of parts being monitored, leaving out parts whose sensor
    /// failed to come up.
    pub fn part_count(&self) -> usize {
        self.slots.len()
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|s| s.monitor.is_present()).count()
    }

    /// Name and status of every monitored part, in configuration order.
    pub fn part_statuses(&self) -> Vec<(&str, PartStatus)> {
        self.slots
            .iter()
            .map(|s| (s.monitor.name(), s.monitor.status()))
            .collect()
    }

    /// Apply pending timer messages, then perform one tick.
    pub async fn step(&mut self) -> Result<()> {
        while let Ok(fired) = self.timer_rx.try_recv() {
            self.on_timer(fired).await?;
        }
        self.tick().await
    }

    /// Run until `shutdown` resolves or an initialization error occurs.
    ///
    /// [`shutdown`](Self::shutdown) runs on every exit path. A closed command
    /// channel only stops command handling.
    pub async fn run<S>(&mut self, mut commands: mpsc::Receiver<Command>, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.timing.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut commands_open = true;
        info!(parts = self.slots.len(), tick_ms = self.timing.tick_ms, "Orchestrator running");

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                Some(fired) = self.timer_rx.recv() => {
                    if let Err(e) = self.on_timer(fired).await {
                        break Err(e);
                    }
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            break Err(e);
                        }
                    }
                    None => {
                        debug!("Command channel closed");
                        commands_open = false;
                    }
                },
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        break Err(e);
                    }
                }
            }
        };

        self.shutdown().await;
        result
    }

    /// Apply an external command.
    ///
    /// `reset` is honoured in every state. `unlock` only in `Locked` and
    /// `AllFound`; elsewhere it is logged and ignored.
    pub async fn handle_command(&mut self, command: Command) -> Result<()> {
        info!(command = %command, state = %self.state, "Command received");

        match command {
            Command::Reset => {
                for slot in &mut self.slots {
                    slot.monitor.force_idle();
                }
                self.restart.cancel();
                self.transition(OrchestratorState::Reset);
                self.reset().await
            }
            Command::Unlock => {
                match self.state {
                    OrchestratorState::Locked | OrchestratorState::AllFound { .. } => {
                        info!(
                            present = self.present_count(),
                            parts = self.slots.len(),
                            "Manual unlock"
                        );
                        self.begin_release(Instant::now());
                    }
                    state => debug!(state = %state, "Unlock ignored"),
                }
                Ok(())
            }
        }
    }

    /// De-energize everything and leave the bus deselected.
    ///
    /// Idempotent. Every timer is cancelled and every background scan
    /// stopped; the orchestrator can be reset afterwards.
    pub async fn shutdown(&mut self) {
        info!("Shutting down");

        for slot in &mut self.slots {
            slot.source.stop();
            slot.monitor.force_idle();
        }
        self.safety.cancel();
        self.restart.cancel();

        match tokio::time::timeout(SHUTDOWN_BUS_TIMEOUT, self.arbiter.lock()).await {
            Ok(mut session) => {
                if let Err(e) = session.deselect_all() {
                    warn!(error = %e, "Failed to deselect multiplexer");
                }
            }
            Err(_) => warn!("Bus still busy, multiplexer left selected"),
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let now = Instant::now();

        match self.state {
            OrchestratorState::Reset => self.reset().await?,
            OrchestratorState::Locked => {
                self.tick_parts(now);
                self.scan_parts(now).await;

                if self.present_count() == self.slots.len() {
                    info!(parts = self.slots.len(), "All parts found");
                    self.safety.cancel();
                    self.transition(OrchestratorState::AllFound {
                        until: now + self.timing.settle(),
                    });
                }
            }
            OrchestratorState::AllFound { until } => {
                self.tick_parts(now);
                if now >= until {
                    self.begin_release(now);
                }
            }
            OrchestratorState::Releasing => {
                self.tick_parts(now);
                if !self.slots.iter().any(|s| s.monitor.is_releasing()) {
                    self.finish_release();
                }
            }
            OrchestratorState::Unlocked | OrchestratorState::Paused => self.tick_parts(now),
        }

        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.initialize_sources().await?;

        self.restart.cancel();
        self.notifications.send(Notification::Lock);
        self.safety.arm(self.timing.safety_timeout());
        self.transition(OrchestratorState::Locked);
        Ok(())
    }

    /// Bring every sensor up, benched ones included, applying the failure
    /// policy to those that do not come up.
    async fn initialize_sources(&mut self) -> Result<()> {
        let mut pending = std::mem::take(&mut self.slots);
        pending.append(&mut self.benched);
        let mut pending = pending.into_iter();

        while let Some(PartSlot {
            order,
            monitor,
            source,
        }) = pending.next()
        {
            let part = monitor.name().to_string();

            // Feeds hand their scanner back so it can be brought up inline.
            let mut source = match source.into_inline().await {
                Ok(source) => source,
                Err(e) => {
                    error!(part = %part, error = %e, "Sensor lost");
                    match self.failure_policy {
                        FailurePolicy::Abort => {
                            self.restore(pending);
                            return Err(e.into());
                        }
                        FailurePolicy::SkipPart => continue,
                    }
                }
            };

            let result = source.initialize(&self.arbiter).await;
            let slot = PartSlot {
                order,
                monitor,
                source,
            };
            match result {
                Ok(()) => {
                    info!(part = %part, source = %slot.source, "Sensor ready");
                    self.slots.push(slot);
                }
                Err(e) if !e.is_terminal() => {
                    warn!(part = %part, source = %slot.source, error = %e, "Sensor glitch during start-up, keeping part");
                    self.slots.push(slot);
                }
                Err(e) => match self.failure_policy {
                    FailurePolicy::Abort => {
                        error!(part = %part, source = %slot.source, error = %e, "Sensor failed to initialize");
                        self.slots.push(slot);
                        self.restore(pending);
                        return Err(e.into());
                    }
                    FailurePolicy::SkipPart => {
                        warn!(part = %part, source = %slot.source, error = %e, "Sensor failed to initialize, running without this part");
                        self.benched.push(slot);
                    }
                },
            }
        }
        self.slots.sort_by_key(|slot| slot.order);

        if self.slots.is_empty() {
            return Err(ControllerError::NoParts);
        }

        if self.scan_mode == ScanMode::Concurrent {
            let interval = self.timing.tick();
            self.slots = std::mem::take(&mut self.slots)
                .into_iter()
                .map(|PartSlot { order, monitor, source }| PartSlot {
                    order,
                    monitor,
                    source: source.into_feed(&self.arbiter, interval),
                })
                .collect();
            debug!(feeds = self.slots.len(), "Background scanning started");
        }

        Ok(())
    }

    /// Put back the slots an aborted initialization did not get to.
    fn restore(&mut self, pending: impl Iterator<Item = PartSlot>) {
        self.slots.extend(pending);
        self.slots.sort_by_key(|slot| slot.order);
    }

    fn tick_parts(&mut self, now: Instant) {
        for slot in &mut self.slots {
            let event = slot.monitor.tick(now);
            announce(&self.activity, slot.monitor.name(), event);
        }
    }

    async fn scan_parts(&mut self, now: Instant) {
        for slot in &mut self.slots {
            if !slot.monitor.scan_due(now) {
                continue;
            }

            let Some(scan) = slot.source.scan(&self.arbiter, slot.monitor.expected()).await else {
                continue;
            };
            let event = slot.monitor.observe(scan, now);
            if let Some(at) = slot.monitor.next_scan(now) {
                slot.source.schedule(at);
            }
            announce(&self.activity, slot.monitor.name(), event);
        }
    }

    fn begin_release(&mut self, now: Instant) {
        self.safety.cancel();

        for i in 0..self.slots.len() {
            let delay = self.release_delay(i);
            self.slots[i].monitor.release_after(delay, now);
        }
        self.transition(OrchestratorState::Releasing);
    }

    fn release_delay(&mut self, index: usize) -> Duration {
        match self.release {
            ReleaseDelay::Stagger { step_ms } => {
                Duration::from_millis(step_ms.saturating_mul(index as u64))
            }
            ReleaseDelay::Random { min_ms, max_ms } => {
                Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
            }
        }
    }

    fn finish_release(&mut self) {
        self.notifications.send(Notification::Unlock);
        self.safety.arm(self.timing.safety_timeout());

        match self.timing.auto_restart() {
            Some(after) => {
                self.restart.arm(after);
                self.transition(OrchestratorState::Unlocked);
            }
            None => self.transition(OrchestratorState::Paused),
        }
    }

    async fn on_timer(&mut self, fired: TimerFired) -> Result<()> {
        let timer = match fired.kind {
            TimerKind::Safety => &mut self.safety,
            TimerKind::AutoRestart => &mut self.restart,
        };
        if !timer.take_if_current(&fired) {
            trace!(timer = ?fired.kind, generation = fired.generation, "Stale timer message");
            return Ok(());
        }

        match (fired.kind, self.state) {
            (TimerKind::Safety, OrchestratorState::Locked) => {
                warn!(
                    present = self.present_count(),
                    parts = self.slots.len(),
                    "Safety timeout, releasing"
                );
                self.begin_release(Instant::now());
            }
            (TimerKind::AutoRestart, OrchestratorState::Unlocked | OrchestratorState::Paused) => {
                info!("Auto-restart");
                self.transition(OrchestratorState::Reset);
                self.reset().await?;
            }
            (kind, state) => debug!(timer = ?kind, state = %state, "Timer ignored"),
        }

        Ok(())
    }

    fn transition(&mut self, to: OrchestratorState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug_assert!(from.can_transition_to(&to), "invalid transition {from} -> {to}");

        info!(from = %from, to = %to, "Orchestrator state change");
        self.state = to;

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from,
            to,
            at: Instant::now(),
        });
    }
}

fn announce(activity: &Outbox<PartActivity>, part: &str, event: Option<PartEvent>) {
    if let Some(event) = event {
        trace!(part = %part, event = ?event, "Part event");
        activity.send(PartActivity {
            name: part.to_string(),
            event,
        });
    }
}
