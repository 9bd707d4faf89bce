//! Prop emulator on mock hardware.
//!
//! The orchestrator runs on the main task. An operator console task reads
//! stdin lines, moves tags around on the simulated readers and forwards
//! `reset` / `unlock` to the orchestrator; it also reports what the lock
//! controller, the sound board and the dashboard would have received.

use crate::console::{self, ConsoleInput};
use anyhow::{Context, Result};
use holdfast_controller::rig::{MockRig, PartHandles, mock_rig};
use holdfast_controller::{Command, Notification, PartActivity, PartEvent, StatusUpdate, outbox};
use holdfast_core::{PartStatus, config::PropConfig};
use std::collections::BTreeMap;
use std::io::BufRead;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

pub async fn run(config: PropConfig) -> Result<()> {
    let (notify, notifications) = outbox(32);
    let (status, statuses) = outbox(64);
    let (activity, activities) = outbox(64);
    let (builder, rig) = mock_rig(&config).context("failed to wire mock hardware")?;
    let mut orchestrator = builder
        .notifications(notify)
        .status(status)
        .activity(activity)
        .build()
        .context("failed to build orchestrator")?;

    let (commands, command_rx) = mpsc::channel(8);
    let (quit, quit_rx) = oneshot::channel();

    let console = Console {
        rig,
        commands,
        board: config
            .parts
            .iter()
            .map(|p| (p.name.clone(), PartStatus::Missing))
            .collect(),
    };
    let console_task = tokio::spawn(console.run(
        stdin_lines(),
        Reports {
            notifications,
            statuses,
            activities,
        },
        quit,
    ));

    println!("{}", console::HELP);

    let shutdown = async {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Ctrl-C handler failed");
                }
            }
            _ = quit_rx => {}
        }
    };
    let result = orchestrator.run(command_rx, shutdown).await;

    console_task.abort();
    result.context("controller stopped")
}

/// Lines from stdin, read on a dedicated thread so a pending read never
/// holds up runtime shutdown.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// What the orchestrator sends to its collaborators.
struct Reports {
    notifications: mpsc::Receiver<Notification>,
    statuses: mpsc::Receiver<StatusUpdate>,
    activities: mpsc::Receiver<PartActivity>,
}

/// Sound board cue for a part event.
fn cue(event: &PartEvent) -> &'static str {
    match event {
        PartEvent::Found => "found",
        PartEvent::WrongTag(_) => "wrong",
        PartEvent::Removed => "removed",
        PartEvent::Released => "released",
    }
}

struct Console {
    rig: MockRig,
    commands: mpsc::Sender<Command>,
    board: BTreeMap<String, PartStatus>,
}

impl Console {
    async fn run(
        mut self,
        mut lines: mpsc::Receiver<String>,
        mut reports: Reports,
        quit: oneshot::Sender<()>,
    ) {
        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    match console::parse(&line) {
                        Ok(Some(ConsoleInput::Quit)) => break,
                        Ok(Some(input)) => self.apply(input).await,
                        Ok(None) => {}
                        Err(e) => println!("{e:#}"),
                    }
                }
                Some(notification) = reports.notifications.recv() => {
                    info!(command = %notification, "Lock controller notified");
                }
                Some(activity) = reports.activities.recv() => {
                    info!(part = %activity.name, cue = cue(&activity.event), "Sound cue");
                }
                Some(update) = reports.statuses.recv() => {
                    info!(part = %update.name, status = %update.status, "Part status");
                    self.board.insert(update.name, update.status);
                }
            }
        }

        // End of input behaves like `quit`.
        let _ = quit.send(());
    }

    async fn apply(&mut self, input: ConsoleInput) {
        match input {
            ConsoleInput::Command(command) => {
                if self.commands.send(command).await.is_err() {
                    warn!("Controller no longer accepts commands");
                }
            }
            ConsoleInput::Place(name) => {
                if let Some(part) = self.part(&name) {
                    part.place_expected();
                }
            }
            ConsoleInput::Wrong(name, tag) => {
                if let Some(part) = self.part(&name) {
                    part.place(tag);
                }
            }
            ConsoleInput::Remove(name) => {
                if let Some(part) = self.part(&name) {
                    part.remove();
                }
            }
            ConsoleInput::Status => {
                for (name, status) in &self.board {
                    let held = self.rig.part(name).is_some_and(PartHandles::is_held);
                    let status = status.to_string();
                    println!("{name:<12} {status:<10} {}", if held { "held" } else { "-" });
                }
            }
            ConsoleInput::Help => println!("{}", console::HELP),
            ConsoleInput::Quit => {}
        }
    }

    fn part(&self, name: &str) -> Option<&PartHandles> {
        let part = self.rig.part(name);
        if part.is_none() {
            println!("no part named '{name}'");
        }
        part
    }
}
