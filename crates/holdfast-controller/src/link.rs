//! Typed messages exchanged with the prop's outside collaborators.
//!
//! The lock controller, the sound board and the dashboard are not part of
//! this crate. They are reached through fire-and-forget channels: a slow or
//! missing collaborator must never stall the poll loop, so every outgoing
//! message goes through an [`Outbox`], which drops rather than waits.

use crate::part::PartEvent;
use chrono::{DateTime, Utc};
use holdfast_core::{Error, PartStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Command received from the game master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// De-energize everything and start a new locked cycle.
    Reset,

    /// Release the parts now, whatever has been found.
    Unlock,
}

impl FromStr for Command {
    type Err = Error;

    /// Parse a command name, ignoring case and surrounding whitespace.
    ///
    /// ```
    /// use holdfast_controller::Command;
    ///
    /// assert_eq!("reset".parse::<Command>().unwrap(), Command::Reset);
    /// assert_eq!(" UNLOCK\n".parse::<Command>().unwrap(), Command::Unlock);
    /// assert!("open".parse::<Command>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(Command::Reset),
            "unlock" => Ok(Command::Unlock),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reset => write!(f, "reset"),
            Command::Unlock => write!(f, "unlock"),
        }
    }
}

/// Command sent to the external lock controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    Lock,
    Unlock,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Lock => write!(f, "lock"),
            Notification::Unlock => write!(f, "unlock"),
        }
    }
}

/// Part status change for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub name: String,
    pub status: PartStatus,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Status update stamped with the current wall-clock time.
    pub fn now(name: impl Into<String>, status: PartStatus) -> Self {
        Self {
            name: name.into(),
            status,
            at: Utc::now(),
        }
    }
}

/// Something that just happened to a part, for the sound board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartActivity {
    pub name: String,
    pub event: PartEvent,
}

/// Non-blocking, lossy sender.
///
/// A default outbox has no receiver and silently discards everything.
#[derive(Debug)]
pub struct Outbox<T> {
    tx: Option<mpsc::Sender<T>>,
}

impl<T> Outbox<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Outbox with nobody listening.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Queue `message` if there is room. Returns whether it was queued.
    pub fn send(&self, message: T) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("Outbox full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// Create a bounded outbox and the receiver that drains it.
pub fn outbox<T>(capacity: usize) -> (Outbox<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Outbox::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("reset", Command::Reset)]
    #[case("Reset", Command::Reset)]
    #[case("unlock", Command::Unlock)]
    #[case("  unlock  ", Command::Unlock)]
    fn test_command_parsing(#[case] input: &str, #[case] expected: Command) {
        assert_eq!(input.parse::<Command>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert_eq!(
            "drop".parse::<Command>(),
            Err(Error::UnknownCommand("drop".to_string()))
        );
    }

    #[test]
    fn test_notification_wire_format() {
        assert_eq!(Notification::Lock.to_string(), "lock");
        assert_eq!(Notification::Unlock.to_string(), "unlock");
        assert_eq!(serde_json::to_string(&Notification::Unlock).unwrap(), "\"unlock\"");
    }

    #[test]
    fn test_status_update_serializes() {
        let update = StatusUpdate::now("head", PartStatus::Present);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["name"], "head");
        assert_eq!(json["status"], "present");
    }

    #[tokio::test]
    async fn test_outbox_drops_when_full() {
        let (outbox, mut rx) = outbox(1);
        assert!(outbox.send(Notification::Lock));
        assert!(!outbox.send(Notification::Unlock));

        assert_eq!(rx.recv().await, Some(Notification::Lock));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_outbox_survives_closed_receiver() {
        let (outbox, rx) = outbox::<Notification>(4);
        drop(rx);
        assert!(!outbox.send(Notification::Lock));
    }

    #[test]
    fn test_disconnected_outbox_discards() {
        let outbox = Outbox::<Notification>::default();
        assert!(!outbox.send(Notification::Lock));
    }
}
