//! Operator console line parsing.

use anyhow::{Context, Result, bail};
use holdfast_controller::Command;
use holdfast_core::Tag;

/// One line typed into the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Forwarded to the orchestrator.
    Command(Command),
    /// Put the part's own tag in place.
    Place(String),
    /// Put some other tag in place of the part.
    Wrong(String, Tag),
    /// Take the part's tag away.
    Remove(String),
    Status,
    Quit,
    Help,
}

pub const HELP: &str = "\
commands:
  reset | unlock          send a command to the controller
  place <part>            put the right tag on a part
  wrong <part> <hex>      put another tag on a part
  remove <part>           take a part's tag away
  status                  show part statuses
  quit                    shut down";

pub fn parse(line: &str) -> Result<Option<ConsoleInput>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "place" => ConsoleInput::Place(part_name(words.next())?),
        "remove" => ConsoleInput::Remove(part_name(words.next())?),
        "wrong" => {
            let part = part_name(words.next())?;
            let Some(hex) = words.next() else {
                bail!("usage: wrong <part> <hex>");
            };
            let tag = Tag::from_hex(hex).with_context(|| format!("bad tag '{hex}'"))?;
            ConsoleInput::Wrong(part, tag)
        }
        "status" => ConsoleInput::Status,
        "quit" | "exit" => ConsoleInput::Quit,
        "help" | "?" => ConsoleInput::Help,
        other => ConsoleInput::Command(other.parse()?),
    };

    if words.next().is_some() {
        bail!("unexpected arguments after '{verb}'");
    }
    Ok(Some(input))
}

fn part_name(word: Option<&str>) -> Result<String> {
    word.map(str::to_string).context("missing part name")
}
