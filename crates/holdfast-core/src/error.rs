use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("Channel {0} out of range (0-7)")]
    ChannelOutOfRange(u8),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Invalid actuator: {0}")]
    InvalidActuator(String),

    #[error("Tag {tag} is expected by both {first} and {second}")]
    DuplicateTag {
        tag: String,
        first: String,
        second: String,
    },

    #[error("Channel {channel} is used by both {first} and {second}")]
    DuplicateChannel {
        channel: u8,
        first: String,
        second: String,
    },

    #[error("Part name {0} is configured more than once")]
    DuplicateName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Command errors
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

pub type Result<T> = std::result::Result<T, Error>;
