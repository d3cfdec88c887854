use std::fmt;
use std::io;
use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Board axis, used to tell which coordinate of a shot was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    fn complaint(self) -> &'static str {
        match self {
            Axis::X => "You broke the anti balistic missile treaty",
            Axis::Y => "Intercontinental missiles are banned",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// Everything that can go wrong between a peer's bytes and the world.
///
/// The first group is recoverable: the session reports it to its own peer
/// as an `ERROR "<message>"` line and keeps going. The second group is
/// fatal to the session, which leaves the world and closes the socket
/// without writing anything.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Cannot add the client: User with this nick is already registered")]
    DuplicateName(String),

    #[error("{}", .axis.complaint())]
    OutOfBounds { axis: Axis, value: i64 },

    #[error("{0}")]
    MalformedCommand(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Already joined as {0}")]
    AlreadyJoined(String),

    #[error("no line terminator within {capacity} bytes")]
    FramingOverflow { capacity: usize },

    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("write timed out")]
    WriteTimeout,
}

impl ProtocolError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ProtocolError::MalformedCommand(msg.into())
    }

    /// True when the session must be torn down rather than answered.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::FramingOverflow { .. }
                | ProtocolError::Transport(_)
                | ProtocolError::WriteTimeout
        )
    }
}
