//! Client commands and server events, as they appear on the wire.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;

/// A shot at one board cell, keyed by the shooter's claimed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrow {
    pub shooter: String,
    pub x: i64,
    pub y: i64,
}

impl Arrow {
    pub fn new(shooter: impl Into<String>, x: i64, y: i64) -> Self {
        Self {
            shooter: shooter.into(),
            x,
            y,
        }
    }
}

/// One parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line, ignored.
    Noop,
    Start { name: String },
    Shoot { x: i64, y: i64 },
}

impl Command {
    /// Parses a terminator-stripped line.
    ///
    /// The verb is case-insensitive and empty tokens are discarded, so
    /// `"  shoot   3 4 "` is a valid shot.
    pub fn parse(line: &str) -> ProtocolResult<Command> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, args)) = tokens.split_first() else {
            return Ok(Command::Noop);
        };

        match verb.to_ascii_uppercase().as_str() {
            "START" => {
                let [name] = args else {
                    return Err(ProtocolError::malformed("Bad number of arguments"));
                };
                Ok(Command::Start {
                    name: name.to_string(),
                })
            }
            "SHOOT" => {
                let [x, y] = args else {
                    return Err(ProtocolError::malformed("Bad number of arguments"));
                };
                let x = x
                    .parse()
                    .map_err(|_| ProtocolError::malformed(format!("Bad X position: {}", x)))?;
                let y = y
                    .parse()
                    .map_err(|_| ProtocolError::malformed(format!("Bad Y position: {}", y)))?;
                Ok(Command::Shoot { x, y })
            }
            _ => Err(ProtocolError::UnknownCommand(verb.to_string())),
        }
    }
}

/// Everything the world tells its participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The hostile moved.
    Walk { name: String, x: i64, y: i64 },
    /// `shooter` hit the hostile and now has `kills` kills.
    Hit {
        shooter: String,
        kills: u32,
        hostile: String,
    },
    Miss { shooter: String, kills: u32 },
    /// Someone shot without having joined.
    Cheater,
    /// Local error, only ever sent to the session that caused it.
    Error(String),
    /// Server-initiated shutdown. Never written to the wire.
    Terminate,
}

impl Event {
    /// Parses an event line as a client would receive it.
    pub fn parse(line: &str) -> Option<Event> {
        if line.is_empty() {
            return Some(Event::Terminate);
        }
        if line == "CHEATER!" {
            return Some(Event::Cheater);
        }
        if let Some(msg) = line.strip_prefix("ERROR \"") {
            return msg.strip_suffix('"').map(|m| Event::Error(m.to_string()));
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["WALK", name, x, y] => Some(Event::Walk {
                name: name.to_string(),
                x: x.parse().ok()?,
                y: y.parse().ok()?,
            }),
            ["BOOM", shooter, kills, hostile] => Some(Event::Hit {
                shooter: shooter.to_string(),
                kills: kills.parse().ok()?,
                hostile: hostile.to_string(),
            }),
            ["BOOM", shooter, kills] => Some(Event::Miss {
                shooter: shooter.to_string(),
                kills: kills.parse().ok()?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Walk { name, x, y } => write!(f, "WALK {} {} {}", name, x, y),
            Event::Hit {
                shooter,
                kills,
                hostile,
            } => write!(f, "BOOM {} {} {}", shooter, kills, hostile),
            Event::Miss { shooter, kills } => write!(f, "BOOM {} {}", shooter, kills),
            Event::Cheater => write!(f, "CHEATER!"),
            Event::Error(msg) => write!(f, "ERROR \"{}\"", msg),
            Event::Terminate => Ok(()),
        }
    }
}

impl From<&ProtocolError> for Event {
    fn from(err: &ProtocolError) -> Self {
        Event::Error(err.to_string())
    }
}
