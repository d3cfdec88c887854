//! Protocol vocabulary shared between the arena server and its clients.
//!
//! The wire format is plain text: every command and every event is one
//! line, terminated by the deployment's [`LineTerminator`]. This crate
//! holds everything both ends need to agree on:
//!
//! - board, tick and buffer defaults
//! - line framing ([`LineDecoder`])
//! - the client command grammar ([`Command`])
//! - the server event vocabulary ([`Event`])
//! - the error taxonomy ([`ProtocolError`])

pub mod error;
pub mod framing;
pub mod protocol;

pub use error::{Axis, ProtocolError, ProtocolResult};
pub use framing::{LineDecoder, LineTerminator};
pub use protocol::{Arrow, Command, Event};

use std::time::Duration;

pub const BOARD_WIDTH: u32 = 10;
pub const BOARD_HEIGHT: u32 = 20;
pub const TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Name given to every freshly spawned hostile.
pub const DEFAULT_HOSTILE_NAME: &str = "night-king";

/// Capacity of a session's inbound line buffer, in bytes.
pub const MAX_LINE_BUFFER: usize = 512;

/// Default bound of a session's outbound event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Bound of the world's shot queue. Shots beyond it are dropped.
pub const SHOT_QUEUE_CAPACITY: usize = 256;

/// Lines a session reads ahead of its dispatch loop.
pub const INBOUND_LINE_QUEUE: usize = 16;

/// Idle read timeout. Not enforced: silent spectators are legitimate.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_PORT: u16 = 1201;
