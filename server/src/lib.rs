//! # Arena Server Library
//!
//! Authoritative server for a shared shooting arena played over a plain
//! line-based text protocol. One world, one roaming hostile, any number of
//! named shooters; every connected participant sees the same event stream.
//!
//! ## Architecture
//!
//! ### World Coordinator (`world`)
//! Owns the board and the roster. A single control loop task is the only
//! code that reads or writes the board; it wakes up on the tick timer, on
//! a queued shot, or on a stop request. Join, leave, start and stop are
//! called directly from sessions and go through a mutex instead of the
//! loop's queue.
//!
//! ### Session Protocol Engine (`session`)
//! One per connection. A read task frames inbound bytes into lines; the
//! dispatch loop turns lines into world calls and world events into
//! outbound lines. Local errors go back to the originating peer as
//! `ERROR "<message>"`.
//!
//! ### Game Rules (`game`) and Roster (`roster`)
//! Pure state: hostile spawning and movement, shot resolution, kill
//! counters and bounded event fan-out.
//!
//! ### Network (`network`)
//! TCP accept loop that spawns a session per connection and stops the
//! world on shutdown.
//!
//! ## Protocol
//!
//! ```text
//! client -> server         server -> client
//! START <name>             WALK <name> <x> <y>
//! SHOOT <x> <y>            BOOM <shooter> <kills> <hostile>
//!                          BOOM <shooter> <kills>
//!                          CHEATER!
//!                          ERROR "<message>"
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::session::SessionConfig;
//! use server::world::{World, WorldConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let world = Arc::new(World::new(WorldConfig::default()));
//!     let server = Server::bind("127.0.0.1:1201", world, SessionConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod game;
pub mod network;
pub mod roster;
pub mod session;
pub mod world;
