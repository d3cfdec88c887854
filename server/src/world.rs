//! The world coordinator.
//!
//! A [`World`] is shared by every session behind an `Arc`. Its state is
//! split in two:
//!
//! - The board (hostile position) belongs to the control loop task and is
//!   never touched from anywhere else. Shots reach it through a bounded
//!   queue whose receiver the loop keeps locked while it runs; a shot fired
//!   while no loop holds it, or while the queue is full, is dropped.
//! - The roster and the loop's lifecycle are touched synchronously by
//!   sessions (join, leave, start, stop), so each sits behind its own
//!   mutex. The control loop takes the roster lock for one turn at a time
//!   and never across an await on anything else.
//!
//! Lock order is lifecycle, then roster. Nothing takes the lifecycle lock
//! while holding the roster lock.

use crate::game::{Board, Movement};
use crate::roster::{JoinTicket, Roster};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Arrow, Axis, Event, ProtocolError, ProtocolResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Board and timing, fixed for the lifetime of a world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    pub width: u32,
    pub height: u32,
    pub tick: Duration,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: shared::BOARD_WIDTH,
            height: shared::BOARD_HEIGHT,
            tick: shared::TICK_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Stopping,
    Stopped,
}

/// Stop request; the loop answers on the enclosed sender once it has exited.
type StopRequest = oneshot::Sender<()>;

struct LoopHandle {
    stop_tx: oneshot::Sender<StopRequest>,
}

pub struct World {
    config: WorldConfig,
    roster: Arc<Mutex<Roster>>,
    lifecycle: Mutex<Option<LoopHandle>>,
    shots_tx: mpsc::Sender<Arrow>,
    /// Held by the running loop for its whole lifetime.
    shots_rx: Arc<Mutex<mpsc::Receiver<Arrow>>>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let (shots_tx, shots_rx) = mpsc::channel(shared::SHOT_QUEUE_CAPACITY);
        Self {
            config,
            roster: Arc::new(Mutex::new(Roster::new())),
            lifecycle: Mutex::new(None),
            shots_tx,
            shots_rx: Arc::new(Mutex::new(shots_rx)),
        }
    }

    /// Registers `name`; world events will be pushed into `events`.
    pub async fn join(
        &self,
        name: &str,
        events: mpsc::Sender<Event>,
    ) -> ProtocolResult<JoinTicket> {
        self.roster.lock().await.add(name, events)
    }

    /// Removes `name` if `ticket` still owns it. Unknown names and names
    /// since claimed by another join are ignored.
    pub async fn leave(&self, name: &str, ticket: JoinTicket) {
        self.roster.lock().await.remove(name, ticket);
    }

    /// Launches the control loop unless it is already running.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return;
        }

        let mut shots = Arc::clone(&self.shots_rx).lock_owned().await;
        let mut stale = 0;
        while shots.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Discarded {} shots queued while idle", stale);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(control_loop(
            self.config.clone(),
            Arc::clone(&self.roster),
            shots,
            stop_rx,
        ));

        *lifecycle = Some(LoopHandle { stop_tx });
        info!("World has been started");
    }

    /// Terminates every session, halts the control loop and waits for it
    /// to confirm, then empties the roster. No-op when not running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(handle) = lifecycle.take() else {
            return;
        };

        self.roster.lock().await.broadcast(&Event::Terminate);

        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.stop_tx.send(ack_tx).is_err() || ack_rx.await.is_err() {
            error!("Control loop exited without acknowledging stop");
        }

        let dropped = self.roster.lock().await.clear();
        info!("World stopped ({} participants dropped)", dropped);
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    /// Validates the arrow against the board and queues it for the control
    /// loop. Whether the shooter has joined is the loop's concern.
    pub fn shoot(&self, arrow: Arrow) -> ProtocolResult<()> {
        let width = i64::from(self.config.width);
        let height = i64::from(self.config.height);

        if !(0..width).contains(&arrow.x) {
            debug!(
                "Bad X position from {} ({}, {}): {}",
                arrow.shooter, width, height, arrow.x
            );
            return Err(ProtocolError::OutOfBounds {
                axis: Axis::X,
                value: arrow.x,
            });
        }
        if !(0..height).contains(&arrow.y) {
            debug!(
                "Bad Y position from {} ({}, {}): {}",
                arrow.shooter, width, height, arrow.y
            );
            return Err(ProtocolError::OutOfBounds {
                axis: Axis::Y,
                value: arrow.y,
            });
        }

        // An uncontended receiver lock means no control loop is running.
        if self.shots_rx.try_lock().is_ok() {
            debug!("World is idle, dropping shot from {:?}", arrow.shooter);
            return Ok(());
        }

        debug!("{} shoots at ({}, {})", arrow.shooter, arrow.x, arrow.y);
        match self.shots_tx.try_send(arrow) {
            Ok(()) => {}
            Err(TrySendError::Full(arrow)) => {
                warn!("Shot queue is full, dropping shot from {:?}", arrow.shooter)
            }
            Err(TrySendError::Closed(_)) => error!("Shot queue is closed"),
        }
        Ok(())
    }

    pub async fn participant_count(&self) -> usize {
        self.roster.lock().await.len()
    }

    pub async fn kills(&self, name: &str) -> Option<u32> {
        self.roster.lock().await.kills(name)
    }
}

/// The only code path that reads or writes the board.
async fn control_loop(
    config: WorldConfig,
    roster: Arc<Mutex<Roster>>,
    mut shots: OwnedMutexGuard<mpsc::Receiver<Arrow>>,
    mut stop_rx: oneshot::Receiver<StopRequest>,
) {
    let mut board = Board::new(config.width, config.height);
    let mut rng = StdRng::from_entropy();

    // First tick one full interval from now, not immediately.
    let mut ticker = interval_at(Instant::now() + config.tick, config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    {
        let roster = roster.lock().await;
        board.ensure_hostile(!roster.is_empty());
    }

    let mut state = LoopState::Running;
    let mut ack = None;

    while state == LoopState::Running {
        tokio::select! {
            biased;

            request = &mut stop_rx => {
                // A dropped sender means the world itself is gone.
                ack = request.ok();
                state = LoopState::Stopping;
            }
            _ = ticker.tick() => {
                let mut roster = roster.lock().await;
                let has_participants = !roster.is_empty();
                if let Some(movement) = board.advance(has_participants, &mut rng) {
                    on_walk(&mut roster, movement);
                }
            }
            Some(arrow) = shots.recv() => {
                let mut roster = roster.lock().await;
                on_shot(&mut board, &mut roster, arrow);
            }
        }
    }

    debug!("Control loop {:?}", state);
    drop(shots);
    state = LoopState::Stopped;
    debug!("Control loop {:?}", state);

    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}

fn on_walk(roster: &mut Roster, movement: Movement) {
    let Movement { hostile, escaped, .. } = movement;
    debug!("WALK {} {} {}", hostile.name, hostile.x, hostile.y);

    broadcast(
        roster,
        &Event::Walk {
            name: hostile.name.clone(),
            x: hostile.x,
            y: hostile.y,
        },
    );

    if escaped {
        info!("{} got away", hostile.name);
    }
}

fn on_shot(board: &mut Board, roster: &mut Roster, arrow: Arrow) {
    if !roster.contains(&arrow.shooter) {
        warn!(
            "Got shoot command from unknown client: {:?} ({}, {})",
            arrow.shooter, arrow.x, arrow.y
        );
        broadcast(roster, &Event::Cheater);
        return;
    }

    let event = match board.resolve_shot(arrow.x, arrow.y) {
        Some(hostile) => {
            let kills = roster.record_kill(&arrow.shooter).unwrap_or_default();
            Event::Hit {
                shooter: arrow.shooter,
                kills,
                hostile,
            }
        }
        None => Event::Miss {
            kills: roster.kills(&arrow.shooter).unwrap_or_default(),
            shooter: arrow.shooter,
        },
    };
    broadcast(roster, &event);
}

fn broadcast(roster: &mut Roster, event: &Event) {
    let evicted = roster.broadcast(event);
    if !evicted.is_empty() {
        warn!("Evicted slow participants: {:?}", evicted);
    }
}
