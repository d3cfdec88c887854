//! Participant roster and event fan-out.
//!
//! The roster maps each claimed name to the participant's outbound event
//! queue and kill counter. Names are unique keys; a second join under the
//! same name is rejected.
//!
//! Every outbound queue is bounded. Broadcasting never waits: an event is
//! offered to each queue with `try_send`, and a participant whose queue is
//! full (or whose session has already gone away) is dropped from the
//! roster on the spot. Dropping the sender ends that session's event
//! stream, which the session treats as a disconnect.
//!
//! Each successful join hands back a [`JoinTicket`]. Leaving requires the
//! ticket, so a session that was already evicted cannot remove a newer
//! participant who has since claimed the same name.

use log::{debug, info, warn};
use shared::{Event, ProtocolError, ProtocolResult};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Proof of one particular join. Never reused within a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTicket(u64);

/// A joined participant.
#[derive(Debug)]
pub struct Participant {
    pub name: String,
    pub kills: u32,
    ticket: JoinTicket,
    events: mpsc::Sender<Event>,
}

impl Participant {
    fn new(name: impl Into<String>, ticket: JoinTicket, events: mpsc::Sender<Event>) -> Self {
        Self {
            name: name.into(),
            kills: 0,
            ticket,
            events,
        }
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    participants: HashMap<String, Participant>,
    next_ticket: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with its event queue.
    pub fn add(&mut self, name: &str, events: mpsc::Sender<Event>) -> ProtocolResult<JoinTicket> {
        if self.participants.contains_key(name) {
            info!("User is already registered: {}", name);
            return Err(ProtocolError::DuplicateName(name.to_string()));
        }

        let ticket = JoinTicket(self.next_ticket);
        self.next_ticket += 1;

        self.participants
            .insert(name.to_string(), Participant::new(name, ticket, events));
        info!("Participant {} joined ({} total)", name, self.participants.len());
        Ok(ticket)
    }

    /// Removes `name` if it is still held under `ticket`. Returns false if
    /// the name is absent or now belongs to a later join.
    pub fn remove(&mut self, name: &str, ticket: JoinTicket) -> bool {
        match self.participants.get(name) {
            Some(p) if p.ticket == ticket => {}
            Some(_) => {
                debug!("Ignoring stale leave for {}", name);
                return false;
            }
            None => return false,
        }

        match self.participants.remove(name) {
            Some(p) => {
                info!("Participant {} left with {} kills", p.name, p.kills);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.participants.contains_key(name)
    }

    pub fn kills(&self, name: &str) -> Option<u32> {
        self.participants.get(name).map(|p| p.kills)
    }

    /// Bumps `name`'s kill counter, returning the new total.
    pub fn record_kill(&mut self, name: &str) -> Option<u32> {
        let participant = self.participants.get_mut(name)?;
        participant.kills += 1;
        Some(participant.kills)
    }

    /// Offers `event` to every participant.
    ///
    /// Returns the names evicted because their queue could not take it.
    pub fn broadcast(&mut self, event: &Event) -> Vec<String> {
        let mut evicted = Vec::new();

        for (name, participant) in &self.participants {
            match participant.events.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue of {} is full, disconnecting", name);
                    evicted.push(name.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Outbound queue of {} is closed", name);
                    evicted.push(name.clone());
                }
            }
        }

        for name in &evicted {
            self.participants.remove(name);
        }
        evicted
    }

    /// Drops every participant, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.participants.len();
        self.participants.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
