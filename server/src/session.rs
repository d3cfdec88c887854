//! Per-connection protocol engine.
//!
//! A [`Session`] adapts one duplex byte stream to the world's name-keyed
//! interface. It runs as two cooperating tasks:
//!
//! - a read task that pulls bytes off the stream, cuts them into lines and
//!   forwards them, then reports how the stream ended;
//! - the dispatch loop, which waits on whichever comes first of a world
//!   event, an inbound line, or the end of the inbound side.
//!
//! Errors a peer can cause with a bad command are answered with an
//! `ERROR "<message>"` line to that peer alone. Framing overflow and
//! transport failures end the session silently.

use crate::roster::JoinTicket;
use crate::world::World;
use log::{debug, info, warn};
use shared::{
    Arrow, Command, Event, LineDecoder, LineTerminator, ProtocolError, ProtocolResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub terminator: LineTerminator,
    /// Bound of the outbound event queue.
    pub queue_capacity: usize,
    /// Bound of the inbound line buffer, in bytes.
    pub buffer_capacity: usize,
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            terminator: LineTerminator::Lf,
            queue_capacity: shared::EVENT_QUEUE_CAPACITY,
            buffer_capacity: shared::MAX_LINE_BUFFER,
            write_timeout: shared::WRITE_TIMEOUT,
        }
    }
}

/// Who this session is, as far as the world knows.
#[derive(Debug)]
enum Identity {
    /// Not joined yet. Keeps the sender that will be handed to the world.
    Anonymous { events: mpsc::Sender<Event> },
    Joined { name: String, ticket: JoinTicket },
    Departed,
}

/// What the read task reports.
#[derive(Debug)]
enum Inbound {
    Line(String),
    /// Orderly end of stream.
    Eof,
    Failed(ProtocolError),
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    PeerClosed,
    /// The world sent the termination event.
    Terminated,
    /// The world dropped our event queue (overflow).
    Evicted,
    Failed(ProtocolError),
}

pub struct Session {
    peer: String,
    world: Arc<World>,
    config: SessionConfig,
    identity: Identity,
    events_rx: mpsc::Receiver<Event>,
}

impl Session {
    pub fn new(world: Arc<World>, config: SessionConfig, peer: impl Into<String>) -> Self {
        let (events, events_rx) = mpsc::channel(config.queue_capacity);
        Self {
            peer: peer.into(),
            world,
            config,
            identity: Identity::Anonymous { events },
            events_rx,
        }
    }

    /// The name this session joined under, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.identity {
            Identity::Joined { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Drives the session until the peer goes away, the world terminates
    /// it, or the stream fails. Always leaves the world and shuts the
    /// stream down before returning.
    pub async fn run<S>(mut self, stream: S) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(shared::INBOUND_LINE_QUEUE);

        let decoder = LineDecoder::new(self.config.terminator, self.config.buffer_capacity);
        let read_task = tokio::spawn(read_lines(reader, decoder, inbound_tx));

        let end = self.dispatch(&mut writer, &mut inbound_rx).await;

        if matches!(end, SessionEnd::Terminated | SessionEnd::Evicted) {
            // The world already let go of us; our name may be someone else's now.
            self.identity = Identity::Departed;
        }
        self.leave().await;
        read_task.abort();
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }

        match &end {
            SessionEnd::Failed(err) => warn!("Session {} failed: {}", self.peer, err),
            other => info!("Session {} closed: {:?}", self.peer, other),
        }
        end
    }

    async fn dispatch<W>(
        &mut self,
        writer: &mut W,
        inbound_rx: &mut mpsc::Receiver<Inbound>,
    ) -> SessionEnd
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(Event::Terminate) => return SessionEnd::Terminated,
                    Some(event) => {
                        if let Err(e) = self.write_line(writer, &event.to_string()).await {
                            return SessionEnd::Failed(e);
                        }
                    }
                    None => return SessionEnd::Evicted,
                },
                inbound = inbound_rx.recv() => match inbound {
                    Some(Inbound::Line(line)) => {
                        if let Err(err) = self.handle_line(&line).await {
                            if err.is_fatal() {
                                return SessionEnd::Failed(err);
                            }
                            debug!("Command {:?} from {} rejected: {}", line, self.peer, err);
                            let reply = Event::from(&err).to_string();
                            if let Err(e) = self.write_line(writer, &reply).await {
                                return SessionEnd::Failed(e);
                            }
                        }
                    }
                    Some(Inbound::Failed(err)) => return SessionEnd::Failed(err),
                    Some(Inbound::Eof) | None => return SessionEnd::PeerClosed,
                },
            }
        }
    }

    /// Parses and executes one line.
    pub async fn handle_line(&mut self, line: &str) -> ProtocolResult<()> {
        match Command::parse(line)? {
            Command::Noop => Ok(()),
            Command::Start { name } => self.join(name).await,
            Command::Shoot { x, y } => self.shoot(x, y),
        }
    }

    async fn join(&mut self, name: String) -> ProtocolResult<()> {
        let events = match &self.identity {
            Identity::Anonymous { events } => events.clone(),
            Identity::Joined { name: current, .. } => {
                return Err(ProtocolError::AlreadyJoined(current.clone()))
            }
            Identity::Departed => return Err(ProtocolError::malformed("Session is closing")),
        };

        let ticket = self.world.join(&name, events).await?;
        info!("{} joined as {}", self.peer, name);

        // Only the world holds the sender now, so our event stream ends if
        // the world drops us.
        self.identity = Identity::Joined { name, ticket };
        self.world.start().await;
        Ok(())
    }

    fn shoot(&self, x: i64, y: i64) -> ProtocolResult<()> {
        // Unjoined sessions shoot under an empty name; the world flags it.
        let shooter = self.name().unwrap_or_default();
        self.world.shoot(Arrow::new(shooter, x, y))
    }

    /// Detaches from the world. Safe to call more than once.
    pub async fn leave(&mut self) {
        if let Identity::Joined { name, ticket } =
            std::mem::replace(&mut self.identity, Identity::Departed)
        {
            self.world.leave(&name, ticket).await;
        }
    }

    async fn write_line<W>(&self, writer: &mut W, line: &str) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.config.terminator.frame(line);
        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };

        match timeout(self.config.write_timeout, write).await {
            Ok(result) => result.map_err(ProtocolError::from),
            Err(_) => Err(ProtocolError::WriteTimeout),
        }
    }
}

/// Read side of a session: bytes in, lines out.
async fn read_lines<R>(
    mut reader: R,
    mut decoder: LineDecoder,
    inbound: mpsc::Sender<Inbound>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; decoder.capacity()];

    let outcome = loop {
        if decoder.is_full() {
            warn!(
                "Not enough space to receive command: {} bytes buffered",
                decoder.buffered()
            );
            break Inbound::Failed(ProtocolError::FramingOverflow {
                capacity: decoder.capacity(),
            });
        }

        let room = decoder.remaining();
        let n = match reader.read(&mut chunk[..room]).await {
            Ok(0) => break Inbound::Eof,
            Ok(n) => n,
            Err(e) => break Inbound::Failed(e.into()),
        };

        if let Err(e) = decoder.push(&chunk[..n]) {
            break Inbound::Failed(e);
        }
        while let Some(line) = decoder.next_line() {
            if inbound.send(Inbound::Line(line)).await.is_err() {
                return;
            }
        }
    };

    let _ = inbound.send(outcome).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    const LONG_TICK: Duration = Duration::from_secs(3600);

    struct Peer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        task: JoinHandle<SessionEnd>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out waiting for a line")
                .unwrap()
        }
    }

    fn test_world() -> Arc<World> {
        Arc::new(World::new(WorldConfig {
            width: 10,
            height: 20,
            tick: LONG_TICK,
        }))
    }

    fn connect(world: &Arc<World>, peer: &str) -> Peer {
        connect_with(world, peer, SessionConfig::default(), 4096)
    }

    fn connect_with(world: &Arc<World>, peer: &str, config: SessionConfig, pipe: usize) -> Peer {
        let (client, server) = duplex(pipe);
        let session = Session::new(Arc::clone(world), config, peer);
        let task = tokio::spawn(session.run(server));

        let (read, writer) = tokio::io::split(client);
        Peer {
            lines: BufReader::new(read).lines(),
            writer,
            task,
        }
    }

    async fn wait_for_participants(world: &World, expected: usize) {
        for _ in 0..100 {
            if world.participant_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("roster never reached {} participants", expected);
    }

    #[tokio::test]
    async fn test_start_then_hit() {
        let world = test_world();
        let mut alice = connect(&world, "alice-peer");

        alice.send("START alice").await;
        alice.send("SHOOT 0 0").await;
        assert_eq!(alice.recv().await.unwrap(), "BOOM alice 1 night-king");
        assert_eq!(world.kills("alice").await, Some(1));
        world.stop().await;
    }

    #[tokio::test]
    async fn test_local_errors_keep_session_open() {
        let world = test_world();
        let mut peer = connect(&world, "p");

        peer.send("DANCE").await;
        assert_eq!(peer.recv().await.unwrap(), "ERROR \"Unknown command: DANCE\"");

        peer.send("START").await;
        assert_eq!(peer.recv().await.unwrap(), "ERROR \"Bad number of arguments\"");

        peer.send("SHOOT one 2").await;
        assert_eq!(peer.recv().await.unwrap(), "ERROR \"Bad X position: one\"");

        peer.send("").await;
        peer.send("START alice").await;
        peer.send("SHOOT 10 0").await;
        assert_eq!(
            peer.recv().await.unwrap(),
            "ERROR \"You broke the anti balistic missile treaty\""
        );
        peer.send("SHOOT 0 20").await;
        assert_eq!(
            peer.recv().await.unwrap(),
            "ERROR \"Intercontinental missiles are banned\""
        );

        assert_eq!(world.participant_count().await, 1);
        world.stop().await;
    }

    #[tokio::test]
    async fn test_second_start_on_same_session_rejected() {
        let world = test_world();
        let mut peer = connect(&world, "p");

        peer.send("START alice").await;
        peer.send("START bob").await;
        assert_eq!(peer.recv().await.unwrap(), "ERROR \"Already joined as alice\"");
        assert_eq!(world.kills("bob").await, None);
        world.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_name_across_sessions() {
        let world = test_world();
        let mut first = connect(&world, "p1");
        let mut second = connect(&world, "p2");

        first.send("START alice").await;
        wait_for_participants(&world, 1).await;

        second.send("start alice").await;
        assert_eq!(
            second.recv().await.unwrap(),
            "ERROR \"Cannot add the client: User with this nick is already registered\""
        );

        // The rejected session can still pick another name.
        second.send("START bob").await;
        wait_for_participants(&world, 2).await;

        second.send("SHOOT 4 4").await;
        assert_eq!(first.recv().await.unwrap(), "BOOM bob 0");
        world.stop().await;
    }

    #[tokio::test]
    async fn test_unjoined_shooter_triggers_cheater_broadcast() {
        let world = test_world();
        let mut alice = connect(&world, "p1");
        let mut mallory = connect(&world, "p2");

        alice.send("START alice").await;
        wait_for_participants(&world, 1).await;

        mallory.send("SHOOT 0 0").await;
        assert_eq!(alice.recv().await.unwrap(), "CHEATER!");
        assert_eq!(world.kills("alice").await, Some(0));

        alice.send("SHOOT 0 0").await;
        assert_eq!(alice.recv().await.unwrap(), "BOOM alice 1 night-king");
        world.stop().await;
    }

    #[tokio::test]
    async fn test_stop_terminates_without_writing() {
        let world = test_world();
        let mut alice = connect(&world, "p1");

        alice.send("START alice").await;
        wait_for_participants(&world, 1).await;

        world.stop().await;
        assert_eq!(alice.recv().await, None);
        assert!(matches!(alice.task.await.unwrap(), SessionEnd::Terminated));
    }

    #[tokio::test]
    async fn test_disconnect_leaves_world() {
        let world = test_world();
        let mut alice = connect(&world, "p1");

        alice.send("START alice").await;
        wait_for_participants(&world, 1).await;

        alice.writer.shutdown().await.unwrap();
        assert!(matches!(alice.task.await.unwrap(), SessionEnd::PeerClosed));
        assert_eq!(world.participant_count().await, 0);
        world.stop().await;
    }

    #[tokio::test]
    async fn test_evicted_session_does_not_remove_new_holder_of_name() {
        let world = test_world();
        let config = SessionConfig {
            queue_capacity: 1,
            ..SessionConfig::default()
        };
        let mut stalled = connect_with(&world, "p1", config, 1);

        stalled.send("START alice").await;
        wait_for_participants(&world, 1).await;

        // The stalled peer never reads, so its queue fills up.
        for _ in 0..3 {
            world.shoot(Arrow::new("alice", 5, 5)).unwrap();
        }
        wait_for_participants(&world, 0).await;

        let mut fresh = connect(&world, "p2");
        fresh.send("START alice").await;
        wait_for_participants(&world, 1).await;

        while stalled.recv().await.is_some() {}
        assert!(matches!(stalled.task.await.unwrap(), SessionEnd::Evicted));
        assert_eq!(world.participant_count().await, 1);

        world.shoot(Arrow::new("alice", 5, 5)).unwrap();
        assert_eq!(fresh.recv().await.unwrap(), "BOOM alice 0");
        world.stop().await;
    }

    #[tokio::test]
    async fn test_write_timeout_ends_session() {
        let world = test_world();
        let config = SessionConfig {
            write_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let mut peer = connect_with(&world, "p1", config, 1);

        peer.send("START alice").await;
        wait_for_participants(&world, 1).await;

        world.shoot(Arrow::new("alice", 5, 5)).unwrap();

        let end = timeout(Duration::from_secs(5), &mut peer.task)
            .await
            .expect("session never gave up on the write")
            .unwrap();
        assert!(matches!(
            end,
            SessionEnd::Failed(ProtocolError::WriteTimeout)
        ));
        assert_eq!(world.participant_count().await, 0);
        world.stop().await;
    }

    #[tokio::test]
    async fn test_framing_overflow_disconnects() {
        let world = test_world();
        let mut peer = connect(&world, "p1");

        peer.send("START alice").await;
        wait_for_participants(&world, 1).await;

        let junk = vec![b'x'; shared::MAX_LINE_BUFFER + 1];
        peer.writer.write_all(&junk).await.unwrap();

        assert_eq!(peer.recv().await, None);
        assert!(matches!(
            peer.task.await.unwrap(),
            SessionEnd::Failed(ProtocolError::FramingOverflow { .. })
        ));
        assert_eq!(world.participant_count().await, 0);
        world.stop().await;
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        let world = test_world();
        let (client, server) = duplex(1024);
        let config = SessionConfig {
            terminator: LineTerminator::CrLf,
            ..SessionConfig::default()
        };
        let task = tokio::spawn(Session::new(Arc::clone(&world), config, "p").run(server));

        let (read, mut writer) = tokio::io::split(client);
        writer.write_all(b"START alice\r\nSHO").await.unwrap();
        writer.write_all(b"OT 0 0\r\n").await.unwrap();

        let mut reader = BufReader::new(read);
        let mut line = String::new();
        timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "BOOM alice 1 night-king\r\n");

        world.stop().await;
        assert!(matches!(task.await.unwrap(), SessionEnd::Terminated));
    }

    #[tokio::test]
    async fn test_scripted_stream() {
        let world = test_world();
        let stream = tokio_test::io::Builder::new()
            .read(b"hello\n")
            .write(b"ERROR \"Unknown command: hello\"\n")
            .build();

        let end = Session::new(Arc::clone(&world), SessionConfig::default(), "mock")
            .run(stream)
            .await;
        assert!(matches!(end, SessionEnd::PeerClosed));
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let world = test_world();
        let mut session = Session::new(Arc::clone(&world), SessionConfig::default(), "p");

        session.handle_line("START alice").await.unwrap();
        assert_eq!(session.name(), Some("alice"));
        assert_eq!(world.participant_count().await, 1);

        session.leave().await;
        session.leave().await;
        assert_eq!(session.name(), None);
        assert_eq!(world.participant_count().await, 0);
        world.stop().await;
    }
}
