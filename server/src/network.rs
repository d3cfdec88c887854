//! TCP listener that hands each accepted connection to its own session.

use crate::session::{Session, SessionConfig};
use crate::world::World;
use log::{error, info};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Accept loop around one shared [`World`].
pub struct Server {
    listener: TcpListener,
    world: Arc<World>,
    session_config: SessionConfig,
}

impl Server {
    pub async fn bind(
        addr: &str,
        world: Arc<World>,
        session_config: SessionConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            world,
            session_config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then stops the world
    /// so every session is told to close.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr),
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        self.world.stop().await;
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) {
        info!("Connection accepted from {}", addr);
        if let Err(e) = stream.set_nodelay(true) {
            error!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let session = Session::new(
            Arc::clone(&self.world),
            self.session_config.clone(),
            addr.to_string(),
        );
        tokio::spawn(session.run(stream));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    fn test_world() -> Arc<World> {
        Arc::new(World::new(WorldConfig {
            tick: Duration::from_secs(3600),
            ..WorldConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0", test_world(), SessionConfig::default())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address_fails() {
        let result = Server::bind("127.0.0.1:99999", test_world(), SessionConfig::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let world = test_world();
        let server = Server::bind("127.0.0.1:0", Arc::clone(&world), SessionConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = shutdown_rx.await;
        }));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"START alice\n").await.unwrap();

        for _ in 0..100 {
            if world.participant_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(world.participant_count().await, 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let mut lines = BufReader::new(read).lines();
        let next = timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, None);
        assert!(!world.is_running().await);
    }
}
