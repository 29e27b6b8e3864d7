//! Server network layer: control stream listener, session routing and broadcast coordination

use crate::registry::{MemberRegistry, RegistryEffect, SessionId};
use crate::session::{run_session, SessionCommand};
use log::{debug, error, info, warn};
use shared::{BroadcastHandle, BroadcastReactor, Message};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages sent from session tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    FrameReceived {
        session_id: SessionId,
        message: Message,
    },
    SessionClosed {
        session_id: SessionId,
    },
}

/// The server loop's grip on a running session task
struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

/// Membership server coordinating control sessions and the broadcast endpoint
///
/// The registry and the session table are owned by the loop in [`Server::run_until`];
/// session tasks only talk to it through [`ServerMessage`]s.
pub struct Server {
    listener: TcpListener,
    broadcast: BroadcastHandle,
    broadcast_addr: SocketAddr,
    registry: MemberRegistry,
    sessions: HashMap<SessionId, SessionHandle>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the control listener on `addr` and opens the broadcast endpoint on
    /// `datagram_host` with an OS-chosen port
    pub async fn bind(addr: &str, datagram_host: IpAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let broadcast = BroadcastReactor::spawn("server-broadcast", None)?;
        let broadcast_addr = broadcast
            .open(datagram_host)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            broadcast,
            broadcast_addr,
            registry: MemberRegistry::new(),
            sessions: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    /// Address of the control listener
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address the server's JOIN and EXIT datagrams are sent from
    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast_addr
    }

    fn handle_accept(&mut self, result: io::Result<(TcpStream, SocketAddr)>) {
        let (stream, peer) = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                return;
            }
        };

        let session_id = self.registry.open_session();
        info!("Session {} connected from {}", session_id, peer);

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(
            session_id,
            stream,
            commands_rx,
            self.server_tx.clone(),
        ));
        self.sessions
            .insert(session_id, SessionHandle { commands, task });
    }

    /// Routes a decoded control message into the registry
    fn handle_message(&mut self, session_id: SessionId, message: Message) {
        let effects = match message {
            Message::Helo(member) => self.registry.handle_helo(session_id, member),
            Message::Exit { .. } => self.registry.handle_exit(session_id),
            other => {
                warn!(
                    "Unexpected {} from session {}. Ignoring.",
                    other.verb(),
                    session_id
                );
                Vec::new()
            }
        };

        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&self, effect: RegistryEffect) {
        match effect {
            RegistryEffect::Reply {
                session_id,
                message,
            } => self.send_command(session_id, SessionCommand::Send(message)),
            RegistryEffect::Close { session_id } => {
                self.send_command(session_id, SessionCommand::Close)
            }
            RegistryEffect::Broadcast { message, peers } => {
                debug!("Broadcasting {} to {} members", message.verb(), peers.len());
                if let Err(e) = self.broadcast.send_to(message, peers) {
                    error!("Failed to queue broadcast: {}", e);
                }
            }
        }
    }

    fn send_command(&self, session_id: SessionId, command: SessionCommand) {
        match self.sessions.get(&session_id) {
            Some(handle) => {
                if handle.commands.send(command).is_err() {
                    debug!("Session {} already finished", session_id);
                }
            }
            None => debug!("No session {} for {:?}", session_id, command),
        }
    }

    fn handle_session_closed(&mut self, session_id: SessionId) {
        self.registry.close_session(session_id);
        self.sessions.remove(&session_id);
        info!(
            "Session {} closed ({} sessions, {} members)",
            session_id,
            self.registry.len(),
            self.registry.roster().len()
        );
    }

    /// Main server loop: accepts streams and processes session traffic until `shutdown`
    /// completes, then closes every session and the broadcast endpoint
    pub async fn run_until<F>(mut self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                },

                accepted = self.listener.accept() => self.handle_accept(accepted),

                message = self.server_rx.recv() => match message {
                    Some(ServerMessage::FrameReceived { session_id, message }) => {
                        self.handle_message(session_id, message);
                    },
                    Some(ServerMessage::SessionClosed { session_id }) => {
                        self.handle_session_closed(session_id);
                    },
                    None => break,
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> io::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
            }
        })
        .await
    }

    async fn shutdown(&mut self) {
        for (_, handle) in self.sessions.drain() {
            let _ = handle.commands.send(SessionCommand::Close);
            if let Err(e) = handle.task.await {
                error!("Session task panicked: {}", e);
            }
        }

        if let Err(e) = self.broadcast.close().await {
            warn!("Failed to close broadcast endpoint: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn start_server() -> (SocketAddr, oneshot::Sender<()>, JoinHandle<io::Result<()>>) {
        let server = Server::bind("127.0.0.1:0", LOCALHOST).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));
        (addr, stop_tx, task)
    }

    async fn read_line(stream: &mut TcpStream) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = timeout(Duration::from_secs(2), stream.read(&mut byte))
                .await
                .expect("timed out reading control stream")
                .unwrap();
            if n == 0 || byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        String::from_utf8(line).unwrap()
    }

    #[tokio::test]
    async fn test_bind_opens_broadcast_endpoint() {
        let server = Server::bind("127.0.0.1:0", LOCALHOST).await.unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.broadcast_addr().ip(), LOCALHOST);
        assert_ne!(server.broadcast_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_helo_receives_acpt() {
        let (addr, stop, task) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"HELO alice 127.0.0.1 9001\n")
            .await
            .unwrap();

        assert_eq!(read_line(&mut stream).await, "ACPT alice 127.0.0.1 9001");
        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_garbage_does_not_close_session() {
        let (addr, stop, task) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"NOPE\nHELO\nACPT x 1.1.1.1 1\nEXIT\nHELO alice 127.0.0.1 9001\n")
            .await
            .unwrap();

        assert_eq!(read_line(&mut stream).await, "ACPT alice 127.0.0.1 9001");
        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_sessions() {
        let (addr, stop, task) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"HELO alice 127.0.0.1 9001\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut stream).await, "ACPT alice 127.0.0.1 9001");

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();

        let mut rest = Vec::new();
        let n = timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
